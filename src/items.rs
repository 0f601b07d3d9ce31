use std::collections::BTreeMap;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

use crate::config::GalleryConfig;
use crate::loader::placeholder_url;

/// One tile of the gallery, keyed by its literary form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GalleryItem {
    #[serde(rename = "form")]
    pub form_key: String,
    pub label: String,
    /// Missing images fall back to the form's placeholder.
    #[serde(rename = "image", default)]
    pub image_url: String,
}

impl GalleryItem {
    pub fn new(form_key: impl Into<String>, label: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            form_key: form_key.into(),
            label: label.into(),
            image_url: image_url.into(),
        }
    }
}

/// Content already produced for a form by the generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedResult {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "image")]
    pub image_url: String,
}

/// Merge the form catalog with generated results: a result's image wins,
/// otherwise the catalog image, otherwise the form placeholder.
pub fn compose_items(
    catalog: &[GalleryItem],
    results: &BTreeMap<String, GeneratedResult>,
) -> Vec<GalleryItem> {
    catalog
        .iter()
        .map(|entry| {
            let image_url = match results.get(&entry.form_key) {
                Some(result) if !result.image_url.trim().is_empty() => result.image_url.clone(),
                _ if !entry.image_url.trim().is_empty() => entry.image_url.clone(),
                _ => placeholder_url(&entry.form_key),
            };
            GalleryItem {
                form_key: entry.form_key.clone(),
                label: entry.label.clone(),
                image_url,
            }
        })
        .collect()
}

/// Recognizes stand-in image URLs that must never replace real content.
#[derive(Debug, Clone)]
pub struct PlaceholderMatcher {
    patterns: Vec<Regex>,
}

impl PlaceholderMatcher {
    pub fn from_config(config: &GalleryConfig) -> Result<Self> {
        Ok(Self {
            patterns: config.compile_placeholder_patterns()?,
        })
    }

    pub fn is_placeholder(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<GalleryItem> {
        vec![
            GalleryItem::new("haiku", "Haiku", ""),
            GalleryItem::new("sonnet", "Sonnet", "art/sonnet.png"),
            GalleryItem::new("ode", "Ode", ""),
        ]
    }

    #[test]
    fn results_override_catalog_and_placeholders_fill_gaps() {
        let mut results = BTreeMap::new();
        results.insert(
            "haiku".to_owned(),
            GeneratedResult {
                text: "old pond".to_owned(),
                image_url: "out/haiku.png".to_owned(),
            },
        );

        let items = compose_items(&catalog(), &results);
        assert_eq!(items[0].image_url, "out/haiku.png");
        assert_eq!(items[1].image_url, "art/sonnet.png");
        assert_eq!(items[2].image_url, "placeholder://ode");
        assert_eq!(items[2].label, "Ode");
    }

    #[test]
    fn default_patterns_match_placeholder_urls_only() {
        let matcher = PlaceholderMatcher::from_config(&GalleryConfig::default()).unwrap();
        assert!(matcher.is_placeholder("placeholder://ode"));
        assert!(matcher.is_placeholder("/images/placeholder.png"));
        assert!(matcher.is_placeholder("https://cdn.example/placeholder-ode.webp"));
        assert!(!matcher.is_placeholder("out/haiku.png"));
        assert!(!matcher.is_placeholder("https://cdn.example/placeholders/gallery/x.png"));
    }
}
