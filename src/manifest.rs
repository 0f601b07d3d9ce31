//! Gallery manifests: viewport, tuning overrides, items and an optional
//! script of host events for headless runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::config::GalleryConfig;
use crate::events::GalleryEvent;
use crate::gallery::HostSurface;
use crate::items::{compose_items, GalleryItem, GeneratedResult};
use crate::layout::{Rect, SurfaceSize, Viewport};
use crate::scroll::ScrollMetrics;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GalleryManifest {
    pub viewport: Viewport,
    #[serde(default)]
    pub config: GalleryConfig,
    #[serde(default)]
    pub layout: StripLayout,
    pub items: Vec<GalleryItem>,
    #[serde(default)]
    pub results: BTreeMap<String, GeneratedResult>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    /// Directory relative image paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl GalleryManifest {
    /// Catalog merged with generated results.
    pub fn composed_items(&self) -> Vec<GalleryItem> {
        compose_items(&self.items, &self.results)
    }

    /// Script actions grouped by frame, in manifest order.
    pub fn actions_by_frame(&self) -> Result<BTreeMap<u64, Vec<ScriptAction>>> {
        let mut frames: BTreeMap<u64, Vec<ScriptAction>> = BTreeMap::new();
        for (index, step) in self.script.iter().enumerate() {
            let action = step
                .action()
                .with_context(|| format!("script step {index} (frame {})", step.frame))?;
            frames.entry(step.frame).or_default().push(action);
        }
        Ok(frames)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StripLayout {
    pub item_width: f32,
    pub gap: f32,
}

impl Default for StripLayout {
    fn default() -> Self {
        Self {
            item_width: 300.0,
            gap: 24.0,
        }
    }
}

/// One scripted host event. Exactly one action field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptStep {
    pub frame: u64,
    #[serde(default)]
    pub scroll: Option<f32>,
    #[serde(default)]
    pub pointer_enter: Option<String>,
    #[serde(default)]
    pub pointer_move: Option<PointerMoveStep>,
    #[serde(default)]
    pub pointer_leave: Option<String>,
    #[serde(default)]
    pub click: Option<String>,
    #[serde(default)]
    pub resize: Option<Viewport>,
    #[serde(default)]
    pub replace: Option<ReplaceStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointerMoveStep {
    pub form: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceStep {
    pub form: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    /// Delivered through the event source.
    Event(GalleryEvent),
    /// New image for an item, applied through `Gallery::set_items`.
    Replace { form: String, image: String },
}

impl ScriptAction {
    pub fn form(&self) -> Option<&str> {
        match self {
            Self::Event(GalleryEvent::PointerMove { form, .. })
            | Self::Event(GalleryEvent::PointerEnter(form))
            | Self::Event(GalleryEvent::PointerLeave(form))
            | Self::Event(GalleryEvent::Click(form))
            | Self::Replace { form, .. } => Some(form),
            Self::Event(GalleryEvent::Scroll(_)) | Self::Event(GalleryEvent::Resize(_)) => None,
        }
    }
}

impl ScriptStep {
    pub fn action(&self) -> Result<ScriptAction> {
        let mut actions = Vec::new();
        if let Some(offset) = self.scroll {
            actions.push(ScriptAction::Event(GalleryEvent::Scroll(offset)));
        }
        if let Some(form) = &self.pointer_enter {
            actions.push(ScriptAction::Event(GalleryEvent::PointerEnter(form.clone())));
        }
        if let Some(step) = &self.pointer_move {
            actions.push(ScriptAction::Event(GalleryEvent::PointerMove {
                form: step.form.clone(),
                x: step.x,
                y: step.y,
            }));
        }
        if let Some(form) = &self.pointer_leave {
            actions.push(ScriptAction::Event(GalleryEvent::PointerLeave(form.clone())));
        }
        if let Some(form) = &self.click {
            actions.push(ScriptAction::Event(GalleryEvent::Click(form.clone())));
        }
        if let Some(viewport) = self.resize {
            actions.push(ScriptAction::Event(GalleryEvent::Resize(viewport)));
        }
        if let Some(step) = &self.replace {
            actions.push(ScriptAction::Replace {
                form: step.form.clone(),
                image: step.image.clone(),
            });
        }

        match actions.len() {
            1 => Ok(actions.remove(0)),
            0 => bail!("step has no action"),
            count => bail!("step has {count} actions; split them into separate steps"),
        }
    }
}

pub fn load_and_validate_manifest(path: &Path) -> Result<GalleryManifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut manifest: GalleryManifest = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    manifest.base_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    validate_manifest(&manifest)
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    Ok(manifest)
}

fn validate_manifest(manifest: &GalleryManifest) -> Result<()> {
    manifest.config.validate()?;

    let viewport = manifest.viewport;
    if !(viewport.width > 0.0 && viewport.height > 0.0) {
        bail!(
            "viewport must be positive, got {}x{}",
            viewport.width,
            viewport.height
        );
    }
    if !(manifest.layout.item_width > 0.0) || manifest.layout.gap < 0.0 {
        bail!("layout needs a positive item_width and a non-negative gap");
    }
    if manifest.items.is_empty() {
        bail!("manifest must define at least one item");
    }

    let mut seen = HashSet::with_capacity(manifest.items.len());
    for item in &manifest.items {
        if item.form_key.trim().is_empty() {
            bail!("item '{}' has an empty form key", item.label);
        }
        if !seen.insert(item.form_key.as_str()) {
            bail!("duplicate form key '{}'", item.form_key);
        }
    }

    for form in manifest.results.keys() {
        if !seen.contains(form.as_str()) {
            bail!("result for unknown form '{form}'");
        }
    }

    for (index, step) in manifest.script.iter().enumerate() {
        let action = step
            .action()
            .with_context(|| format!("script step {index} (frame {})", step.frame))?;
        if let Some(form) = action.form() {
            if !seen.contains(form) {
                bail!("script step {index} references unknown form '{form}'");
            }
        }
    }

    Ok(())
}

/// A fixed horizontal strip of item containers, used as the host surface for
/// headless runs. Containers are vertically centred in the viewport.
#[derive(Debug, Clone)]
pub struct StripHost {
    layout: StripLayout,
    viewport: Viewport,
    order: Vec<String>,
    sizes: HashMap<String, SurfaceSize>,
    offset: f32,
    revealed: BTreeSet<String>,
}

impl StripHost {
    pub fn new(layout: StripLayout, viewport: Viewport, items: &[GalleryItem]) -> Self {
        Self {
            layout,
            viewport,
            order: items.iter().map(|item| item.form_key.clone()).collect(),
            sizes: HashMap::new(),
            offset: 0.0,
            revealed: BTreeSet::new(),
        }
    }

    pub fn from_manifest(manifest: &GalleryManifest, items: &[GalleryItem]) -> Self {
        Self::new(manifest.layout, manifest.viewport, items)
    }

    pub fn set_order(&mut self, items: &[GalleryItem]) {
        self.order = items.iter().map(|item| item.form_key.clone()).collect();
        self.sizes.retain(|key, _| self.order.contains(key));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Scroll to `offset`, clamped to the scrollable range. Returns the
    /// applied offset.
    pub fn scroll_to(&mut self, offset: f32) -> f32 {
        let range = (self.content_width() - self.viewport.width).max(0.0);
        self.offset = offset.clamp(0.0, range);
        self.offset
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn revealed(&self) -> &BTreeSet<String> {
        &self.revealed
    }

    pub fn container_size(&self, form_key: &str) -> SurfaceSize {
        self.sizes.get(form_key).copied().unwrap_or_else(|| {
            SurfaceSize::new(self.layout.item_width, self.layout.item_width * 4.0 / 3.0)
        })
    }

    fn content_width(&self) -> f32 {
        self.order.iter().fold(self.layout.gap, |width, key| {
            width + self.container_size(key).width + self.layout.gap
        })
    }
}

impl HostSurface for StripHost {
    fn container_rect(&self, form_key: &str) -> Option<Rect> {
        let mut left = self.layout.gap - self.offset;
        for key in &self.order {
            let size = self.container_size(key);
            if key == form_key {
                let top = (self.viewport.height - size.height) / 2.0;
                return Some(Rect::new(left, top, size.width, size.height));
            }
            left += size.width + self.layout.gap;
        }
        None
    }

    fn viewport(&self) -> Rect {
        Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height)
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            offset: self.offset,
            scroll_width: self.content_width(),
            client_width: self.viewport.width,
        }
    }

    fn set_container_size(&mut self, form_key: &str, size: SurfaceSize) {
        self.sizes.insert(form_key.to_owned(), size);
    }

    fn set_revealed(&mut self, form_key: &str) {
        self.revealed.insert(form_key.to_owned());
    }
}
