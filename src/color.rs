//! Dominant-colour extraction with a URL-keyed memo cache.
//!
//! Pixels are sampled with a fixed stride, each channel is floored to a
//! multiple of the quantization step (8 levels per channel at step 32), and
//! the most frequent bucket wins. Ties go to the bucket that reached the
//! maximum first in sampling order ("first-max-wins"), which keeps results
//! independent of hash-map iteration order.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::GalleryConfig;
use crate::loader::{BackgroundJobs, ImageLoader, SharedLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParams {
    pub stride_pixels: usize,
    pub quantize_step: u8,
}

impl SamplingParams {
    pub fn from_config(config: &GalleryConfig) -> Self {
        Self {
            stride_pixels: config.color_sample_stride,
            quantize_step: config.color_quantize_step,
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            stride_pixels: 10,
            quantize_step: 32,
        }
    }
}

/// Most frequent quantized RGB triple of an RGBA8 buffer, or `None` when no
/// pixel was sampled.
pub fn dominant_rgb(rgba: &[u8], params: SamplingParams) -> Option<[u8; 3]> {
    let step = params.quantize_step.max(1);
    let stride = params.stride_pixels.max(1) * 4;
    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    let mut best: Option<([u8; 3], u32)> = None;

    let mut offset = 0;
    while offset + 2 < rgba.len() {
        let bucket = [
            quantize(rgba[offset], step),
            quantize(rgba[offset + 1], step),
            quantize(rgba[offset + 2], step),
        ];
        let count = counts.entry(bucket).or_insert(0);
        *count += 1;
        // Strictly greater: an equal count reached later never displaces the
        // bucket that got there first.
        if best.map_or(true, |(_, max)| *count > max) {
            best = Some((bucket, *count));
        }
        offset += stride;
    }

    best.map(|(bucket, _)| bucket)
}

fn quantize(channel: u8, step: u8) -> u8 {
    channel - channel % step
}

pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

pub fn parse_hex(value: &str) -> Option<[u8; 3]> {
    let digits = value.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Produces the dominant colour for an image URL. Runs on a worker thread.
pub trait ColorSource: Send + Sync {
    fn dominant_color(&self, url: &str) -> Result<String>;
}

/// Decodes through an [`ImageLoader`] and histograms the pixels.
pub struct SampledColorSource {
    loader: SharedLoader,
    params: SamplingParams,
}

impl SampledColorSource {
    pub fn new(loader: SharedLoader, params: SamplingParams) -> Self {
        Self { loader, params }
    }
}

impl ColorSource for SampledColorSource {
    fn dominant_color(&self, url: &str) -> Result<String> {
        let image = self.loader.load(url)?;
        match dominant_rgb(&image.pixels, self.params) {
            Some(rgb) => Ok(to_hex(rgb)),
            None => bail!("image '{url}' has no pixels to sample"),
        }
    }
}

/// URL to hex colour; insert-once, never evicted.
#[derive(Debug, Default)]
pub struct ColorCache {
    entries: HashMap<String, String>,
}

impl ColorCache {
    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    /// Keeps the first colour stored for a URL.
    pub fn insert(&mut self, url: &str, hex: &str) -> &str {
        self.entries
            .entry(url.to_owned())
            .or_insert_with(|| hex.to_owned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A colour that finished extracting since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColor {
    pub url: String,
    pub hex: String,
    /// `false` when extraction failed and `hex` is the fallback colour.
    pub extracted: bool,
}

pub struct ColorExtractor {
    source: Arc<dyn ColorSource>,
    cache: ColorCache,
    jobs: BackgroundJobs<String, String>,
    fallback: String,
}

impl ColorExtractor {
    pub fn new(source: Arc<dyn ColorSource>, fallback: impl Into<String>) -> Self {
        Self {
            source,
            cache: ColorCache::default(),
            jobs: BackgroundJobs::new("color"),
            fallback: fallback.into(),
        }
    }

    pub fn from_loader(loader: Arc<dyn ImageLoader>, config: &GalleryConfig) -> Self {
        let source = SampledColorSource::new(loader, SamplingParams::from_config(config));
        Self::new(Arc::new(source), config.default_background.clone())
    }

    pub fn cache(&self) -> &ColorCache {
        &self.cache
    }

    /// Cached colour right away, or `None` after scheduling extraction. The
    /// result shows up in a later [`ColorExtractor::poll`].
    pub fn request(&mut self, url: &str) -> Option<String> {
        if let Some(hex) = self.cache.get(url) {
            return Some(hex.to_owned());
        }
        let source = Arc::clone(&self.source);
        let job_url = url.to_owned();
        self.jobs
            .submit(url.to_owned(), move || source.dominant_color(&job_url));
        None
    }

    pub fn poll(&mut self) -> Vec<ResolvedColor> {
        let done = self.jobs.drain();
        self.resolve(done)
    }

    /// Blocks for every outstanding extraction.
    pub fn wait_idle(&mut self) -> Vec<ResolvedColor> {
        let done = self.jobs.wait_all();
        self.resolve(done)
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.in_flight_count()
    }

    fn resolve(&mut self, done: Vec<crate::loader::JobOutput<String, String>>) -> Vec<ResolvedColor> {
        done.into_iter()
            .map(|output| match output.result {
                Ok(hex) => {
                    // Cached before anyone hears about it, so the next lookup
                    // is synchronous.
                    let hex = self.cache.insert(&output.key, &hex).to_owned();
                    ResolvedColor {
                        url: output.key,
                        hex,
                        extracted: true,
                    }
                }
                Err(error) => {
                    log::warn!("colour extraction failed for '{}': {error:#}", output.key);
                    ResolvedColor {
                        url: output.key,
                        hex: self.fallback.clone(),
                        extracted: false,
                    }
                }
            })
            .collect()
    }
}
