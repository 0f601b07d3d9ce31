use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

/// Every tunable constant of the gallery. Defaults reproduce the reference
/// feel; a manifest may override any subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GalleryConfig {
    /// Raw px/s velocity is divided by this before clamping.
    pub scroll_normalization: f32,
    pub max_velocity: f32,
    /// Below this many pixels of offset change a frame counts as idle.
    pub idle_scroll_threshold: f32,
    pub idle_decay: f32,
    pub pointer_damping: f32,
    pub enter_damping: f32,
    /// Seconds added to the shader time accumulator per tick.
    pub time_step: f32,
    pub aspect_width: f32,
    pub aspect_height: f32,
    pub max_height_fraction: f32,
    pub mesh_segments: u32,
    pub reveal_threshold: f32,
    pub reveal_margin_x: f32,
    pub hover_leave_delay_ms: f64,
    pub default_background: String,
    pub color_sample_stride: usize,
    pub color_quantize_step: u8,
    pub init_max_attempts: u32,
    pub init_retry_delay_ms: f64,
    pub fallback_width: f32,
    pub fallback_height: f32,
    pub placeholder_patterns: Vec<String>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            scroll_normalization: 150.0,
            max_velocity: 7.0,
            idle_scroll_threshold: 0.5,
            idle_decay: 0.9,
            pointer_damping: 0.05,
            enter_damping: 0.1,
            time_step: 0.016,
            aspect_width: 3.0,
            aspect_height: 4.0,
            max_height_fraction: 0.85,
            mesh_segments: 100,
            reveal_threshold: 0.2,
            reveal_margin_x: 100.0,
            hover_leave_delay_ms: 100.0,
            default_background: "#f5f0e8".to_owned(),
            color_sample_stride: 10,
            color_quantize_step: 32,
            init_max_attempts: 3,
            init_retry_delay_ms: 100.0,
            fallback_width: 400.0,
            fallback_height: 600.0,
            placeholder_patterns: vec![
                r"^placeholder://".to_owned(),
                r"/placeholder(-[a-z0-9_-]+)?\.(png|jpe?g|webp|svg)$".to_owned(),
            ],
        }
    }
}

impl GalleryConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("pointer_damping", self.pointer_damping),
            ("enter_damping", self.enter_damping),
            ("idle_decay", self.idle_decay),
        ] {
            if !(value > 0.0 && value < 1.0) {
                bail!("{name} must be in (0, 1), got {value}");
            }
        }

        // Negated comparisons so NaN fails too.
        for (name, value) in [
            ("scroll_normalization", self.scroll_normalization),
            ("max_velocity", self.max_velocity),
            ("time_step", self.time_step),
            ("aspect_width", self.aspect_width),
            ("aspect_height", self.aspect_height),
            ("fallback_width", self.fallback_width),
            ("fallback_height", self.fallback_height),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                bail!("{name} must be a positive number, got {value}");
            }
        }
        for (name, value) in [
            ("idle_scroll_threshold", f64::from(self.idle_scroll_threshold)),
            ("reveal_margin_x", f64::from(self.reveal_margin_x)),
            ("hover_leave_delay_ms", self.hover_leave_delay_ms),
            ("init_retry_delay_ms", self.init_retry_delay_ms),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                bail!("{name} must be a non-negative number, got {value}");
            }
        }
        if !(self.max_height_fraction > 0.0 && self.max_height_fraction <= 1.0) {
            bail!("max_height_fraction must be in (0, 1]");
        }
        if self.mesh_segments == 0 {
            bail!("mesh_segments must be > 0");
        }
        if !(0.0..=1.0).contains(&self.reveal_threshold) {
            bail!("reveal_threshold must be in [0, 1]");
        }
        if self.color_sample_stride == 0 {
            bail!("color_sample_stride must be > 0");
        }
        if self.color_quantize_step == 0 {
            bail!("color_quantize_step must be > 0");
        }
        if self.init_max_attempts == 0 {
            bail!("init_max_attempts must be at least 1");
        }
        if crate::color::parse_hex(&self.default_background).is_none() {
            bail!(
                "default_background must be a #rrggbb colour, got '{}'",
                self.default_background
            );
        }
        self.compile_placeholder_patterns()?;
        Ok(())
    }

    pub fn compile_placeholder_patterns(&self) -> Result<Vec<Regex>> {
        self.placeholder_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid placeholder pattern '{pattern}'"))
            })
            .collect()
    }
}
