//! Horizontal scroll velocity shared by every scene in a gallery.
//!
//! There is one estimator per gallery: all items live in the same horizontal
//! scroll container, so the same velocity is broadcast to every scene in a
//! frame.

use crate::config::GalleryConfig;

/// Last observed offset and the normalized velocity derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollState {
    pub scroll_offset: f32,
    pub velocity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct VelocityTuning {
    pub normalization: f32,
    pub max_velocity: f32,
    pub idle_threshold: f32,
    pub idle_decay: f32,
}

impl VelocityTuning {
    pub fn from_config(config: &GalleryConfig) -> Self {
        Self {
            normalization: config.scroll_normalization,
            max_velocity: config.max_velocity,
            idle_threshold: config.idle_scroll_threshold,
            idle_decay: config.idle_decay,
        }
    }
}

impl Default for VelocityTuning {
    fn default() -> Self {
        Self::from_config(&GalleryConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ScrollVelocityEstimator {
    tuning: VelocityTuning,
    state: ScrollState,
    previous_offset: f32,
    previous_time: Option<f64>,
}

impl ScrollVelocityEstimator {
    pub fn new(tuning: VelocityTuning) -> Self {
        Self {
            tuning,
            state: ScrollState::default(),
            previous_offset: 0.0,
            previous_time: None,
        }
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn velocity(&self) -> f32 {
        self.state.velocity
    }

    /// Record the latest offset from a scroll event without touching velocity.
    pub fn observe_offset(&mut self, offset: f32) {
        self.state.scroll_offset = offset;
    }

    /// Advance the estimate to `now_seconds` using the last observed offset.
    pub fn update(&mut self, now_seconds: f64) -> f32 {
        let offset = self.state.scroll_offset;
        self.sample(offset, now_seconds)
    }

    /// Feed an offset/timestamp pair and return the new velocity.
    ///
    /// The first sample only establishes the baseline. Idle frames
    /// (`|delta| < idle_threshold`) decay the previous velocity instead of
    /// recomputing it from sub-pixel noise.
    pub fn sample(&mut self, offset: f32, now_seconds: f64) -> f32 {
        let tuning = self.tuning;
        let delta_scroll = offset - self.previous_offset;
        let delta_time = self
            .previous_time
            .map_or(0.0, |previous| (now_seconds - previous) as f32);

        let velocity = if self.previous_time.is_none() {
            0.0
        } else if delta_scroll.abs() < tuning.idle_threshold {
            self.state.velocity * tuning.idle_decay
        } else {
            let raw = if delta_time > 0.0 {
                delta_scroll / delta_time
            } else {
                0.0
            };
            raw / tuning.normalization
        };

        self.state = ScrollState {
            scroll_offset: offset,
            velocity: velocity.clamp(-tuning.max_velocity, tuning.max_velocity),
        };
        self.previous_offset = offset;
        self.previous_time = Some(now_seconds);
        self.state.velocity
    }
}

/// Horizontal scroll extents of the gallery container.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f32,
    pub scroll_width: f32,
    pub client_width: f32,
}

impl ScrollMetrics {
    /// Progress through the scrollable range as a percentage in `[0, 100]`.
    /// A container without overflow reports 0.
    pub fn progress_percent(&self) -> f32 {
        let range = self.scroll_width - self.client_width;
        if range <= 0.0 {
            return 0.0;
        }
        (self.offset / range * 100.0).clamp(0.0, 100.0)
    }
}
