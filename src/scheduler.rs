//! The animation loop: the only path that drives gallery frames.

use std::time::Instant;

use crate::events::EventSource;
use crate::gallery::{Gallery, GalleryHooks, HostSurface, TeardownSummary};

/// Nominal display refresh used for synthetic frame deltas.
pub const NOMINAL_FPS: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct Scheduler {
    time_step: f32,
    time: f32,
    elapsed_ms: f64,
    frames: u64,
    running: bool,
}

impl Scheduler {
    /// Mount `gallery` on `source` and start the loop.
    pub fn start<H, K>(gallery: &mut Gallery<H, K>, source: &mut dyn EventSource) -> Self
    where
        H: HostSurface,
        K: GalleryHooks,
    {
        gallery.mount(source);
        Self {
            time_step: gallery.config().time_step,
            time: 0.0,
            elapsed_ms: 0.0,
            frames: 0,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Shader time accumulator; advances a fixed step per tick.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Advance wall time by `delta_seconds` and run one frame. Returns
    /// `false` once cancelled.
    pub fn tick<H, K>(&mut self, gallery: &mut Gallery<H, K>, delta_seconds: f64) -> bool
    where
        H: HostSurface,
        K: GalleryHooks,
    {
        if !self.running {
            return false;
        }
        self.elapsed_ms += delta_seconds.max(0.0) * 1000.0;
        self.time += self.time_step;
        self.frames += 1;
        gallery.frame(self.elapsed_ms, self.time);
        true
    }

    pub fn cancel(&mut self) {
        if self.running {
            log::debug!("animation loop cancelled after {} frames", self.frames);
        }
        self.running = false;
    }

    /// Unmount: cancel the loop first, then tear the gallery down.
    pub fn shutdown<H, K>(
        mut self,
        gallery: &mut Gallery<H, K>,
        source: &mut dyn EventSource,
    ) -> TeardownSummary
    where
        H: HostSurface,
        K: GalleryHooks,
    {
        self.cancel();
        gallery.teardown(source)
    }
}

/// Produces frame deltas, either from the wall clock or at a fixed rate.
#[derive(Debug, Clone)]
pub enum FramePump {
    Fixed { delta_seconds: f64 },
    Realtime { last: Option<Instant> },
}

impl FramePump {
    pub fn fixed(fps: f64) -> Self {
        Self::Fixed {
            delta_seconds: 1.0 / fps.max(1.0),
        }
    }

    pub fn realtime() -> Self {
        Self::Realtime { last: None }
    }

    /// Seconds since the previous call. The first realtime delta is one
    /// nominal frame.
    pub fn next_delta(&mut self) -> f64 {
        match self {
            Self::Fixed { delta_seconds } => *delta_seconds,
            Self::Realtime { last } => {
                let now = Instant::now();
                let delta = last.map_or(1.0 / NOMINAL_FPS, |previous| {
                    now.duration_since(previous).as_secs_f64()
                });
                *last = Some(now);
                delta
            }
        }
    }
}

impl Default for FramePump {
    fn default() -> Self {
        Self::fixed(NOMINAL_FPS)
    }
}
