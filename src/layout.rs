use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in host (client) pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn has_layout(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn expand_x(&self, margin: f32) -> Self {
        Self {
            left: self.left - margin,
            top: self.top,
            width: self.width + margin * 2.0,
            height: self.height,
        }
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// Size of an item surface in host pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn as_array(&self) -> [f32; 2] {
        [self.width, self.height]
    }

    /// Whole-pixel dimensions for GPU allocations, never zero.
    pub fn pixels(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Portrait sizing rule applied to every item container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedAspect {
    pub width: f32,
    pub height: f32,
    pub max_height_fraction: f32,
}

impl Default for ForcedAspect {
    fn default() -> Self {
        Self {
            width: 3.0,
            height: 4.0,
            max_height_fraction: 0.85,
        }
    }
}

impl ForcedAspect {
    /// Size a container of `container_width` to the forced ratio.
    ///
    /// The height is `W * h/w` unless that exceeds the viewport cap, in which
    /// case the height is the cap and the width is recomputed from it. The
    /// source image's own aspect ratio never participates.
    pub fn fit(&self, container_width: f32, viewport_height: f32) -> SurfaceSize {
        let height = container_width * self.height / self.width;
        let max_height = viewport_height * self.max_height_fraction;
        if height > max_height {
            SurfaceSize::new(max_height * self.width / self.height, max_height)
        } else {
            SurfaceSize::new(container_width, height)
        }
    }
}
