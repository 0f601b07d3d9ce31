//! Per-item pointer position and hover intensity, smoothed every frame.

use crate::helpers::{lerp, lerp_vec2};
use crate::layout::Rect;

pub const POINTER_CENTER: [f32; 2] = [0.5, 0.5];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    pub current: [f32; 2],
    pub target: [f32; 2],
    pub enter_amount: f32,
    pub enter_target: f32,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            current: POINTER_CENTER,
            target: POINTER_CENTER,
            enter_amount: 0.0,
            enter_target: 0.0,
        }
    }
}

impl PointerState {
    pub fn pointer_enter(&mut self) {
        self.enter_target = 1.0;
    }

    pub fn pointer_leave(&mut self) {
        self.enter_target = 0.0;
        self.target = POINTER_CENTER;
    }

    pub fn pointer_move(&mut self, client_x: f32, client_y: f32, rect: &Rect) {
        if let Some(target) = normalized_pointer(client_x, client_y, rect) {
            self.target = target;
        }
    }

    /// One frame of smoothing. Position chases more slowly than intensity.
    pub fn step(&mut self, pointer_damping: f32, enter_damping: f32) {
        self.current = lerp_vec2(self.current, self.target, pointer_damping);
        self.enter_amount = lerp(self.enter_amount, self.enter_target, enter_damping);
    }
}

/// Client coordinates to `[0, 1]` surface coordinates with Y pointing up,
/// matching texture space. `None` for a surface without layout.
pub fn normalized_pointer(client_x: f32, client_y: f32, rect: &Rect) -> Option<[f32; 2]> {
    if !rect.has_layout() {
        return None;
    }
    let x = (client_x - rect.left) / rect.width;
    let y = 1.0 - (client_y - rect.top) / rect.height;
    Some([x, y])
}
