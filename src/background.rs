//! Ambient background colour that follows the hovered item.
//!
//! Leaving an item schedules a reset to the default colour; entering any item
//! before the delay elapses cancels it, so moving between neighbouring items
//! never flashes the default.

#[derive(Debug, Clone)]
pub struct HoverBackground {
    default_color: String,
    leave_delay_ms: f64,
    current: String,
    hovered: Option<HoveredItem>,
    reset_at_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HoveredItem {
    form_key: String,
    image_url: String,
}

impl HoverBackground {
    pub fn new(default_color: impl Into<String>, leave_delay_ms: f64) -> Self {
        let default_color = default_color.into();
        Self {
            current: default_color.clone(),
            default_color,
            leave_delay_ms,
            hovered: None,
            reset_at_ms: None,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn hovered_form(&self) -> Option<&str> {
        self.hovered.as_ref().map(|item| item.form_key.as_str())
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_at_ms.is_some()
    }

    /// Pointer entered an item. The caller supplies its colour now if cached,
    /// or later through [`HoverBackground::color_resolved`]. Returns the new
    /// colour when it changed.
    pub fn enter(&mut self, form_key: &str, image_url: &str, cached: Option<&str>) -> Option<String> {
        self.reset_at_ms = None;
        self.hovered = Some(HoveredItem {
            form_key: form_key.to_owned(),
            image_url: image_url.to_owned(),
        });
        cached.and_then(|hex| self.set(hex))
    }

    pub fn leave(&mut self, form_key: &str, now_ms: f64) {
        if self.hovered_form() == Some(form_key) {
            self.hovered = None;
        }
        if self.hovered.is_none() {
            self.reset_at_ms = Some(now_ms + self.leave_delay_ms);
        }
    }

    /// An extraction finished. Applied only if that image is still hovered.
    pub fn color_resolved(&mut self, image_url: &str, hex: &str) -> Option<String> {
        let still_hovered = self
            .hovered
            .as_ref()
            .map_or(false, |item| item.image_url == image_url);
        if still_hovered {
            self.set(hex)
        } else {
            None
        }
    }

    /// Fire the pending reset once its deadline has passed.
    pub fn tick(&mut self, now_ms: f64) -> Option<String> {
        match self.reset_at_ms {
            Some(deadline) if now_ms >= deadline => {
                self.reset_at_ms = None;
                let default_color = self.default_color.clone();
                self.set(&default_color)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.reset_at_ms = None;
        self.hovered = None;
    }

    fn set(&mut self, hex: &str) -> Option<String> {
        if self.current == hex {
            return None;
        }
        self.current = hex.to_owned();
        Some(self.current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::HoverBackground;

    #[test]
    fn enter_with_cached_colour_changes_immediately() {
        let mut bg = HoverBackground::new("#ffffff", 100.0);
        assert_eq!(bg.enter("a", "a.png", Some("#112233")).as_deref(), Some("#112233"));
        assert_eq!(bg.enter("a", "a.png", Some("#112233")), None);
    }

    #[test]
    fn leave_resets_after_delay() {
        let mut bg = HoverBackground::new("#ffffff", 100.0);
        bg.enter("a", "a.png", Some("#112233"));
        bg.leave("a", 1000.0);
        assert_eq!(bg.tick(1099.0), None);
        assert_eq!(bg.tick(1100.0).as_deref(), Some("#ffffff"));
        assert!(!bg.reset_pending());
    }

    #[test]
    fn reentering_before_delay_cancels_reset() {
        let mut bg = HoverBackground::new("#ffffff", 100.0);
        bg.enter("a", "a.png", Some("#112233"));
        bg.leave("a", 1000.0);
        assert_eq!(bg.enter("b", "b.png", Some("#445566")).as_deref(), Some("#445566"));
        assert_eq!(bg.tick(1500.0), None);
        assert_eq!(bg.current(), "#445566");
    }

    #[test]
    fn late_colour_for_item_no_longer_hovered_is_ignored() {
        let mut bg = HoverBackground::new("#ffffff", 100.0);
        bg.enter("a", "a.png", None);
        bg.enter("b", "b.png", None);
        assert_eq!(bg.color_resolved("a.png", "#112233"), None);
        assert_eq!(bg.color_resolved("b.png", "#445566").as_deref(), Some("#445566"));
    }
}
