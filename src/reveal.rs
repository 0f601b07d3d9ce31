//! One-way "revealed" state per item, triggered by visibility in the
//! horizontally scrolling viewport.

use std::collections::{BTreeSet, HashSet};

use crate::layout::Rect;

#[derive(Debug, Clone)]
pub struct RevealObserver {
    threshold: f32,
    margin_x: f32,
    observed: BTreeSet<String>,
    revealed: HashSet<String>,
    connected: bool,
}

impl RevealObserver {
    pub fn new(threshold: f32, margin_x: f32) -> Self {
        Self {
            threshold,
            margin_x,
            observed: BTreeSet::new(),
            revealed: HashSet::new(),
            connected: true,
        }
    }

    pub fn observe(&mut self, form_key: &str) {
        if self.connected && !self.revealed.contains(form_key) {
            self.observed.insert(form_key.to_owned());
        }
    }

    pub fn unobserve(&mut self, form_key: &str) {
        self.observed.remove(form_key);
    }

    pub fn is_revealed(&self, form_key: &str) -> bool {
        self.revealed.contains(form_key)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Check every observed item against `root` (the scroll viewport) and
    /// return the keys revealed by this pass. Revealed items stop being
    /// observed; nothing is ever un-revealed.
    pub fn check<F>(&mut self, root: &Rect, mut rect_of: F) -> Vec<String>
    where
        F: FnMut(&str) -> Option<Rect>,
    {
        if !self.connected {
            return Vec::new();
        }

        let trigger_area = root.expand_x(self.margin_x);
        let newly_revealed: Vec<String> = self
            .observed
            .iter()
            .filter(|key| {
                rect_of(key.as_str())
                    .map_or(false, |rect| visible_fraction(&rect, &trigger_area) >= self.threshold)
            })
            .cloned()
            .collect();

        for key in &newly_revealed {
            self.observed.remove(key);
            self.revealed.insert(key.clone());
        }
        newly_revealed
    }

    pub fn disconnect(&mut self) {
        self.observed.clear();
        self.connected = false;
    }
}

/// Fraction of `item` inside `area`. An item without layout is never visible.
pub fn visible_fraction(item: &Rect, area: &Rect) -> f32 {
    let total = item.area();
    if total <= 0.0 {
        return 0.0;
    }
    item.intersection(area)
        .map_or(0.0, |overlap| overlap.area() / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Rect {
        Rect::new(0.0, 0.0, 1000.0, 800.0)
    }

    #[test]
    fn reveals_once_past_threshold_and_never_reverts() {
        let mut observer = RevealObserver::new(0.2, 0.0);
        observer.observe("haiku");

        let mut rect = Rect::new(1250.0, 100.0, 300.0, 400.0);
        assert!(observer.check(&root(), |_| Some(rect)).is_empty());

        // 10% visible: still hidden.
        rect.left = 970.0;
        assert!(observer.check(&root(), |_| Some(rect)).is_empty());

        // 20% visible.
        rect.left = 940.0;
        assert_eq!(observer.check(&root(), |_| Some(rect)), vec!["haiku".to_owned()]);
        assert!(observer.is_revealed("haiku"));

        rect.left = 5000.0;
        assert!(observer.check(&root(), |_| Some(rect)).is_empty());
        assert!(observer.is_revealed("haiku"));
        assert_eq!(observer.observed_count(), 0);
    }

    #[test]
    fn horizontal_margin_extends_trigger_area() {
        let mut observer = RevealObserver::new(0.2, 100.0);
        observer.observe("ode");
        let rect = Rect::new(1040.0, 0.0, 300.0, 400.0);
        assert_eq!(observer.check(&root(), |_| Some(rect)), vec!["ode".to_owned()]);
    }

    #[test]
    fn margin_does_not_apply_vertically() {
        let mut observer = RevealObserver::new(0.2, 100.0);
        observer.observe("ode");
        let rect = Rect::new(100.0, 850.0, 300.0, 400.0);
        assert!(observer.check(&root(), |_| Some(rect)).is_empty());
    }

    #[test]
    fn disconnect_stops_checks() {
        let mut observer = RevealObserver::new(0.2, 0.0);
        observer.observe("ode");
        observer.disconnect();
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(observer.check(&root(), |_| Some(rect)).is_empty());
        assert!(!observer.is_connected());
    }
}
