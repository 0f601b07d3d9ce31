//! Host input as explicit subscriptions.
//!
//! Every `subscribe` hands back a [`Subscription`] that must be returned to
//! `unsubscribe` at teardown; [`EventBus`] is the in-process source used by
//! headless runs and tests.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::layout::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PointerMove,
    PointerEnter,
    PointerLeave,
    Activate,
    Scroll,
    Resize,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::PointerMove,
        EventKind::PointerEnter,
        EventKind::PointerLeave,
        EventKind::Activate,
        EventKind::Scroll,
        EventKind::Resize,
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum GalleryEvent {
    PointerMove {
        form: String,
        x: f32,
        y: f32,
    },
    PointerEnter(String),
    PointerLeave(String),
    /// Click or tap on an item.
    Click(String),
    /// New horizontal offset of the gallery container.
    Scroll(f32),
    Resize(Viewport),
}

impl GalleryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PointerMove { .. } => EventKind::PointerMove,
            Self::PointerEnter(_) => EventKind::PointerEnter,
            Self::PointerLeave(_) => EventKind::PointerLeave,
            Self::Click(_) => EventKind::Activate,
            Self::Scroll(_) => EventKind::Scroll,
            Self::Resize(_) => EventKind::Resize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

pub type EventHandler = Box<dyn FnMut(&GalleryEvent)>;

pub trait EventSource {
    fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> Subscription;

    /// Returns whether the subscription was still live.
    fn unsubscribe(&mut self, subscription: Subscription) -> bool;
}

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: BTreeMap<Subscription, EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every handler of the event's kind, in subscription order.
    pub fn emit(&mut self, event: &GalleryEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (subscription, handler) in self.handlers.iter_mut() {
            if subscription.kind == kind {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn listener_count_for(&self, kind: EventKind) -> usize {
        self.handlers.keys().filter(|sub| sub.kind == kind).count()
    }
}

impl EventSource for EventBus {
    fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> Subscription {
        self.next_id += 1;
        let subscription = Subscription {
            kind,
            id: self.next_id,
        };
        self.handlers.insert(subscription, handler);
        subscription
    }

    fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.handlers.remove(&subscription).is_some()
    }
}
