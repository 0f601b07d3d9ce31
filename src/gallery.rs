//! The per-gallery context: owns every item's scene, pointer state and
//! texture slot, and performs one frame of work when the scheduler ticks.
//!
//! Nothing here is global. The host (layout + DOM-like surface), the scene
//! backend and the application callbacks are all injected, so the whole
//! gallery runs headless against fakes.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;

use crate::background::HoverBackground;
use crate::color::{ColorExtractor, ResolvedColor};
use crate::config::GalleryConfig;
use crate::events::{EventKind, EventSource, GalleryEvent, Subscription};
use crate::items::{GalleryItem, PlaceholderMatcher};
use crate::layout::{ForcedAspect, Rect, SurfaceSize};
use crate::loader::SharedLoader;
use crate::pointer::PointerState;
use crate::reveal::RevealObserver;
use crate::scene::{DecodedImage, RenderScene, SceneFactory};
use crate::scroll::{ScrollMetrics, ScrollState, ScrollVelocityEstimator, VelocityTuning};
use crate::shader::SceneUniforms;
use crate::texture::{BindOutcome, LoadFailure, RequestOutcome, TextureManager};

/// Layout and presentation side of the page hosting the gallery.
pub trait HostSurface {
    /// Client rect of an item's image container, `None` when the item has no
    /// container at all. A zero-sized rect means layout has not settled.
    fn container_rect(&self, form_key: &str) -> Option<Rect>;

    /// The horizontally scrolling viewport, in client coordinates.
    fn viewport(&self) -> Rect;

    fn scroll_metrics(&self) -> ScrollMetrics;

    fn set_container_size(&mut self, form_key: &str, size: SurfaceSize);

    fn set_revealed(&mut self, form_key: &str);
}

/// Application callbacks. All optional.
pub trait GalleryHooks {
    fn select_form(&mut self, _form_key: &str, _image_url: &str) {}

    fn background_color_changed(&mut self, _hex: &str) {}

    /// Horizontal scroll progress, rounded to whole percent.
    fn scroll_progress(&mut self, _percent: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl GalleryHooks for NoHooks {}

/// Records every callback in order. Used by headless runs for reporting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallbackLog {
    pub selections: Vec<(String, String)>,
    pub backgrounds: Vec<String>,
    pub progress: Vec<u32>,
}

impl GalleryHooks for CallbackLog {
    fn select_form(&mut self, form_key: &str, image_url: &str) {
        self.selections
            .push((form_key.to_owned(), image_url.to_owned()));
    }

    fn background_color_changed(&mut self, hex: &str) {
        self.backgrounds.push(hex.to_owned());
    }

    fn scroll_progress(&mut self, percent: u32) {
        self.progress.push(percent);
    }
}

/// Where an item's scene is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStatus {
    /// Waiting for layout; `attempts` failed so far.
    Pending { attempts: u32 },
    Ready,
    /// Layout never settled within the retry budget.
    Abandoned,
    /// The item has no container to render into.
    Skipped,
}

enum SceneSlot {
    Pending { attempts: u32, next_try_ms: f64 },
    Ready(Box<dyn RenderScene>),
    Abandoned,
    Skipped,
}

impl SceneSlot {
    fn status(&self) -> SceneStatus {
        match self {
            Self::Pending { attempts, .. } => SceneStatus::Pending {
                attempts: *attempts,
            },
            Self::Ready(_) => SceneStatus::Ready,
            Self::Abandoned => SceneStatus::Abandoned,
            Self::Skipped => SceneStatus::Skipped,
        }
    }

    fn scene_mut(&mut self) -> Option<&mut dyn RenderScene> {
        match self {
            Self::Ready(scene) => Some(scene.as_mut()),
            _ => None,
        }
    }
}

struct ItemSlot {
    item: GalleryItem,
    pointer: PointerState,
    scene: SceneSlot,
}

impl ItemSlot {
    fn new(item: GalleryItem) -> Self {
        Self {
            item,
            pointer: PointerState::default(),
            scene: SceneSlot::Pending {
                attempts: 0,
                next_try_ms: f64::NEG_INFINITY,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownSummary {
    pub subscriptions_removed: usize,
    pub scenes_disposed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Mounted,
    TornDown,
}

pub struct Gallery<H, K = NoHooks> {
    config: GalleryConfig,
    aspect: ForcedAspect,
    slots: Vec<ItemSlot>,
    factory: Box<dyn SceneFactory>,
    host: H,
    hooks: K,
    scroll: ScrollVelocityEstimator,
    textures: TextureManager,
    colors: ColorExtractor,
    background: HoverBackground,
    reveal: RevealObserver,
    inbox: Rc<RefCell<VecDeque<GalleryEvent>>>,
    subscriptions: Vec<Subscription>,
    last_progress: Option<u32>,
    now_ms: f64,
    lifecycle: Lifecycle,
}

impl<H: HostSurface, K: GalleryHooks> Gallery<H, K> {
    pub fn new(
        config: GalleryConfig,
        items: Vec<GalleryItem>,
        loader: SharedLoader,
        factory: Box<dyn SceneFactory>,
        host: H,
        hooks: K,
    ) -> Result<Self> {
        config.validate()?;
        let aspect = ForcedAspect {
            width: config.aspect_width,
            height: config.aspect_height,
            max_height_fraction: config.max_height_fraction,
        };
        let placeholders = PlaceholderMatcher::from_config(&config)?;
        let textures = TextureManager::new(
            loader.clone(),
            placeholders,
            aspect,
            config.fallback_width,
        );
        let colors = ColorExtractor::from_loader(loader, &config);

        let mut gallery = Self {
            aspect,
            slots: Vec::new(),
            factory,
            host,
            hooks,
            scroll: ScrollVelocityEstimator::new(VelocityTuning::from_config(&config)),
            textures,
            colors,
            background: HoverBackground::new(
                config.default_background.clone(),
                config.hover_leave_delay_ms,
            ),
            reveal: RevealObserver::new(config.reveal_threshold, config.reveal_margin_x),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            subscriptions: Vec::new(),
            last_progress: None,
            now_ms: 0.0,
            lifecycle: Lifecycle::Created,
            config,
        };
        gallery.set_items(items);
        Ok(gallery)
    }

    /// Swap in a different colour extractor (custom source or fallback).
    pub fn with_colors(mut self, colors: ColorExtractor) -> Self {
        self.colors = colors;
        self
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn hooks(&self) -> &K {
        &self.hooks
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn colors(&self) -> &ColorExtractor {
        &self.colors
    }

    pub fn scroll_state(&self) -> ScrollState {
        self.scroll.state()
    }

    pub fn background_color(&self) -> &str {
        self.background.current()
    }

    pub fn is_mounted(&self) -> bool {
        self.lifecycle == Lifecycle::Mounted
    }

    pub fn is_revealed(&self, form_key: &str) -> bool {
        self.reveal.is_revealed(form_key)
    }

    pub fn reveal_connected(&self) -> bool {
        self.reveal.is_connected()
    }

    pub fn items(&self) -> impl Iterator<Item = &GalleryItem> {
        self.slots.iter().map(|slot| &slot.item)
    }

    pub fn item(&self, form_key: &str) -> Option<&GalleryItem> {
        self.slot(form_key).map(|slot| &slot.item)
    }

    pub fn pointer(&self, form_key: &str) -> Option<PointerState> {
        self.slot(form_key).map(|slot| slot.pointer)
    }

    pub fn scene_status(&self, form_key: &str) -> Option<SceneStatus> {
        self.slot(form_key).map(|slot| slot.scene.status())
    }

    /// Subscribe to every host event kind. Events are queued and applied at
    /// the start of the next frame.
    pub fn mount(&mut self, source: &mut dyn EventSource) {
        if self.lifecycle != Lifecycle::Created {
            log::warn!("gallery mount ignored: already mounted or torn down");
            return;
        }
        for kind in EventKind::ALL {
            let inbox = Rc::clone(&self.inbox);
            let subscription = source.subscribe(
                kind,
                Box::new(move |event: &GalleryEvent| inbox.borrow_mut().push_back(event.clone())),
            );
            self.subscriptions.push(subscription);
        }
        self.lifecycle = Lifecycle::Mounted;
        log::debug!("gallery mounted with {} items", self.slots.len());
    }

    /// Replace the item list. Unchanged items keep their scene, items whose
    /// image changed get a texture replacement, new items start scene init
    /// and removed items are disposed.
    pub fn set_items(&mut self, items: Vec<GalleryItem>) {
        let mut seen = HashSet::new();
        let items: Vec<GalleryItem> = items
            .into_iter()
            .filter(|item| {
                let fresh = seen.insert(item.form_key.clone());
                if !fresh {
                    log::warn!("ignoring duplicate gallery item '{}'", item.form_key);
                }
                fresh
            })
            .collect();

        let mut previous: Vec<ItemSlot> = std::mem::take(&mut self.slots);
        for removed in previous
            .iter_mut()
            .filter(|slot| !seen.contains(&slot.item.form_key))
        {
            self.dispose_slot(removed);
        }

        for item in items {
            let existing = previous
                .iter()
                .position(|slot| slot.item.form_key == item.form_key);
            match existing {
                Some(index) => {
                    let mut slot = previous.swap_remove(index);
                    let url_changed = slot.item.image_url != item.image_url;
                    slot.item = item;
                    if url_changed && matches!(slot.scene, SceneSlot::Ready(_)) {
                        self.request_texture(&slot.item);
                    }
                    self.slots.push(slot);
                }
                None => {
                    self.reveal.observe(&item.form_key);
                    self.slots.push(ItemSlot::new(item));
                }
            }
        }
    }

    /// Read back an item's rendered surface, if the backend supports it.
    pub fn capture(&mut self, form_key: &str) -> Result<Option<DecodedImage>> {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.item.form_key == form_key)
            .and_then(|slot| slot.scene.scene_mut())
        {
            Some(scene) => scene.capture(),
            None => Ok(None),
        }
    }

    /// Block until every texture decode and colour extraction has finished
    /// and apply the results.
    pub fn wait_idle(&mut self) {
        let failures = self.textures.wait_idle(self.host.viewport().height);
        self.settle_textures(failures);
        let resolved = self.colors.wait_idle();
        self.apply_colors(resolved);
    }

    /// Ordered teardown: observer, listeners, scenes, then per-item state.
    /// The caller cancels its animation loop before calling this.
    pub fn teardown(&mut self, source: &mut dyn EventSource) -> TeardownSummary {
        let mut summary = TeardownSummary::default();
        if self.lifecycle == Lifecycle::TornDown {
            return summary;
        }

        self.reveal.disconnect();

        for subscription in self.subscriptions.drain(..) {
            if source.unsubscribe(subscription) {
                summary.subscriptions_removed += 1;
            } else {
                log::warn!("subscription for {:?} was already gone", subscription.kind());
            }
        }
        self.inbox.borrow_mut().clear();

        let mut slots = std::mem::take(&mut self.slots);
        for slot in &mut slots {
            if self.dispose_slot(slot) {
                summary.scenes_disposed += 1;
            }
        }

        self.textures.clear();
        self.background.cancel();
        self.last_progress = None;
        self.lifecycle = Lifecycle::TornDown;
        log::debug!(
            "gallery torn down: {} subscriptions, {} scenes",
            summary.subscriptions_removed,
            summary.scenes_disposed
        );
        summary
    }

    /// One frame of work. Only the scheduler calls this.
    pub(crate) fn frame(&mut self, now_ms: f64, time: f32) {
        if self.lifecycle != Lifecycle::Mounted {
            return;
        }
        self.now_ms = now_ms;

        self.drain_events();
        self.init_pending_scenes();

        let failures = self.textures.poll(self.host.viewport().height);
        self.settle_textures(failures);
        let resolved = self.colors.poll();
        self.apply_colors(resolved);

        if let Some(hex) = self.background.tick(now_ms) {
            self.hooks.background_color_changed(&hex);
        }

        let velocity = self.scroll.update(now_ms / 1000.0);

        let root = self.host.viewport();
        let host = &self.host;
        let revealed = self.reveal.check(&root, |key| host.container_rect(key));
        for key in revealed {
            log::debug!("revealed '{key}'");
            self.host.set_revealed(&key);
        }

        let (pointer_damping, enter_damping) =
            (self.config.pointer_damping, self.config.enter_damping);
        let fallback = SurfaceSize::new(self.config.fallback_width, self.config.fallback_height);
        for slot in &mut self.slots {
            slot.pointer.step(pointer_damping, enter_damping);
            let Some(scene) = slot.scene.scene_mut() else {
                continue;
            };
            let quad_size = self
                .textures
                .quad_size(&slot.item.form_key)
                .unwrap_or(fallback);
            scene.update(&SceneUniforms {
                time,
                scroll_velocity: velocity,
                mouse_enter_amount: slot.pointer.enter_amount,
                _padding: 0.0,
                mouse_over_pos: slot.pointer.current,
                quad_size: quad_size.as_array(),
            });
            if let Err(error) = scene.draw() {
                log::warn!("draw failed for '{}': {error:#}", slot.item.form_key);
            }
        }
    }

    fn slot(&self, form_key: &str) -> Option<&ItemSlot> {
        self.slots.iter().find(|slot| slot.item.form_key == form_key)
    }

    fn slot_mut(&mut self, form_key: &str) -> Option<&mut ItemSlot> {
        self.slots
            .iter_mut()
            .find(|slot| slot.item.form_key == form_key)
    }

    fn drain_events(&mut self) {
        let events: Vec<GalleryEvent> = self.inbox.borrow_mut().drain(..).collect();
        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: GalleryEvent) {
        match event {
            GalleryEvent::PointerMove { form, x, y } => {
                let Some(rect) = self.host.container_rect(&form) else {
                    return;
                };
                if let Some(slot) = self.slot_mut(&form) {
                    slot.pointer.pointer_move(x, y, &rect);
                }
            }
            GalleryEvent::PointerEnter(form) => {
                let Some(slot) = self.slot_mut(&form) else {
                    log::debug!("pointer entered unknown item '{form}'");
                    return;
                };
                slot.pointer.pointer_enter();
                let url = slot.item.image_url.clone();
                let cached = self.colors.request(&url);
                if let Some(hex) = self.background.enter(&form, &url, cached.as_deref()) {
                    self.hooks.background_color_changed(&hex);
                }
            }
            GalleryEvent::PointerLeave(form) => {
                if let Some(slot) = self.slot_mut(&form) {
                    slot.pointer.pointer_leave();
                }
                self.background.leave(&form, self.now_ms);
            }
            GalleryEvent::Click(form) => {
                if let Some(url) = self.item(&form).map(|item| item.image_url.clone()) {
                    self.hooks.select_form(&form, &url);
                }
            }
            GalleryEvent::Scroll(offset) => {
                self.scroll.observe_offset(offset);
                let percent = self.host.scroll_metrics().progress_percent().round() as u32;
                if self.last_progress != Some(percent) {
                    self.last_progress = Some(percent);
                    self.hooks.scroll_progress(percent);
                }
            }
            GalleryEvent::Resize(viewport) => {
                log::debug!("viewport resized to {}x{}", viewport.width, viewport.height);
                self.refit_scenes(viewport.height);
            }
        }
    }

    fn init_pending_scenes(&mut self) {
        let now_ms = self.now_ms;
        let viewport_height = self.host.viewport().height;
        let max_attempts = self.config.init_max_attempts;
        let base_delay = self.config.init_retry_delay_ms;

        let mut created = Vec::new();
        for slot in &mut self.slots {
            let SceneSlot::Pending {
                attempts,
                next_try_ms,
            } = slot.scene
            else {
                continue;
            };
            if now_ms < next_try_ms {
                continue;
            }
            let key = slot.item.form_key.as_str();

            let Some(rect) = self.host.container_rect(key) else {
                log::warn!("gallery item '{key}' has no container; skipping it");
                slot.scene = SceneSlot::Skipped;
                continue;
            };

            let outcome = if rect.has_layout() {
                let size = self.aspect.fit(rect.width, viewport_height);
                self.factory.create_scene(key, size).map(|scene| (scene, size))
            } else {
                Err(anyhow::anyhow!("container has no layout yet"))
            };

            match outcome {
                Ok((scene, size)) => {
                    log::debug!("scene ready for '{key}' at {}x{}", size.width, size.height);
                    self.textures.set_quad_size(key, size);
                    slot.scene = SceneSlot::Ready(scene);
                    created.push(slot.item.clone());
                }
                Err(error) => {
                    let attempts = attempts + 1;
                    if attempts >= max_attempts {
                        log::warn!(
                            "abandoning scene for '{key}' after {attempts} attempts: {error:#}"
                        );
                        slot.scene = SceneSlot::Abandoned;
                    } else {
                        let delay = base_delay * f64::from(1u32 << (attempts - 1).min(16));
                        log::debug!("scene init for '{key}' deferred {delay}ms: {error:#}");
                        slot.scene = SceneSlot::Pending {
                            attempts,
                            next_try_ms: now_ms + delay,
                        };
                    }
                }
            }
        }

        for item in created {
            self.request_texture(&item);
        }
    }

    fn request_texture(&mut self, item: &GalleryItem) {
        let Some(rect) = self.host.container_rect(&item.form_key) else {
            return;
        };
        let viewport_height = self.host.viewport().height;
        match self
            .textures
            .request(&item.form_key, &item.image_url, rect.width, viewport_height)
        {
            RequestOutcome::Loading(size) => self.host.set_container_size(&item.form_key, size),
            RequestOutcome::Skipped(reason) => {
                log::debug!("texture request for '{}' skipped: {reason:?}", item.form_key);
            }
        }
    }

    fn settle_textures(&mut self, failures: Vec<LoadFailure>) {
        for failure in failures {
            self.host.set_container_size(&failure.form_key, failure.size);
        }

        for slot in &mut self.slots {
            let key = slot.item.form_key.as_str();
            let Some(scene) = slot.scene.scene_mut() else {
                continue;
            };
            match self.textures.bind_ready(key, &mut *scene) {
                Some(BindOutcome::Bound(size)) => {
                    if let Err(error) = scene.resize(size) {
                        log::warn!("resizing surface for '{key}' failed: {error:#}");
                    }
                    self.host.set_container_size(key, size);
                }
                Some(BindOutcome::Rejected(size)) => self.host.set_container_size(key, size),
                None => {}
            }
        }
    }

    fn apply_colors(&mut self, resolved: Vec<ResolvedColor>) {
        for color in resolved {
            if let Some(hex) = self.background.color_resolved(&color.url, &color.hex) {
                self.hooks.background_color_changed(&hex);
            }
        }
    }

    fn refit_scenes(&mut self, viewport_height: f32) {
        for slot in &mut self.slots {
            let key = slot.item.form_key.as_str();
            let Some(scene) = slot.scene.scene_mut() else {
                continue;
            };
            let Some(rect) = self.host.container_rect(key) else {
                continue;
            };
            let size = self.aspect.fit(rect.width, viewport_height);
            if let Err(error) = scene.resize(size) {
                log::warn!("resizing surface for '{key}' failed: {error:#}");
                continue;
            }
            self.textures.set_quad_size(key, size);
            self.host.set_container_size(key, size);
        }
    }

    /// Release everything an item holds. Returns whether a scene was disposed.
    fn dispose_slot(&mut self, slot: &mut ItemSlot) -> bool {
        let key = slot.item.form_key.as_str();
        self.reveal.unobserve(key);
        if self.background.hovered_form() == Some(key) {
            self.background.leave(key, self.now_ms);
        }
        match std::mem::replace(&mut slot.scene, SceneSlot::Skipped) {
            SceneSlot::Ready(mut scene) => {
                self.textures.release(key, Some(scene.as_mut()));
                scene.dispose();
                log::debug!("disposed scene for '{key}'");
                true
            }
            _ => {
                self.textures.release(key, None);
                false
            }
        }
    }
}
