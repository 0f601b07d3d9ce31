//! Loads, replaces and disposes the image texture bound to each scene.
//!
//! Decoding happens on worker threads. Finished images wait in their slot
//! until the frame loop hands over the item's scene, so a load that finishes
//! before the scene exists is bound as soon as it does.

use std::collections::HashMap;
use std::sync::Arc;

use crate::layout::{ForcedAspect, SurfaceSize};
use crate::items::PlaceholderMatcher;
use crate::loader::{BackgroundJobs, SharedLoader};
use crate::scene::{DecodedImage, RenderScene, TextureId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundImage {
    pub texture: TextureId,
    pub url: String,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    url: String,
    generation: u64,
    size: SurfaceSize,
}

#[derive(Debug)]
struct ReadyImage {
    url: String,
    image: DecodedImage,
    size: SurfaceSize,
}

#[derive(Debug, Default)]
struct TextureSlot {
    bound: Option<BoundImage>,
    pending: Option<PendingLoad>,
    ready: Option<ReadyImage>,
    quad_size: SurfaceSize,
}

/// Why a request did not start a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyBound,
    AlreadyLoading,
    PlaceholderOverContent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    /// Load started; the container should take this size now.
    Loading(SurfaceSize),
    Skipped(SkipReason),
}

/// What [`TextureManager::bind_ready`] did with a finished image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindOutcome {
    /// The image replaced the previous texture; the surface takes this size.
    Bound(SurfaceSize),
    /// The scene refused the image. The previous texture stays bound and the
    /// container goes back to this size.
    Rejected(SurfaceSize),
}

/// A decode failure whose container size had to be restored.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub form_key: String,
    pub url: String,
    pub size: SurfaceSize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureStats {
    pub loads_started: u64,
    pub binds: u64,
    pub disposes: u64,
    pub failures: u64,
}

pub struct TextureManager {
    loader: SharedLoader,
    placeholders: PlaceholderMatcher,
    aspect: ForcedAspect,
    fallback_width: f32,
    jobs: BackgroundJobs<(String, u64), DecodedImage>,
    // Shared across slots so a released and re-added item never reuses a
    // job key that is still in flight.
    next_generation: u64,
    slots: HashMap<String, TextureSlot>,
    stats: TextureStats,
}

impl TextureManager {
    pub fn new(
        loader: SharedLoader,
        placeholders: PlaceholderMatcher,
        aspect: ForcedAspect,
        fallback_width: f32,
    ) -> Self {
        Self {
            loader,
            placeholders,
            aspect,
            fallback_width,
            jobs: BackgroundJobs::new("texture"),
            next_generation: 0,
            slots: HashMap::new(),
            stats: TextureStats::default(),
        }
    }

    pub fn stats(&self) -> TextureStats {
        self.stats
    }

    pub fn bound(&self, form_key: &str) -> Option<&BoundImage> {
        self.slots.get(form_key)?.bound.as_ref()
    }

    pub fn quad_size(&self, form_key: &str) -> Option<SurfaceSize> {
        self.slots.get(form_key).map(|slot| slot.quad_size)
    }

    pub fn is_loading(&self, form_key: &str) -> bool {
        self.slots
            .get(form_key)
            .map_or(false, |slot| slot.pending.is_some() || slot.ready.is_some())
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.in_flight_count()
    }

    /// Start loading `url` for an item unless it would be redundant or would
    /// let a placeholder cover real content.
    pub fn request(
        &mut self,
        form_key: &str,
        url: &str,
        container_width: f32,
        viewport_height: f32,
    ) -> RequestOutcome {
        let is_placeholder = self.placeholders.is_placeholder(url);
        let slot = self.slots.entry(form_key.to_owned()).or_default();

        if slot.bound.as_ref().map_or(false, |bound| bound.url == url) {
            return RequestOutcome::Skipped(SkipReason::AlreadyBound);
        }
        let queued_url = slot
            .pending
            .as_ref()
            .map(|pending| pending.url.as_str())
            .or(slot.ready.as_ref().map(|ready| ready.url.as_str()));
        if queued_url == Some(url) {
            return RequestOutcome::Skipped(SkipReason::AlreadyLoading);
        }
        if is_placeholder && (slot.bound.is_some() || queued_url.is_some()) {
            return RequestOutcome::Skipped(SkipReason::PlaceholderOverContent);
        }

        let size = self.aspect.fit(container_width, viewport_height);
        self.next_generation += 1;
        let generation = self.next_generation;
        slot.ready = None;
        slot.pending = Some(PendingLoad {
            url: url.to_owned(),
            generation,
            size,
        });

        let loader = Arc::clone(&self.loader);
        let job_url = url.to_owned();
        self.jobs
            .submit((form_key.to_owned(), generation), move || loader.load(&job_url));
        self.stats.loads_started += 1;
        log::debug!("loading texture for '{form_key}' from '{url}' (generation {generation})");
        RequestOutcome::Loading(size)
    }

    /// Collect finished decodes. Successful images wait for
    /// [`TextureManager::bind_ready`]; failures come back with the container
    /// size to restore.
    pub fn poll(&mut self, viewport_height: f32) -> Vec<LoadFailure> {
        let done = self.jobs.drain();
        self.settle(done, viewport_height)
    }

    /// Block until every decode has finished (headless runs and tests).
    pub fn wait_idle(&mut self, viewport_height: f32) -> Vec<LoadFailure> {
        let done = self.jobs.wait_all();
        self.settle(done, viewport_height)
    }

    fn settle(
        &mut self,
        done: Vec<crate::loader::JobOutput<(String, u64), DecodedImage>>,
        viewport_height: f32,
    ) -> Vec<LoadFailure> {
        let mut failures = Vec::new();
        for output in done {
            let (form_key, generation) = output.key;
            let Some(slot) = self.slots.get_mut(&form_key) else {
                continue;
            };
            let is_current =
                slot.pending.as_ref().map(|pending| pending.generation) == Some(generation);
            if !is_current {
                log::debug!("dropping stale texture load for '{form_key}' (generation {generation})");
                continue;
            }
            let Some(pending) = slot.pending.take() else {
                continue;
            };

            match output.result {
                Ok(image) => {
                    slot.ready = Some(ReadyImage {
                        url: pending.url,
                        image,
                        size: pending.size,
                    });
                }
                Err(error) => {
                    self.stats.failures += 1;
                    log::warn!(
                        "texture load failed for '{form_key}' from '{}': {error:#}",
                        pending.url
                    );
                    let size = if slot.bound.is_some() {
                        slot.quad_size
                    } else {
                        self.aspect.fit(self.fallback_width, viewport_height)
                    };
                    if slot.bound.is_none() {
                        slot.quad_size = size;
                    }
                    failures.push(LoadFailure {
                        form_key,
                        url: pending.url,
                        size,
                    });
                }
            }
        }
        failures
    }

    /// Swap a finished image into `scene`: dispose the old texture, bind the
    /// new one and adopt the size computed when the load started. An image
    /// the scene rejects leaves the old texture and size in place.
    pub fn bind_ready(&mut self, form_key: &str, scene: &mut dyn RenderScene) -> Option<BindOutcome> {
        let slot = self.slots.get_mut(form_key)?;
        let ready = slot.ready.take()?;

        if let Err(error) = scene.check_texture(&ready.image) {
            self.stats.failures += 1;
            log::warn!(
                "texture for '{form_key}' from '{}' rejected: {error:#}",
                ready.url
            );
            return Some(BindOutcome::Rejected(slot.quad_size));
        }

        if let Some(previous) = slot.bound.take() {
            scene.dispose_texture(previous.texture);
            self.stats.disposes += 1;
        }

        match scene.bind_texture(&ready.image) {
            Ok(texture) => {
                self.stats.binds += 1;
                slot.bound = Some(BoundImage {
                    texture,
                    url: ready.url,
                });
                slot.quad_size = ready.size;
                Some(BindOutcome::Bound(ready.size))
            }
            Err(error) => {
                self.stats.failures += 1;
                log::warn!(
                    "binding texture for '{form_key}' from '{}' failed: {error:#}",
                    ready.url
                );
                Some(BindOutcome::Rejected(slot.quad_size))
            }
        }
    }

    /// Record the size of an item that has a scene but no texture yet.
    pub fn set_quad_size(&mut self, form_key: &str, size: SurfaceSize) {
        self.slots.entry(form_key.to_owned()).or_default().quad_size = size;
    }

    /// Dispose the item's texture and forget it. In-flight loads for the item
    /// are dropped when they finish.
    pub fn release(&mut self, form_key: &str, scene: Option<&mut dyn RenderScene>) {
        let Some(mut slot) = self.slots.remove(form_key) else {
            return;
        };
        if let (Some(bound), Some(scene)) = (slot.bound.take(), scene) {
            scene.dispose_texture(bound.texture);
            self.stats.disposes += 1;
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GalleryConfig;
    use crate::loader::ImageLoader;
    use crate::shader::SceneUniforms;
    use anyhow::{anyhow, Result};

    struct SolidLoader;

    impl ImageLoader for SolidLoader {
        fn load(&self, url: &str) -> Result<DecodedImage> {
            if url.contains("broken") {
                return Err(anyhow!("corrupt image"));
            }
            Ok(DecodedImage {
                width: 2,
                height: 2,
                pixels: vec![url.len() as u8; 16],
            })
        }
    }

    #[derive(Default)]
    struct CountingScene {
        max_width: Option<u32>,
        next: u64,
        live: Vec<TextureId>,
        binds: u32,
        disposes: u32,
        max_live: usize,
    }

    impl RenderScene for CountingScene {
        fn update(&mut self, _uniforms: &SceneUniforms) {}
        fn draw(&mut self) -> Result<()> {
            Ok(())
        }
        fn check_texture(&self, image: &DecodedImage) -> Result<()> {
            match self.max_width {
                Some(max) if image.width > max => Err(anyhow!("{} wider than {max}", image.width)),
                _ => image.check_layout(),
            }
        }
        fn bind_texture(&mut self, _image: &DecodedImage) -> Result<TextureId> {
            self.next += 1;
            self.binds += 1;
            self.live.push(TextureId(self.next));
            self.max_live = self.max_live.max(self.live.len());
            Ok(TextureId(self.next))
        }
        fn dispose_texture(&mut self, texture: TextureId) {
            self.disposes += 1;
            self.live.retain(|id| *id != texture);
        }
        fn resize(&mut self, _size: SurfaceSize) -> Result<()> {
            Ok(())
        }
        fn dispose(&mut self) {}
    }

    fn manager() -> TextureManager {
        let config = GalleryConfig::default();
        TextureManager::new(
            Arc::new(SolidLoader),
            PlaceholderMatcher::from_config(&config).unwrap(),
            ForcedAspect::default(),
            config.fallback_width,
        )
    }

    #[test]
    fn request_sizes_container_before_decode_finishes() {
        let mut textures = manager();
        let outcome = textures.request("haiku", "a.png", 300.0, 1000.0);
        assert_eq!(outcome, RequestOutcome::Loading(SurfaceSize::new(300.0, 400.0)));
        assert!(textures.is_loading("haiku"));
    }

    #[test]
    fn replacements_never_leave_two_live_textures() {
        let mut textures = manager();
        let mut scene = CountingScene::default();

        for url in ["one.png", "two.png", "three.png", "four.png"] {
            textures.request("haiku", url, 300.0, 1000.0);
            assert!(textures.wait_idle(1000.0).is_empty());
            textures.bind_ready("haiku", &mut scene).expect("image should bind");
            assert_eq!(scene.live.len(), 1);
        }

        assert_eq!(scene.max_live, 1);
        assert_eq!(scene.disposes, scene.binds - 1);
        assert_eq!(textures.bound("haiku").unwrap().url, "four.png");
        let stats = textures.stats();
        assert_eq!(stats.disposes, stats.binds - 1);
    }

    #[test]
    fn redundant_and_placeholder_requests_are_skipped() {
        let mut textures = manager();
        let mut scene = CountingScene::default();

        textures.request("ode", "placeholder://ode", 300.0, 1000.0);
        assert_eq!(
            textures.request("ode", "placeholder://ode", 300.0, 1000.0),
            RequestOutcome::Skipped(SkipReason::AlreadyLoading)
        );
        textures.wait_idle(1000.0);
        textures.bind_ready("ode", &mut scene);

        assert_eq!(
            textures.request("ode", "placeholder://ode", 300.0, 1000.0),
            RequestOutcome::Skipped(SkipReason::AlreadyBound)
        );

        textures.request("ode", "real.png", 300.0, 1000.0);
        textures.wait_idle(1000.0);
        textures.bind_ready("ode", &mut scene);
        assert_eq!(
            textures.request("ode", "placeholder://other", 300.0, 1000.0),
            RequestOutcome::Skipped(SkipReason::PlaceholderOverContent)
        );
        assert_eq!(textures.bound("ode").unwrap().url, "real.png");
    }

    #[test]
    fn superseded_loads_are_dropped() {
        let mut textures = manager();
        let mut scene = CountingScene::default();

        textures.request("sonnet", "first.png", 300.0, 1000.0);
        textures.request("sonnet", "second.png", 300.0, 1000.0);
        textures.wait_idle(1000.0);
        textures.bind_ready("sonnet", &mut scene);

        assert_eq!(scene.binds, 1);
        assert_eq!(textures.bound("sonnet").unwrap().url, "second.png");
    }

    #[test]
    fn failed_decode_keeps_prior_texture_and_size() {
        let mut textures = manager();
        let mut scene = CountingScene::default();

        textures.request("ode", "good.png", 300.0, 1000.0);
        textures.wait_idle(1000.0);
        textures.bind_ready("ode", &mut scene);
        let before = textures.bound("ode").cloned();

        textures.request("ode", "broken.png", 600.0, 1000.0);
        let failures = textures.wait_idle(1000.0);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].size, SurfaceSize::new(300.0, 400.0));
        assert_eq!(textures.bound("ode").cloned(), before);
        assert!(textures.bind_ready("ode", &mut scene).is_none());
    }

    #[test]
    fn rejected_image_keeps_prior_texture_and_size() {
        let mut textures = manager();
        let mut scene = CountingScene {
            max_width: Some(1),
            ..CountingScene::default()
        };
        textures.set_quad_size("ode", SurfaceSize::new(300.0, 400.0));

        // SolidLoader decodes 2x2 images, wider than this scene accepts.
        textures.request("ode", "wide.png", 600.0, 1000.0);
        textures.wait_idle(1000.0);
        assert_eq!(
            textures.bind_ready("ode", &mut scene),
            Some(BindOutcome::Rejected(SurfaceSize::new(300.0, 400.0)))
        );
        assert_eq!(scene.binds, 0);
        assert!(textures.bound("ode").is_none());

        scene.max_width = None;
        textures.request("ode", "good.png", 300.0, 1000.0);
        textures.wait_idle(1000.0);
        textures.bind_ready("ode", &mut scene).expect("image should bind");
        let before = textures.bound("ode").cloned();

        scene.max_width = Some(1);
        textures.request("ode", "wider.png", 600.0, 1000.0);
        textures.wait_idle(1000.0);
        assert_eq!(
            textures.bind_ready("ode", &mut scene),
            Some(BindOutcome::Rejected(SurfaceSize::new(300.0, 400.0)))
        );
        assert_eq!(textures.bound("ode").cloned(), before);
        assert_eq!(scene.live.len(), 1);
        assert_eq!(scene.disposes, 0);
        assert_eq!(textures.quad_size("ode"), Some(SurfaceSize::new(300.0, 400.0)));
    }

    #[test]
    fn failed_first_decode_falls_back_to_default_size() {
        let mut textures = manager();
        textures.request("ode", "broken.png", 900.0, 1000.0);
        let failures = textures.wait_idle(1000.0);
        assert_eq!(failures[0].size, SurfaceSize::new(400.0, 400.0 * 4.0 / 3.0));
        assert_eq!(textures.stats().failures, 1);
    }

    #[test]
    fn release_disposes_bound_texture() {
        let mut textures = manager();
        let mut scene = CountingScene::default();
        textures.request("ode", "good.png", 300.0, 1000.0);
        textures.wait_idle(1000.0);
        textures.bind_ready("ode", &mut scene);

        textures.release("ode", Some(&mut scene));
        assert!(scene.live.is_empty());
        assert!(textures.bound("ode").is_none());
    }
}
