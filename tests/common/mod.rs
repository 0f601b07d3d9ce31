#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use shader_gallery::color::{parse_hex, ColorExtractor, ColorSource};
use shader_gallery::events::{EventBus, EventHandler, EventKind, EventSource, Subscription};
use shader_gallery::gallery::{CallbackLog, Gallery, HostSurface};
use shader_gallery::items::GalleryItem;
use shader_gallery::layout::{Rect, SurfaceSize};
use shader_gallery::loader::{placeholder_image, ImageLoader};
use shader_gallery::scene::{DecodedImage, RenderScene, SceneFactory, TextureId};
use shader_gallery::scroll::ScrollMetrics;
use shader_gallery::shader::SceneUniforms;
use shader_gallery::GalleryConfig;

pub const FRAME: f64 = 1.0 / 60.0;

/// Ordered record of everything the fakes saw.
#[derive(Debug, Default)]
pub struct Journal {
    pub entries: Vec<String>,
    pub uniforms: HashMap<String, SceneUniforms>,
    pub live_textures: HashMap<String, Vec<TextureId>>,
    pub created: Vec<String>,
}

impl Journal {
    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.iter().position(|candidate| candidate == entry)
    }
}

pub type SharedJournal = Rc<RefCell<Journal>>;

pub struct FakeScene {
    key: String,
    journal: SharedJournal,
    next_texture: u64,
}

impl RenderScene for FakeScene {
    fn update(&mut self, uniforms: &SceneUniforms) {
        self.journal
            .borrow_mut()
            .uniforms
            .insert(self.key.clone(), *uniforms);
    }

    fn draw(&mut self) -> Result<()> {
        Ok(())
    }

    fn bind_texture(&mut self, image: &DecodedImage) -> Result<TextureId> {
        self.next_texture += 1;
        let texture = TextureId(self.next_texture);
        let mut journal = self.journal.borrow_mut();
        journal
            .entries
            .push(format!("bind:{}:{}x{}", self.key, image.width, image.height));
        journal
            .live_textures
            .entry(self.key.clone())
            .or_default()
            .push(texture);
        Ok(texture)
    }

    fn dispose_texture(&mut self, texture: TextureId) {
        let mut journal = self.journal.borrow_mut();
        journal
            .entries
            .push(format!("dispose_texture:{}", self.key));
        if let Some(live) = journal.live_textures.get_mut(&self.key) {
            live.retain(|id| *id != texture);
        }
    }

    fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        self.journal
            .borrow_mut()
            .entries
            .push(format!("resize:{}:{}x{}", self.key, size.width, size.height));
        Ok(())
    }

    fn dispose(&mut self) {
        self.journal
            .borrow_mut()
            .entries
            .push(format!("dispose:{}", self.key));
    }
}

pub struct FakeFactory {
    pub journal: SharedJournal,
    pub failing: HashSet<String>,
}

impl SceneFactory for FakeFactory {
    fn create_scene(&mut self, form_key: &str, size: SurfaceSize) -> Result<Box<dyn RenderScene>> {
        if self.failing.contains(form_key) {
            return Err(anyhow!("context lost"));
        }
        let mut journal = self.journal.borrow_mut();
        journal.created.push(form_key.to_owned());
        journal
            .entries
            .push(format!("create:{form_key}:{}x{}", size.width, size.height));
        Ok(Box::new(FakeScene {
            key: form_key.to_owned(),
            journal: Rc::clone(&self.journal),
            next_texture: 0,
        }))
    }
}

/// Host with explicit container rects. Keys absent from `rects` have no
/// container.
#[derive(Debug, Clone)]
pub struct FakeHost {
    pub rects: HashMap<String, Rect>,
    pub viewport: Rect,
    pub metrics: ScrollMetrics,
    pub sizes: BTreeMap<String, SurfaceSize>,
    pub revealed: Vec<String>,
}

impl FakeHost {
    /// Items laid out left to right, 300 wide with 20 px gaps, in a
    /// 1000x1000 viewport.
    pub fn strip(keys: &[&str]) -> Self {
        let rects = keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                (
                    (*key).to_owned(),
                    Rect::new(20.0 + index as f32 * 320.0, 100.0, 300.0, 400.0),
                )
            })
            .collect();
        Self {
            rects,
            viewport: Rect::new(0.0, 0.0, 1000.0, 1000.0),
            metrics: ScrollMetrics {
                offset: 0.0,
                scroll_width: 2000.0,
                client_width: 1000.0,
            },
            sizes: BTreeMap::new(),
            revealed: Vec::new(),
        }
    }
}

impl HostSurface for FakeHost {
    fn container_rect(&self, form_key: &str) -> Option<Rect> {
        self.rects.get(form_key).copied()
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    fn set_container_size(&mut self, form_key: &str, size: SurfaceSize) {
        self.sizes.insert(form_key.to_owned(), size);
    }

    fn set_revealed(&mut self, form_key: &str) {
        self.revealed.push(form_key.to_owned());
    }
}

/// `solid:#rrggbb` decodes to an 8x8 image of that colour, URLs containing
/// `broken` fail, placeholders synthesize as usual.
pub struct SolidLoader;

impl ImageLoader for SolidLoader {
    fn load(&self, url: &str) -> Result<DecodedImage> {
        if url.contains("broken") {
            return Err(anyhow!("corrupt image at {url}"));
        }
        if let Some(key) = url.strip_prefix("placeholder://") {
            return Ok(placeholder_image(key));
        }
        let rgb = url
            .strip_prefix("solid:")
            .and_then(parse_hex)
            .unwrap_or([128, 128, 128]);
        let pixels = (0..64)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Ok(DecodedImage {
            width: 8,
            height: 8,
            pixels,
        })
    }
}

/// Colour source answering from a fixed table.
pub struct TableColors(pub HashMap<String, String>);

impl ColorSource for TableColors {
    fn dominant_color(&self, url: &str) -> Result<String> {
        self.0
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no colour for {url}"))
    }
}

/// Event source that forwards to an [`EventBus`] and journals unsubscribes.
pub struct JournaledSource {
    pub bus: EventBus,
    pub journal: SharedJournal,
}

impl EventSource for JournaledSource {
    fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> Subscription {
        self.bus.subscribe(kind, handler)
    }

    fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.journal
            .borrow_mut()
            .entries
            .push(format!("unsubscribe:{:?}", subscription.kind()));
        self.bus.unsubscribe(subscription)
    }
}

pub fn items(entries: &[(&str, &str)]) -> Vec<GalleryItem> {
    entries
        .iter()
        .map(|(key, url)| GalleryItem::new(*key, key.to_uppercase(), *url))
        .collect()
}

pub fn gallery(
    entries: &[(&str, &str)],
    host: FakeHost,
    config: GalleryConfig,
) -> (Gallery<FakeHost, CallbackLog>, SharedJournal) {
    gallery_with_failing(entries, host, config, &[])
}

pub fn gallery_with_failing(
    entries: &[(&str, &str)],
    host: FakeHost,
    config: GalleryConfig,
    failing: &[&str],
) -> (Gallery<FakeHost, CallbackLog>, SharedJournal) {
    let journal = SharedJournal::default();
    let factory = FakeFactory {
        journal: Rc::clone(&journal),
        failing: failing.iter().map(|key| (*key).to_owned()).collect(),
    };
    let gallery = Gallery::new(
        config,
        items(entries),
        Arc::new(SolidLoader),
        Box::new(factory),
        host,
        CallbackLog::default(),
    )
    .expect("gallery should build");
    (gallery, journal)
}

pub fn table_colors(entries: &[(&str, &str)], fallback: &str) -> ColorExtractor {
    let table = entries
        .iter()
        .map(|(url, hex)| ((*url).to_owned(), (*hex).to_owned()))
        .collect();
    ColorExtractor::new(Arc::new(TableColors(table)), fallback)
}
