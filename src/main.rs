use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use image::RgbaImage;
use serde::Serialize;

use shader_gallery::color::ColorExtractor;
use shader_gallery::error_codes::{envelope_for, find_coded_error, CodedError};
use shader_gallery::events::{EventBus, GalleryEvent};
use shader_gallery::gpu::{GpuContext, WgpuSceneFactory};
use shader_gallery::helpers::frame_digest;
use shader_gallery::items::{GalleryItem, PlaceholderMatcher};
use shader_gallery::loader::{FileImageLoader, SharedLoader};
use shader_gallery::manifest::{load_and_validate_manifest, GalleryManifest, ScriptAction, StripHost};
use shader_gallery::scene::DecodedImage;
use shader_gallery::scheduler::NOMINAL_FPS;
use shader_gallery::{CallbackLog, FramePump, Gallery, HostSurface, SceneStatus, Scheduler};

const GIT_HASH: Option<&str> = option_env!("GALLERY_GIT_HASH");

#[derive(Debug, Parser)]
#[command(name = "shader-gallery")]
#[command(version, about = "Headless runner for the scroll-reactive shader gallery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a manifest and print a summary.
    Check { manifest: PathBuf },
    /// Drive the gallery for a number of frames and write item surfaces as PNG.
    Render {
        manifest: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value_t = 120)]
        frames: u64,
        /// Write surfaces every K frames (the last frame is always written).
        #[arg(long, default_value_t = 30)]
        every: u64,
        #[arg(long)]
        json: bool,
    },
    /// Print the dominant colour of every item image.
    Colors {
        manifest: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Check { .. } => false,
            Commands::Render { json, .. } | Commands::Colors { json, .. } => *json,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::debug!(
        "shader-gallery {} ({})",
        env!("CARGO_PKG_VERSION"),
        GIT_HASH.unwrap_or("unknown")
    );

    let cli = Cli::parse();
    let json = cli.command.json();
    if let Err(error) = run(cli.command) {
        let exit_code = find_coded_error(&error).map_or(1, |coded| coded.kind.exit_code());
        if json {
            match serde_json::to_string_pretty(&envelope_for(&error)) {
                Ok(text) => println!("{text}"),
                Err(_) => eprintln!("error: {error:#}"),
            }
        } else {
            eprintln!("error: {error:#}");
        }
        std::process::exit(exit_code);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check { manifest } => run_check(&manifest),
        Commands::Render {
            manifest,
            output,
            frames,
            every,
            json,
        } => run_render(&manifest, &output, frames, every, json),
        Commands::Colors { manifest, json } => run_colors(&manifest, json),
    }
}

fn load_manifest(path: &Path) -> Result<GalleryManifest> {
    load_and_validate_manifest(path).map_err(|error| CodedError::manifest(format!("{error:#}")).into())
}

#[cfg(feature = "remote")]
fn build_loader(base_dir: &Path) -> Result<SharedLoader> {
    let loader = shader_gallery::loader::RemoteImageLoader::new(FileImageLoader::new(base_dir))?;
    Ok(Arc::new(loader))
}

#[cfg(not(feature = "remote"))]
fn build_loader(base_dir: &Path) -> Result<SharedLoader> {
    Ok(Arc::new(FileImageLoader::new(base_dir)))
}

fn run_check(manifest_path: &Path) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let placeholders = PlaceholderMatcher::from_config(&manifest.config)?;
    let items = manifest.composed_items();
    let placeholder_count = items
        .iter()
        .filter(|item| placeholders.is_placeholder(&item.image_url))
        .count();

    println!(
        "OK: {} ({}x{} viewport, {} items, {} placeholders, {} script steps)",
        manifest_path.display(),
        manifest.viewport.width,
        manifest.viewport.height,
        items.len(),
        placeholder_count,
        manifest.script.len()
    );
    for item in &items {
        println!("  {:<16} {}", item.form_key, item.image_url);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct RenderReport {
    ok: bool,
    manifest: String,
    frames: u64,
    images_written: usize,
    scroll_progress: f32,
    background: String,
    items: Vec<ItemReport>,
    selections: Vec<(String, String)>,
    backgrounds: Vec<String>,
    progress: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_hash: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ItemReport {
    form: String,
    image: String,
    scene: &'static str,
    revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

fn status_label(status: Option<SceneStatus>) -> &'static str {
    match status {
        Some(SceneStatus::Pending { .. }) => "pending",
        Some(SceneStatus::Ready) => "ready",
        Some(SceneStatus::Abandoned) => "abandoned",
        Some(SceneStatus::Skipped) | None => "skipped",
    }
}

fn run_render(manifest_path: &Path, output: &Path, frames: u64, every: u64, json: bool) -> Result<()> {
    if frames == 0 {
        return Err(CodedError::usage("invalid_frames", "--frames must be at least 1").into());
    }
    if every == 0 {
        return Err(CodedError::usage("invalid_every", "--every must be at least 1").into());
    }

    let manifest = load_manifest(manifest_path)?;
    let actions = manifest.actions_by_frame()?;
    fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;

    let context = pollster::block_on(GpuContext::new(manifest.config.mesh_segments))
        .map_err(|error| CodedError::device(format!("{error:#}")))?;

    let items = manifest.composed_items();
    let host = StripHost::from_manifest(&manifest, &items);
    let loader = build_loader(&manifest.base_dir)?;
    let mut gallery = Gallery::new(
        manifest.config.clone(),
        items,
        loader,
        Box::new(WgpuSceneFactory::new(context)),
        host,
        CallbackLog::default(),
    )?;

    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    let mut pump = FramePump::fixed(NOMINAL_FPS);
    let mut digests: HashMap<String, String> = HashMap::new();
    let mut images_written = 0;

    log::info!(
        "rendering {} frames of {} to {}",
        frames,
        manifest_path.display(),
        output.display()
    );
    for frame in 0..frames {
        for action in actions.get(&frame).into_iter().flatten() {
            apply_action(&mut gallery, &mut bus, action);
        }
        // Settle outstanding loads before the tick so every captured surface
        // has been drawn since its last resize.
        gallery.wait_idle();
        scheduler.tick(&mut gallery, pump.next_delta());

        if frame % every != 0 && frame + 1 != frames {
            continue;
        }
        let keys: Vec<String> = gallery.items().map(|item| item.form_key.clone()).collect();
        for key in keys {
            let Some(image) = gallery.capture(&key)? else {
                continue;
            };
            let path = output.join(format!("{key}_{frame:05}.png"));
            save_png(&path, &image)?;
            digests.insert(key, frame_digest(&image.pixels));
            images_written += 1;
        }
    }

    let report = RenderReport {
        ok: true,
        manifest: manifest_path.display().to_string(),
        frames,
        images_written,
        scroll_progress: gallery.host().scroll_metrics().progress_percent(),
        background: gallery.background_color().to_owned(),
        items: gallery
            .items()
            .map(|item| ItemReport {
                form: item.form_key.clone(),
                image: item.image_url.clone(),
                scene: status_label(gallery.scene_status(&item.form_key)),
                revealed: gallery.is_revealed(&item.form_key),
                digest: digests.get(&item.form_key).cloned(),
            })
            .collect(),
        selections: gallery.hooks().selections.clone(),
        backgrounds: gallery.hooks().backgrounds.clone(),
        progress: gallery.hooks().progress.clone(),
        git_hash: GIT_HASH,
    };

    let summary = scheduler.shutdown(&mut gallery, &mut bus);
    log::info!(
        "torn down {} scenes and {} subscriptions",
        summary.scenes_disposed,
        summary.subscriptions_removed
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "OK: {} frames, {} images in {}",
            report.frames,
            report.images_written,
            output.display()
        );
        for item in &report.items {
            println!(
                "  {:<16} {:<9} {}",
                item.form,
                item.scene,
                item.digest.as_deref().unwrap_or("-")
            );
        }
        println!("Background: {}", report.background);
        println!("Scroll progress: {:.0}%", report.scroll_progress);
    }
    Ok(())
}

fn apply_action(gallery: &mut Gallery<StripHost, CallbackLog>, bus: &mut EventBus, action: &ScriptAction) {
    match action {
        ScriptAction::Event(GalleryEvent::Scroll(offset)) => {
            let applied = gallery.host_mut().scroll_to(*offset);
            bus.emit(&GalleryEvent::Scroll(applied));
        }
        ScriptAction::Event(GalleryEvent::Resize(viewport)) => {
            gallery.host_mut().set_viewport(*viewport);
            bus.emit(&GalleryEvent::Resize(*viewport));
        }
        ScriptAction::Event(event) => {
            bus.emit(event);
        }
        ScriptAction::Replace { form, image } => {
            let items: Vec<GalleryItem> = gallery
                .items()
                .map(|item| {
                    let mut item = item.clone();
                    if item.form_key == *form {
                        item.image_url = image.clone();
                    }
                    item
                })
                .collect();
            gallery.host_mut().set_order(&items);
            gallery.set_items(items);
        }
    }
}

fn save_png(path: &Path, image: &DecodedImage) -> Result<()> {
    let buffer = RgbaImage::from_raw(image.width, image.height, image.pixels.clone()).ok_or_else(|| {
        anyhow!(
            "failed to construct image buffer for {}x{} RGBA frame",
            image.width,
            image.height
        )
    })?;
    buffer
        .save(path)
        .with_context(|| format!("failed to write png {}", path.display()))
}

#[derive(Debug, Serialize)]
struct ColorRow {
    form: String,
    image: String,
    color: String,
    extracted: bool,
}

fn run_colors(manifest_path: &Path, json: bool) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let loader = build_loader(&manifest.base_dir)?;
    let mut extractor = ColorExtractor::from_loader(loader, &manifest.config);
    let items = manifest.composed_items();

    for item in &items {
        extractor.request(&item.image_url);
    }
    let failed: BTreeMap<String, String> = extractor
        .wait_idle()
        .into_iter()
        .filter(|resolved| !resolved.extracted)
        .map(|resolved| (resolved.url, resolved.hex))
        .collect();

    let rows: Vec<ColorRow> = items
        .iter()
        .map(|item| {
            let cached = extractor.cache().get(&item.image_url).map(str::to_owned);
            let extracted = cached.is_some();
            let color = cached
                .or_else(|| failed.get(&item.image_url).cloned())
                .unwrap_or_else(|| manifest.config.default_background.clone());
            ColorRow {
                form: item.form_key.clone(),
                image: item.image_url.clone(),
                color,
                extracted,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let note = if row.extracted { "" } else { " (default)" };
            println!("{:<16} {}{}", row.form, row.color, note);
        }
    }
    Ok(())
}
