//! Scroll- and pointer-reactive shader gallery.
//!
//! Each gallery item gets its own render scene whose shader reacts to the
//! shared scroll velocity and the item's smoothed pointer state. Textures
//! load off the frame loop, the hovered item's dominant colour drives the
//! page background, and a single scheduler drives every frame.

pub mod background;
pub mod color;
pub mod config;
pub mod error_codes;
pub mod events;
pub mod gallery;
pub mod gpu;
pub mod helpers;
pub mod items;
pub mod layout;
pub mod loader;
pub mod manifest;
pub mod pointer;
pub mod reveal;
pub mod scene;
pub mod scheduler;
pub mod scroll;
pub mod shader;
pub mod texture;

pub use config::GalleryConfig;
pub use gallery::{CallbackLog, Gallery, GalleryHooks, HostSurface, NoHooks, SceneStatus};
pub use scheduler::{FramePump, Scheduler};
