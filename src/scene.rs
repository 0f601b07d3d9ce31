use std::fmt;

use anyhow::{bail, Result};

use crate::layout::SurfaceSize;
use crate::shader::SceneUniforms;

/// Decoded RGBA8 pixels, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn from_rgba(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }

    /// Errors when the buffer is empty or does not hold `width * height`
    /// RGBA pixels.
    pub fn check_layout(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("image is {}x{}, expected a non-empty size", self.width, self.height);
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            bail!(
                "{}x{} image holds {} bytes, expected {expected}",
                self.width,
                self.height,
                self.pixels.len()
            );
        }
        Ok(())
    }

    /// Rows reversed so the first row is the bottom of the image, the layout
    /// the vertex stage expects (uv.y = 0 at the bottom).
    pub fn flipped_rows(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * 4;
        if row_bytes == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.pixels.len());
        for row in self.pixels.chunks_exact(row_bytes).rev() {
            out.extend_from_slice(row);
        }
        out
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Handle of a texture owned by one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// One item's drawable: a program, a mesh, a surface and at most one bound
/// image texture.
///
/// Implementations must draw safely before any texture is bound (falling back
/// to a neutral texture) and must release everything in [`RenderScene::dispose`].
pub trait RenderScene {
    fn update(&mut self, uniforms: &SceneUniforms);

    fn draw(&mut self) -> Result<()>;

    /// Whether `image` can be bound. Called before the current texture is
    /// disposed, so a rejected image leaves the scene as it was.
    fn check_texture(&self, image: &DecodedImage) -> Result<()> {
        image.check_layout()
    }

    /// Upload `image` and make it the sampled texture.
    fn bind_texture(&mut self, image: &DecodedImage) -> Result<TextureId>;

    fn dispose_texture(&mut self, texture: TextureId);

    fn resize(&mut self, size: SurfaceSize) -> Result<()>;

    fn dispose(&mut self);

    /// RGBA8 pixels of the last draw, if the backend can read them back.
    fn capture(&mut self) -> Result<Option<DecodedImage>> {
        Ok(None)
    }
}

pub trait SceneFactory {
    fn create_scene(&mut self, form_key: &str, size: SurfaceSize) -> Result<Box<dyn RenderScene>>;
}
