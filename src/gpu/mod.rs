// ============================================================================
// GPU MODULE — texture synchronisation for host images
// ============================================================================
//
// Architecture:
//   format.rs   — ImageFormat -> format triple + swizzle table
//   binding.rs  — TextureBinding: Absent / Clean / Dirty state machine
//   shared.rs   — SharedImage: one RwLock over image + binding
//   context.rs  — WgpuBackend: headless wgpu device implementing GpuBackend
//   texture.rs  — wgpu texture upload, mip generation, readback
//   shaders.rs  — WGSL source
// ============================================================================

use std::time::Duration;

pub mod binding;
pub mod context;
pub mod format;
pub mod shaders;
pub mod shared;
pub mod texture;

pub use binding::{BindingOptions, TextureBinding, TextureState};
pub use context::WgpuBackend;
pub use format::{DataType, Filter, FormatTriple, InternalFormat, PixelFormat, SamplerParams, Swizzle, SwizzleSource, Wrap};
pub use shared::SharedImage;

/// Opaque name of a texture owned by a [`GpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

impl std::fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no GPU context available: {0}")]
    NoContext(String),

    #[error("unsupported texture request: {0}")]
    Unsupported(String),

    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("texture readback failed: {0}")]
    Readback(String),

    #[error("GPU did not finish within {0:?}")]
    FenceTimeout(Duration),

    #[error("unknown texture {0}")]
    UnknownTexture(TextureHandle),
}

/// Pixel data plus everything needed to create or refill a texture.
#[derive(Clone, Copy, Debug)]
pub struct TextureUpload<'a> {
    pub triple: FormatTriple,
    pub width: u32,
    pub height: u32,
    /// Tightly packed rows, top row first, `triple.bytes_per_pixel()` per pixel.
    pub data: &'a [u8],
    pub mipmaps: bool,
    pub sampler: SamplerParams,
}

/// Source of scoped GPU contexts. Shared across threads; contexts are
/// handed out one consumer at a time.
pub trait GpuBackend: Send + Sync {
    /// Acquire the context. It is released when the returned guard drops,
    /// on every exit path.
    fn acquire_context(&self) -> Result<Box<dyn GpuContext + '_>, GpuError>;
}

/// Texture operations valid while a context is held.
pub trait GpuContext {
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureHandle, GpuError>;

    /// Refill an existing texture of identical size and triple.
    fn update_texture(&mut self, handle: TextureHandle, upload: &TextureUpload<'_>) -> Result<(), GpuError>;

    /// Level 0 of `handle`, packed as `triple` describes.
    fn read_texture(&mut self, handle: TextureHandle, triple: &FormatTriple) -> Result<Vec<u8>, GpuError>;

    fn destroy_texture(&mut self, handle: TextureHandle) -> Result<(), GpuError>;

    /// Block until the GPU has consumed every submitted command.
    fn finish(&mut self, timeout: Duration) -> Result<(), GpuError>;
}
