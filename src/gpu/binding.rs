// ============================================================================
// TEXTURE BINDING — lazy, generation-driven upload of a HostImage
// ============================================================================
//
// The binding is not owned by the image. It remembers which image (by id) and
// which generation of it was last uploaded; any mutation bumps the image's
// generation, which is what turns Clean into Dirty.

use std::sync::Arc;
use std::time::Duration;

use super::format::{FormatTriple, SamplerParams};
use super::{GpuBackend, GpuError, TextureHandle, TextureUpload};
use crate::error::Result;
use crate::format::ImageFormat;
use crate::image::HostImage;
use crate::settings::EngineSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureState {
    /// No GPU texture allocated.
    Absent,
    /// Texture content matches the image.
    Clean,
    /// Image mutated since the last upload.
    Dirty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingOptions {
    pub generate_mipmaps: bool,
    pub fence_timeout: Duration,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            fence_timeout: Duration::from_secs(5),
        }
    }
}

impl BindingOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            generate_mipmaps: settings.generate_mipmaps,
            fence_timeout: settings.fence_timeout(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BoundTexture {
    handle: TextureHandle,
    image_id: u64,
    generation: u64,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl BoundTexture {
    fn same_shape(&self, image: &HostImage) -> bool {
        self.width == image.width() && self.height == image.height() && self.format == image.format()
    }
}

/// GPU texture mirror of one [`HostImage`].
///
/// Dropping the binding destroys the texture.
pub struct TextureBinding<B: GpuBackend + ?Sized> {
    backend: Arc<B>,
    options: BindingOptions,
    bound: Option<BoundTexture>,
}

impl<B: GpuBackend + ?Sized> TextureBinding<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_options(backend, BindingOptions::default())
    }

    pub fn with_options(backend: Arc<B>, options: BindingOptions) -> Self {
        Self {
            backend,
            options,
            bound: None,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn options(&self) -> BindingOptions {
        self.options
    }

    /// Handle of the current texture, regardless of staleness.
    pub fn handle(&self) -> Option<TextureHandle> {
        self.bound.map(|b| b.handle)
    }

    /// Id of the image this binding uploaded, if any.
    pub fn image_id(&self) -> Option<u64> {
        self.bound.map(|b| b.image_id)
    }

    pub fn state(&self, image: &HostImage) -> TextureState {
        match &self.bound {
            None => TextureState::Absent,
            Some(b) if b.image_id == image.id() && b.generation == image.generation() => TextureState::Clean,
            Some(_) => TextureState::Dirty,
        }
    }

    /// Texture for `image`, uploading first if it is Absent or Dirty.
    ///
    /// Failures are logged and reported as `None`; the binding is left as it
    /// was.
    pub fn fetch(&mut self, image: &HostImage) -> Option<TextureHandle> {
        match self.try_fetch(image) {
            Ok(handle) => Some(handle),
            Err(e) => {
                crate::log_warn!("texture unavailable for image {}: {e}", image.id());
                None
            }
        }
    }

    /// Like [`TextureBinding::fetch`] but surfaces the failure.
    pub fn try_fetch(&mut self, image: &HostImage) -> std::result::Result<TextureHandle, GpuError> {
        if let Some(b) = &self.bound {
            if b.image_id != image.id() {
                return Err(GpuError::Unsupported(format!(
                    "binding belongs to image {}, not {}",
                    b.image_id,
                    image.id()
                )));
            }
            if b.generation == image.generation() {
                return Ok(b.handle);
            }
        }

        let upload = TextureUpload {
            triple: FormatTriple::for_format(&image.format()),
            width: image.width(),
            height: image.height(),
            data: image.pixels(),
            mipmaps: self.options.generate_mipmaps,
            sampler: SamplerParams::for_mipmaps(self.options.generate_mipmaps),
        };

        let mut ctx = self.backend.acquire_context()?;
        let reuse = self.bound.filter(|b| b.same_shape(image)).map(|b| b.handle);
        let handle = match reuse {
            Some(handle) => {
                ctx.update_texture(handle, &upload)?;
                handle
            }
            None => ctx.create_texture(&upload)?,
        };

        if let Err(e) = ctx.finish(self.options.fence_timeout) {
            if reuse.is_none()
                && let Err(destroy) = ctx.destroy_texture(handle)
            {
                crate::log_warn!("failed to release texture {handle} after fence error: {destroy}");
            }
            return Err(e);
        }

        if reuse.is_none()
            && let Some(old) = self.bound.take()
            && let Err(e) = ctx.destroy_texture(old.handle)
        {
            crate::log_warn!("failed to release replaced texture {}: {e}", old.handle);
        }

        log::debug!(
            "uploaded image {} generation {} ({}x{} {}) to texture {handle}",
            image.id(),
            image.generation(),
            image.width(),
            image.height(),
            image.format()
        );
        self.bound = Some(BoundTexture {
            handle,
            image_id: image.id(),
            generation: image.generation(),
            width: image.width(),
            height: image.height(),
            format: image.format(),
        });
        Ok(handle)
    }

    /// Read level 0 of the bound texture back into a new image in the format
    /// it was uploaded from.
    pub fn read_back(&self) -> Result<HostImage> {
        let bound = self
            .bound
            .ok_or(GpuError::UnknownTexture(TextureHandle(0)))?;
        let triple = FormatTriple::for_format(&bound.format);
        let bytes = {
            let mut ctx = self.backend.acquire_context()?;
            ctx.read_texture(bound.handle, &triple)?
        };
        HostImage::from_pixels(bound.width, bound.height, bound.format, bytes)
    }

    /// Destroy the texture now and return to Absent.
    pub fn release(&mut self) -> std::result::Result<(), GpuError> {
        let Some(bound) = self.bound.take() else { return Ok(()) };
        let mut ctx = self.backend.acquire_context()?;
        ctx.destroy_texture(bound.handle)
    }
}

impl<B: GpuBackend + ?Sized> Drop for TextureBinding<B> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            crate::log_warn!("texture binding dropped without releasing its texture: {e}");
        }
    }
}

impl<B: GpuBackend + ?Sized> std::fmt::Debug for TextureBinding<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureBinding")
            .field("options", &self.options)
            .field("bound", &self.bound)
            .finish()
    }
}
