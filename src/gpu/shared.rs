// ============================================================================
// SHARED IMAGE — one read/write lock over an image and its texture binding
// ============================================================================

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::binding::{BindingOptions, TextureBinding, TextureState};
use super::{GpuBackend, GpuError, TextureHandle};
use crate::image::HostImage;

struct Inner<B: GpuBackend + ?Sized> {
    image: HostImage,
    binding: TextureBinding<B>,
}

/// A [`HostImage`] paired with its [`TextureBinding`] for use across threads.
///
/// Mutation and the fetch-or-upload path take the same lock, so a texture is
/// never built from a half-written image.
pub struct SharedImage<B: GpuBackend + ?Sized> {
    inner: RwLock<Inner<B>>,
}

impl<B: GpuBackend + ?Sized> SharedImage<B> {
    pub fn new(image: HostImage, backend: Arc<B>) -> Self {
        Self::with_options(image, backend, BindingOptions::default())
    }

    pub fn with_options(image: HostImage, backend: Arc<B>, options: BindingOptions) -> Self {
        Self {
            inner: RwLock::new(Inner {
                image,
                binding: TextureBinding::with_options(backend, options),
            }),
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Inner<B>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner<B>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with shared access to the image.
    pub fn read<R>(&self, f: impl FnOnce(&HostImage) -> R) -> R {
        f(&self.read_lock().image)
    }

    /// Run `f` with exclusive access to the image.
    pub fn update<R>(&self, f: impl FnOnce(&mut HostImage) -> R) -> R {
        f(&mut self.write_lock().image)
    }

    pub fn state(&self) -> TextureState {
        let inner = self.read_lock();
        inner.binding.state(&inner.image)
    }

    /// Current texture, uploading if needed. `None` means "texture
    /// unavailable"; the cause has been logged.
    pub fn texture(&self) -> Option<TextureHandle> {
        {
            let inner = self.read_lock();
            if inner.binding.state(&inner.image) == TextureState::Clean {
                return inner.binding.handle();
            }
        }
        let mut guard = self.write_lock();
        let inner = &mut *guard;
        inner.binding.fetch(&inner.image)
    }

    pub fn try_texture(&self) -> Result<TextureHandle, GpuError> {
        let mut guard = self.write_lock();
        let inner = &mut *guard;
        inner.binding.try_fetch(&inner.image)
    }

    /// Consume the pair, destroying the texture and returning the image.
    pub fn into_image(self) -> HostImage {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        inner.image
    }
}
