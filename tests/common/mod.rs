//! Shared fixtures: synthetic images and an instrumented GPU backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hostimage::gpu::{FormatTriple, GpuBackend, GpuContext, GpuError, TextureHandle, TextureUpload};
use hostimage::{HostImage, ImageFormat};

// ============================================================================
// Synthetic images
// ============================================================================

/// Post-multiplied RGBA colour for `(x, y)` on an 8-bit grid, alpha kept at
/// or above one half.
pub fn pattern_rgba(x: u32, y: u32) -> [f32; 4] {
    let r = (x * 37 + y * 11) % 256;
    let g = (x * 5 + y * 53 + 17) % 256;
    let b = (x * 91 + y * 3 + 200) % 256;
    let a = 128 + (x * 13 + y * 29) % 128;
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0]
}

/// `width × height` image in `format` filled with [`pattern_rgba`].
pub fn pattern_image(width: u32, height: u32, format: ImageFormat) -> HostImage {
    let mut rgba = HostImage::new(width, height, ImageFormat::RGBA32F).expect("valid dimensions");
    for y in 0..height {
        for x in 0..width {
            rgba.set_pixel_f32(x, y, &pattern_rgba(x, y));
        }
    }
    rgba.to_format(format)
}

/// Image filled with one colour given in the float view.
pub fn solid_image(width: u32, height: u32, format: ImageFormat, color: &[f32]) -> HostImage {
    let mut image = HostImage::new(width, height, format).expect("valid dimensions");
    image.fill_f32(color);
    image
}

/// Largest per-component difference between two same-shaped images in the
/// float view.
pub fn max_component_error(a: &HostImage, b: &HostImage) -> f32 {
    assert_eq!(a.dimensions(), b.dimensions());
    assert_eq!(a.format(), b.format());
    let n = a.format().component_count();
    let mut worst = 0f32;
    let (mut pa, mut pb) = ([0f32; 4], [0f32; 4]);
    for y in 0..a.height() {
        for x in 0..a.width() {
            a.pixel_f32(x, y, &mut pa);
            b.pixel_f32(x, y, &mut pb);
            for c in 0..n {
                worst = worst.max((pa[c] - pb[c]).abs());
            }
        }
    }
    worst
}

// ============================================================================
// Instrumented GPU backend
// ============================================================================

#[derive(Default)]
struct Store {
    next: u64,
    textures: HashMap<TextureHandle, (FormatTriple, Vec<u8>)>,
}

/// In-memory [`GpuBackend`] that counts every call and can be told to fail.
#[derive(Default)]
pub struct CountingBackend {
    store: Mutex<Store>,
    pub acquires: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub destroys: AtomicUsize,
    pub finishes: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_finish: AtomicBool,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates plus updates.
    pub fn uploads(&self) -> usize {
        self.creates.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn live_textures(&self) -> usize {
        self.store.lock().unwrap().textures.len()
    }

    pub fn texture_bytes(&self, handle: TextureHandle) -> Option<Vec<u8>> {
        self.store.lock().unwrap().textures.get(&handle).map(|(_, d)| d.clone())
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.fail_upload.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }
}

impl GpuBackend for CountingBackend {
    fn acquire_context(&self) -> Result<Box<dyn GpuContext + '_>, GpuError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(GpuError::NoContext("context disabled".into()));
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingContext {
            backend: self,
            store: self.store.lock().unwrap(),
        }))
    }
}

struct CountingContext<'a> {
    backend: &'a CountingBackend,
    store: MutexGuard<'a, Store>,
}

impl CountingContext<'_> {
    fn check(&self, upload: &TextureUpload<'_>) -> Result<(), GpuError> {
        if self.backend.fail_upload.load(Ordering::SeqCst) {
            return Err(GpuError::Upload("upload disabled".into()));
        }
        let expected = upload.width as usize * upload.height as usize * upload.triple.bytes_per_pixel();
        if upload.data.len() != expected {
            return Err(GpuError::Upload(format!("expected {expected} bytes, got {}", upload.data.len())));
        }
        Ok(())
    }
}

impl GpuContext for CountingContext<'_> {
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureHandle, GpuError> {
        self.check(upload)?;
        self.backend.creates.fetch_add(1, Ordering::SeqCst);
        self.store.next += 1;
        let handle = TextureHandle(self.store.next);
        self.store.textures.insert(handle, (upload.triple, upload.data.to_vec()));
        Ok(handle)
    }

    fn update_texture(&mut self, handle: TextureHandle, upload: &TextureUpload<'_>) -> Result<(), GpuError> {
        self.check(upload)?;
        let slot = self
            .store
            .textures
            .get_mut(&handle)
            .ok_or(GpuError::UnknownTexture(handle))?;
        self.backend.updates.fetch_add(1, Ordering::SeqCst);
        *slot = (upload.triple, upload.data.to_vec());
        Ok(())
    }

    fn read_texture(&mut self, handle: TextureHandle, triple: &FormatTriple) -> Result<Vec<u8>, GpuError> {
        let (stored, data) = self.store.textures.get(&handle).ok_or(GpuError::UnknownTexture(handle))?;
        if stored != triple {
            return Err(GpuError::Readback("triple mismatch".into()));
        }
        Ok(data.clone())
    }

    fn destroy_texture(&mut self, handle: TextureHandle) -> Result<(), GpuError> {
        self.store
            .textures
            .remove(&handle)
            .ok_or(GpuError::UnknownTexture(handle))?;
        self.backend.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self, timeout: Duration) -> Result<(), GpuError> {
        self.backend.finishes.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_finish.load(Ordering::SeqCst) {
            return Err(GpuError::FenceTimeout(timeout));
        }
        Ok(())
    }
}
