// ============================================================================
// GPU CONTEXT — headless wgpu device implementing GpuBackend
// ============================================================================

use std::collections::HashMap;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::format::FormatTriple;
use super::texture::{GpuTexture, MipmapPipeline, StorageFormat};
use super::{GpuBackend, GpuContext, GpuError, TextureHandle, TextureUpload};
use crate::settings::EngineSettings;

#[derive(Default)]
struct TextureRegistry {
    next_handle: u64,
    textures: HashMap<TextureHandle, GpuTexture>,
}

/// Owns the wgpu device and every texture created through it.
///
/// The texture registry doubles as the context lock: holding a
/// [`GpuContext`] from this backend means holding the registry mutex.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    max_texture_dim: u32,
    mip_rgba8: MipmapPipeline,
    mip_rgba32f: MipmapPipeline,
    registry: Mutex<TextureRegistry>,
}

impl WgpuBackend {
    /// Open a headless device. Tries hardware first, then the software
    /// fallback adapter.
    pub fn new(preferred_gpu: &str) -> Result<Self, GpuError> {
        if let Some(backend) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Ok(backend);
        }
        log::warn!("hardware GPU adapter unavailable, trying software fallback");
        pollster::block_on(Self::new_async(preferred_gpu, true))
            .ok_or_else(|| GpuError::NoContext("no wgpu adapter available".to_string()))
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self, GpuError> {
        Self::new(&settings.preferred_gpu)
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power = match preferred_gpu.to_lowercase().as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("hostimage GPU"),
                    // Linear sampling of Rgba32Float where the adapter allows it.
                    required_features: adapter.features() & wgpu::Features::FLOAT32_FILTERABLE,
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        crate::log_info!("GPU adapter: {adapter_name} (fallback: {force_fallback})");

        Some(Self {
            mip_rgba8: MipmapPipeline::new(&device, StorageFormat::Rgba8),
            mip_rgba32f: MipmapPipeline::new(&device, StorageFormat::Rgba32F),
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
            registry: Mutex::new(TextureRegistry::default()),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Check if a texture of the given dimensions can be created.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    fn mipmaps_for(&self, storage: StorageFormat) -> &MipmapPipeline {
        match storage {
            StorageFormat::Rgba8 => &self.mip_rgba8,
            StorageFormat::Rgba32F => &self.mip_rgba32f,
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, TextureRegistry>, GpuError> {
        self.registry
            .lock()
            .map_err(|_| GpuError::NoContext("texture registry lock poisoned".to_string()))
    }

    /// Full-mip view of a texture for binding in a render pass. Must not be
    /// called while a context from this backend is held on the same thread.
    pub fn texture_view(&self, handle: TextureHandle) -> Option<wgpu::TextureView> {
        let registry = self.registry().ok()?;
        let tex = registry.textures.get(&handle)?;
        Some(tex.texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    /// Sampler created with the texture's [`super::SamplerParams`].
    pub fn sampler(&self, handle: TextureHandle) -> Option<Arc<wgpu::Sampler>> {
        let registry = self.registry().ok()?;
        registry.textures.get(&handle).map(|t| Arc::clone(&t.sampler))
    }

    pub fn texture_count(&self) -> usize {
        self.registry().map(|r| r.textures.len()).unwrap_or(0)
    }
}

impl GpuBackend for WgpuBackend {
    fn acquire_context(&self) -> Result<Box<dyn GpuContext + '_>, GpuError> {
        let registry = self.registry()?;
        Ok(Box::new(WgpuContext {
            backend: self,
            registry,
        }))
    }
}

struct WgpuContext<'a> {
    backend: &'a WgpuBackend,
    registry: MutexGuard<'a, TextureRegistry>,
}

impl WgpuContext<'_> {
    fn check_upload(&self, upload: &TextureUpload<'_>) -> Result<(), GpuError> {
        if !self.backend.supports_size(upload.width, upload.height) {
            return Err(GpuError::Unsupported(format!(
                "{}x{} exceeds the device limit of {}",
                upload.width, upload.height, self.backend.max_texture_dim
            )));
        }
        let expected = upload.width as usize * upload.height as usize * upload.triple.bytes_per_pixel();
        if upload.data.len() != expected {
            return Err(GpuError::Upload(format!(
                "expected {expected} bytes of pixel data, got {}",
                upload.data.len()
            )));
        }
        Ok(())
    }

    /// Run `f` inside a validation error scope and surface what it caught.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> Result<T, GpuError> {
        let device = &self.backend.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => Err(GpuError::Upload(e.to_string())),
        }
    }
}

impl GpuContext for WgpuContext<'_> {
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureHandle, GpuError> {
        self.check_upload(upload)?;
        let backend = self.backend;
        let storage = StorageFormat::for_triple(&upload.triple);
        let mipmaps = upload.mipmaps.then(|| backend.mipmaps_for(storage));
        let texture = self.scoped(|| GpuTexture::new(&backend.device, &backend.queue, upload, mipmaps))?;

        self.registry.next_handle += 1;
        let handle = TextureHandle(self.registry.next_handle);
        self.registry.textures.insert(handle, texture);
        Ok(handle)
    }

    fn update_texture(&mut self, handle: TextureHandle, upload: &TextureUpload<'_>) -> Result<(), GpuError> {
        self.check_upload(upload)?;
        let backend = self.backend;
        let tex = self
            .registry
            .textures
            .get(&handle)
            .ok_or(GpuError::UnknownTexture(handle))?;
        if tex.width != upload.width || tex.height != upload.height || tex.triple != upload.triple {
            return Err(GpuError::Unsupported(format!(
                "texture {handle} is {}x{}, cannot refill with {}x{}",
                tex.width, tex.height, upload.width, upload.height
            )));
        }
        let mipmaps = upload.mipmaps.then(|| backend.mipmaps_for(tex.storage));
        self.scoped(|| tex.upload(&backend.device, &backend.queue, upload.data, mipmaps))
    }

    fn read_texture(&mut self, handle: TextureHandle, triple: &FormatTriple) -> Result<Vec<u8>, GpuError> {
        let tex = self
            .registry
            .textures
            .get(&handle)
            .ok_or(GpuError::UnknownTexture(handle))?;
        if tex.triple != *triple {
            return Err(GpuError::Unsupported(format!(
                "texture {handle} was not uploaded as {triple:?}"
            )));
        }
        tex.read_packed(&self.backend.device, &self.backend.queue)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) -> Result<(), GpuError> {
        let tex = self
            .registry
            .textures
            .remove(&handle)
            .ok_or(GpuError::UnknownTexture(handle))?;
        tex.texture.destroy();
        Ok(())
    }

    fn finish(&mut self, timeout: Duration) -> Result<(), GpuError> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.backend.queue.on_submitted_work_done(move || {
            let _ = tx.send(());
        });
        let deadline = Instant::now() + timeout;
        loop {
            let _ = self.backend.device.poll(wgpu::Maintain::Poll);
            match rx.try_recv() {
                Ok(()) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(GpuError::Upload("device dropped the completion callback".to_string()));
                }
                Err(TryRecvError::Empty) => {}
            }
            if Instant::now() >= deadline {
                return Err(GpuError::FenceTimeout(timeout));
            }
            std::thread::sleep(Duration::from_micros(250));
        }
    }
}
