// ============================================================================
// GPU TEXTURE — wgpu storage, CPU-side swizzle expansion, mipmaps, readback
// ============================================================================
//
// wgpu has no 1/2/3-channel 8-bit-per-channel RGB formats and no sampler
// swizzle, so every image lands in an RGBA texture. The format triple's
// swizzle is applied while expanding on the CPU, which gives the sampled
// result the table describes.

use std::sync::Arc;

use super::format::{DataType, Filter, FormatTriple, SamplerParams, Wrap};
use super::{GpuError, TextureUpload, shaders};

/// Texel format the RGBA texture is stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageFormat {
    Rgba8,
    Rgba32F,
}

impl StorageFormat {
    pub fn for_triple(triple: &FormatTriple) -> Self {
        match triple.data_type {
            DataType::UnsignedByte => StorageFormat::Rgba8,
            DataType::Float => StorageFormat::Rgba32F,
        }
    }

    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            StorageFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            StorageFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Storage texel name as spelled in WGSL.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            StorageFormat::Rgba8 => "rgba8unorm",
            StorageFormat::Rgba32F => "rgba32float",
        }
    }

    /// Bytes per RGBA texel.
    pub fn texel_size(self) -> u32 {
        match self {
            StorageFormat::Rgba8 => 4,
            StorageFormat::Rgba32F => 16,
        }
    }
}

/// Expand packed image pixels to RGBA texels, applying the triple's swizzle.
pub fn expand_to_rgba(triple: &FormatTriple, data: &[u8]) -> Vec<u8> {
    let n = triple.pixel_format.component_count();
    let swizzle = triple.swizzle;
    match triple.data_type {
        DataType::UnsignedByte => {
            if n == 4 && swizzle.is_identity() {
                return data.to_vec();
            }
            let mut out = Vec::with_capacity(data.len() / n * 4);
            for px in data.chunks_exact(n) {
                out.extend_from_slice(&swizzle.apply(px, 0u8, 255u8));
            }
            out
        }
        DataType::Float => {
            let mut out = Vec::with_capacity(data.len() / n * 4);
            let mut texel = [0f32; 4];
            for px in data.chunks_exact(n * 4) {
                for (c, v) in texel.iter_mut().take(n).enumerate() {
                    *v = bytemuck::pod_read_unaligned(&px[c * 4..c * 4 + 4]);
                }
                let rgba = swizzle.apply(&texel[..n], 0.0f32, 1.0f32);
                out.extend_from_slice(bytemuck::cast_slice(&rgba));
            }
            out
        }
    }
}

/// Inverse of [`expand_to_rgba`]: pick each stored channel back out of the
/// RGBA texels.
pub fn collapse_from_rgba(triple: &FormatTriple, rgba: &[u8]) -> Vec<u8> {
    let n = triple.pixel_format.component_count();
    let size = triple.data_type.size();
    let channels: Vec<usize> = (0..n)
        .map(|c| triple.swizzle.output_for(c).unwrap_or(c))
        .collect();
    let mut out = Vec::with_capacity(rgba.len() / 4 * n);
    for texel in rgba.chunks_exact(4 * size) {
        for &ch in &channels {
            out.extend_from_slice(&texel[ch * size..(ch + 1) * size]);
        }
    }
    out
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::Repeat => wgpu::AddressMode::Repeat,
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn create_sampler(device: &wgpu::Device, params: &SamplerParams) -> wgpu::Sampler {
    let (min_filter, mipmap_filter) = match params.min_filter {
        Filter::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        Filter::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
        Filter::LinearMipmapLinear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear),
    };
    let mag_filter = match params.mag_filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear | Filter::LinearMipmapLinear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("host_image_sampler"),
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter,
        min_filter,
        mipmap_filter,
        ..Default::default()
    })
}

/// One uploaded host image.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub sampler: Arc<wgpu::Sampler>,
    pub triple: FormatTriple,
    pub storage: StorageFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

impl GpuTexture {
    /// Allocate the texture and upload level 0 (plus mips when `mipmaps` is
    /// given). Submission is asynchronous; callers fence separately.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        upload: &TextureUpload<'_>,
        mipmaps: Option<&MipmapPipeline>,
    ) -> Self {
        let storage = StorageFormat::for_triple(&upload.triple);
        let mip_levels = if mipmaps.is_some() {
            Self::mip_level_count(upload.width, upload.height)
        } else {
            1
        };

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if mip_levels > 1 {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("host_image_texture"),
            size: wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: storage.texture_format(),
            usage,
            view_formats: &[],
        });

        let tex = Self {
            texture,
            sampler: Arc::new(create_sampler(device, &upload.sampler)),
            triple: upload.triple,
            storage,
            width: upload.width,
            height: upload.height,
            mip_levels,
        };
        tex.upload(device, queue, upload.data, mipmaps);
        tex
    }

    /// Re-fill level 0 from packed image pixels and rebuild the mip chain.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8], mipmaps: Option<&MipmapPipeline>) {
        let rgba = expand_to_rgba(&self.triple, data);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.storage.texel_size() * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        if let Some(mip) = mipmaps
            && self.mip_levels > 1
        {
            mip.generate(device, queue, &self.texture, self.width, self.height, self.mip_levels);
        } else {
            // Flush the staged write so a following fence covers it.
            queue.submit(std::iter::empty());
        }
    }

    /// Full mip chain down to 1×1.
    pub fn mip_level_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    fn aligned_bytes_per_row(&self) -> u32 {
        let unaligned = self.width * self.storage.texel_size();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        unaligned.div_ceil(align) * align
    }

    /// Level 0 as packed RGBA texels, row padding removed.
    pub fn read_rgba(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, GpuError> {
        let bytes_per_row = self.aligned_bytes_per_row();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: bytes_per_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GpuError::Readback(format!("map error: {e:?}"))),
            Err(e) => return Err(GpuError::Readback(format!("channel error: {e}"))),
        }

        let mapped = slice.get_mapped_range();
        let actual_row = (self.width * self.storage.texel_size()) as usize;
        let mut result = Vec::with_capacity(actual_row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * bytes_per_row as usize;
            result.extend_from_slice(&mapped[start..start + actual_row]);
        }
        drop(mapped);
        staging.unmap();
        Ok(result)
    }

    /// Level 0 packed the way the original image stored it.
    pub fn read_packed(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, GpuError> {
        Ok(collapse_from_rgba(&self.triple, &self.read_rgba(device, queue)?))
    }
}

// ============================================================================
// MIPMAP GENERATION PIPELINE
// ============================================================================

/// Compute pipeline that generates successive mip levels from level 0, for
/// one storage format.
pub struct MipmapPipeline {
    storage: StorageFormat,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl MipmapPipeline {
    pub fn new(device: &wgpu::Device, storage: StorageFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::mipmap_shader(storage.wgsl_name()).into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        // textureLoad only; 32-bit float is not filterable everywhere.
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: storage.texture_format(),
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mipmap_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("mipmap_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "cs_mipmap",
            compilation_options: Default::default(),
        });

        Self {
            storage,
            pipeline,
            bind_group_layout,
        }
    }

    pub fn storage(&self) -> StorageFormat {
        self.storage
    }

    /// Generate mip levels 1..mip_levels from mip level 0 of the given texture.
    pub fn generate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        mut width: u32,
        mut height: u32,
        mip_levels: u32,
    ) {
        let format = self.storage.texture_format();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mipmap_encoder"),
        });

        for level in 1..mip_levels {
            let src_view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level - 1,
                mip_level_count: Some(1),
                format: Some(format),
                ..Default::default()
            });
            let dst_w = (width / 2).max(1);
            let dst_h = (height / 2).max(1);
            let dst_view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level,
                mip_level_count: Some(1),
                format: Some(format),
                ..Default::default()
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mipmap_bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&dst_view),
                    },
                ],
            });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("mipmap_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(dst_w.div_ceil(16), dst_h.div_ceil(16), 1);
            }

            width = dst_w;
            height = dst_h;
        }

        queue.submit(std::iter::once(encoder.finish()));
    }
}
