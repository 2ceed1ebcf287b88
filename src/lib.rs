// ============================================================================
// HOSTIMAGE — multi-format host pixel buffers
// ============================================================================
//
// Layout:
//   format.rs    — component type × layout × alpha convention
//   buffer.rs    — copy-on-write byte storage
//   image.rs     — HostImage: accessors, blits, sampling, snapshots
//   convert.rs   — closed conversion matrix
//   processor.rs — row-chunked parallel processing
//   scaler.rs    — multi-step resize with background blending
//   codec.rs     — PNG / JPEG via the `image` crate
//   settings.rs  — key=value engine settings
//   logger.rs    — session file sink for the `log` facade
//   gpu/         — lazy texture synchronisation and the wgpu backend
// ============================================================================

pub mod logger;

pub mod buffer;
pub mod codec;
pub mod convert;
pub mod error;
pub mod format;
pub mod gpu;
pub mod image;
pub mod processor;
pub mod scaler;
pub mod settings;

#[doc(hidden)]
pub use log as __log;

pub use crate::buffer::PixelBuffer;
pub use crate::codec::{ContainerFormat, ReadOptions};
pub use crate::convert::{ConvertOptions, GreyReduction};
pub use crate::error::{ImageError, Result};
pub use crate::format::{AlphaMode, ComponentLayout, ComponentType, ImageFormat};
pub use crate::gpu::{GpuBackend, GpuContext, GpuError, SharedImage, TextureBinding, TextureHandle, TextureState};
pub use crate::image::HostImage;
pub use crate::processor::{CancellationToken, TiledProcessor};
pub use crate::scaler::{ScaleFilter, ScaleQuality, Scaler};
pub use crate::settings::EngineSettings;
