// ============================================================================
// ERRORS — crate-wide error taxonomy
// ============================================================================

use std::time::Duration;

use crate::format::ComponentLayout;
use crate::gpu::GpuError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Every failure a host image operation can surface.
///
/// GPU failures are normally recovered inside [`crate::gpu::TextureBinding`]
/// (logged, texture reported as unavailable); they only appear here on the
/// explicit `try_*` paths.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// A sub-region does not fit inside the image.
    #[error(
        "region ({x}, {y}) {width}x{height} exceeds image bounds {image_width}x{image_height}"
    )]
    Bounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// A pixel or component index lies outside the image.
    #[error("pixel ({x}, {y}) component {component} outside {width}x{height} image")]
    Index {
        x: u32,
        y: u32,
        component: usize,
        width: u32,
        height: u32,
    },

    #[error("unsupported conversion: {0}")]
    UnsupportedConversion(String),

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("pixel buffer too small: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Only produced by the explicit `try_*` texture paths.
    #[error("GPU resource error: {0}")]
    Gpu(#[from] GpuError),

    /// A row callback failed (or panicked) inside a processing chunk.
    #[error("row {row} failed: {message}")]
    Processing { row: u32, message: String },

    #[error("row processing cancelled")]
    Cancelled,

    #[error("row processing timed out after {0:?}")]
    TimedOut(Duration),

    #[error("codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    pub(crate) fn component_count(count: usize) -> Self {
        ImageError::UnsupportedConversion(format!(
            "component count {} (expected 1..={})",
            count,
            ComponentLayout::Rgba.component_count()
        ))
    }
}

impl From<Box<bincode::ErrorKind>> for ImageError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ImageError::Snapshot(e.to_string())
    }
}
