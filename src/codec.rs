// ============================================================================
// CODEC — PNG / JPEG in and out of HostImage via the `image` crate
// ============================================================================

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};

use crate::error::{ImageError, Result};
use crate::format::{AlphaMode, ComponentLayout, ComponentType, ImageFormat};
use crate::image::HostImage;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Container to encode into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    Png,
    Jpeg,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Png => "png",
            ContainerFormat::Jpeg => "jpg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ContainerFormat::Png),
            "jpg" | "jpeg" => Some(ContainerFormat::Jpeg),
            _ => None,
        }
    }
}

/// What the decoded image should look like. `None` keeps what the file has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub component_type: Option<ComponentType>,
    pub layout: Option<ComponentLayout>,
    pub alpha: Option<AlphaMode>,
    /// Store rows bottom-up.
    pub flip_vertical: bool,
}

impl ReadOptions {
    pub fn with_format(format: ImageFormat) -> Self {
        Self {
            component_type: Some(format.component_type()),
            layout: Some(format.layout()),
            alpha: Some(format.alpha_mode()),
            flip_vertical: false,
        }
    }
}

fn layout_of(color: ColorType) -> Option<(ComponentLayout, bool)> {
    // (layout, stored as 8-bit)
    match color {
        ColorType::L8 => Some((ComponentLayout::G, true)),
        ColorType::La8 => Some((ComponentLayout::Ga, true)),
        ColorType::Rgb8 => Some((ComponentLayout::Rgb, true)),
        ColorType::Rgba8 => Some((ComponentLayout::Rgba, true)),
        ColorType::L16 => Some((ComponentLayout::G, false)),
        ColorType::La16 => Some((ComponentLayout::Ga, false)),
        ColorType::Rgb16 | ColorType::Rgb32F => Some((ComponentLayout::Rgb, false)),
        ColorType::Rgba16 | ColorType::Rgba32F => Some((ComponentLayout::Rgba, false)),
        _ => None,
    }
}

/// Decode PNG/JPEG (or anything the enabled codecs accept) into a HostImage.
///
/// 8-bit files decode to Integer8; deeper files to Float32. Rows come out
/// top-to-bottom unless `flip_vertical` is set.
pub fn read(bytes: &[u8], options: ReadOptions) -> Result<HostImage> {
    let decoded = image::load_from_memory(bytes)?;
    let color = decoded.color();
    let (layout, is_8bit) = layout_of(color)
        .ok_or_else(|| ImageError::UnsupportedConversion(format!("decoded colour type {color:?}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    let native = if is_8bit {
        let format = ImageFormat::new(ComponentType::Integer8, layout, AlphaMode::PostMultiplied);
        HostImage::from_pixels(width, height, format, decoded.into_bytes())?
    } else {
        let rgba = decoded.to_rgba32f();
        let bytes = bytemuck::cast_slice::<f32, u8>(rgba.as_raw()).to_vec();
        HostImage::from_pixels(width, height, ImageFormat::RGBA32F, bytes)?
            .to_format(ImageFormat::new(ComponentType::Float32, layout, AlphaMode::PostMultiplied))
    };

    let current = native.format();
    let target = ImageFormat::new(
        options.component_type.unwrap_or(current.component_type()),
        options.layout.unwrap_or(current.layout()),
        options.alpha.unwrap_or(current.alpha_mode()),
    );
    let mut image = if native.format() == target { native } else { native.to_format(target) };
    if options.flip_vertical {
        flip_rows(&mut image);
    }
    log::debug!("decoded {width}x{height} {color:?} as {}", image.format());
    Ok(image)
}

pub fn read_file(path: impl AsRef<Path>, options: ReadOptions) -> Result<HostImage> {
    read(&std::fs::read(path)?, options)
}

fn flip_rows(image: &mut HostImage) {
    let stride = image.row_stride();
    let height = image.height() as usize;
    let data = image.pixels_mut();
    for y in 0..height / 2 {
        let (top, bottom) = data.split_at_mut((height - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }
}

/// Encode with [`DEFAULT_JPEG_QUALITY`] for JPEG.
pub fn write(image: &HostImage, container: ContainerFormat) -> Result<Vec<u8>> {
    write_with_quality(image, container, DEFAULT_JPEG_QUALITY)
}

/// Encode `image`. Float images are quantised to 8 bits and premultiplied
/// images are un-premultiplied first; JPEG drops alpha.
pub fn write_with_quality(image: &HostImage, container: ContainerFormat, quality: u8) -> Result<Vec<u8>> {
    let layout = match container {
        ContainerFormat::Png => image.layout(),
        ContainerFormat::Jpeg => match image.layout() {
            ComponentLayout::G | ComponentLayout::Ga => ComponentLayout::G,
            ComponentLayout::Rgb | ComponentLayout::Rgba => ComponentLayout::Rgb,
        },
    };
    let target = ImageFormat::new(ComponentType::Integer8, layout, AlphaMode::PostMultiplied);
    let encodable = image.convert(target);
    let color = match layout {
        ComponentLayout::G => ColorType::L8,
        ComponentLayout::Ga => ColorType::La8,
        ComponentLayout::Rgb => ColorType::Rgb8,
        ComponentLayout::Rgba => ColorType::Rgba8,
    };

    let mut out = Vec::new();
    match container {
        ContainerFormat::Png => {
            PngEncoder::new(&mut out).write_image(
                encodable.pixels(),
                encodable.width(),
                encodable.height(),
                color,
            )?;
        }
        ContainerFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            encoder.encode(encodable.pixels(), encodable.width(), encodable.height(), color)?;
        }
    }
    Ok(out)
}

/// Encode into a file; the container follows the extension (PNG otherwise).
pub fn write_file(image: &HostImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let container = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ContainerFormat::from_extension)
        .unwrap_or(ContainerFormat::Png);
    std::fs::write(path, write(image, container)?)?;
    Ok(())
}

/// Wrap an RGBA8 host image as a `DynamicImage` for callers that want the
/// rest of the `image` toolbox.
pub fn to_dynamic(image: &HostImage) -> Result<DynamicImage> {
    let rgba = image.convert(ImageFormat::RGBA8);
    image::RgbaImage::from_raw(rgba.width(), rgba.height(), rgba.pixels().to_vec())
        .map(DynamicImage::ImageRgba8)
        .ok_or(ImageError::BufferSize {
            expected: rgba.width() as usize * rgba.height() as usize * 4,
            actual: rgba.pixels().len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup() {
        assert_eq!(ContainerFormat::from_extension("JPEG"), Some(ContainerFormat::Jpeg));
        assert_eq!(ContainerFormat::from_extension("png"), Some(ContainerFormat::Png));
        assert_eq!(ContainerFormat::from_extension("tif"), None);
    }

    #[test]
    fn flip_swaps_rows() {
        let mut img = HostImage::from_pixels(1, 3, ImageFormat::GREY8, vec![1, 2, 3]).unwrap();
        flip_rows(&mut img);
        assert_eq!(img.pixels(), &[3, 2, 1]);
    }

    #[test]
    fn garbage_bytes_surface_codec_error() {
        let err = read(b"definitely not an image", ReadOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::Codec(_)));
    }
}
