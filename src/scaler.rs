// ============================================================================
// SCALER — quality-controlled, multi-step resize with background blending
// ============================================================================
//
// Resampling runs on an RGBA32F working copy through `image::imageops`; the
// result is converted back to the source format (or a requested one).
// Without a background the working copy is premultiplied so transparent
// pixels do not bleed colour. With one, transparent pixels are painted the
// background colour instead and the working copy stays post-multiplied.

use image::Rgba32FImage;
use image::imageops::{self, FilterType};

use crate::error::{ImageError, Result};
use crate::format::{AlphaMode, ImageFormat};
use crate::image::HostImage;

/// Alpha at or below this counts as fully transparent when blending.
const TRANSPARENT_ALPHA: f32 = 1.0 / 255.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleQuality {
    /// One nearest-neighbour step.
    Fast,
    /// One bilinear step.
    #[default]
    Balanced,
    /// Repeated halving, then one final step to the exact size.
    High,
}

/// Resampling kernel for the final step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleFilter {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl ScaleFilter {
    pub fn all() -> &'static [ScaleFilter] {
        &[
            ScaleFilter::Nearest,
            ScaleFilter::Bilinear,
            ScaleFilter::Bicubic,
            ScaleFilter::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> FilterType {
        match self {
            ScaleFilter::Nearest => FilterType::Nearest,
            ScaleFilter::Bilinear => FilterType::Triangle,
            ScaleFilter::Bicubic => FilterType::CatmullRom,
            ScaleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Intermediate sizes visited on the way from `src` to `dst`, ending at `dst`.
/// Empty when the sizes already match.
pub fn plan_steps(src: (u32, u32), dst: (u32, u32), quality: ScaleQuality) -> Vec<(u32, u32)> {
    let mut steps = Vec::new();
    let mut cur = src;
    if quality == ScaleQuality::High {
        loop {
            let w = if cur.0 / 2 >= dst.0 { cur.0 / 2 } else { cur.0 };
            let h = if cur.1 / 2 >= dst.1 { cur.1 / 2 } else { cur.1 };
            if (w, h) == cur {
                break;
            }
            steps.push((w, h));
            cur = (w, h);
        }
    }
    if cur != dst {
        steps.push(dst);
    }
    steps
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scaler {
    quality: ScaleQuality,
    filter: Option<ScaleFilter>,
    background: Option<[f32; 3]>,
}

impl Scaler {
    pub fn new(quality: ScaleQuality) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    /// Override the final-step kernel the quality level would pick.
    pub fn with_filter(mut self, filter: ScaleFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Blend against an opaque RGB background (float view) after every step.
    pub fn with_background(mut self, background: Option<[f32; 3]>) -> Self {
        self.background = background;
        self
    }

    pub fn quality(&self) -> ScaleQuality {
        self.quality
    }

    fn final_filter(&self) -> FilterType {
        match (self.filter, self.quality) {
            (Some(f), _) => f.to_filter(),
            (None, ScaleQuality::Fast) => FilterType::Nearest,
            (None, _) => FilterType::Triangle,
        }
    }

    fn working_alpha(&self) -> AlphaMode {
        if self.background.is_some() {
            AlphaMode::PostMultiplied
        } else {
            AlphaMode::PreMultiplied
        }
    }

    /// Resize to `width × height`, keeping the source format.
    pub fn scale(&self, image: &HostImage, width: u32, height: u32) -> Result<HostImage> {
        self.scale_to_format(image, width, height, image.format())
    }

    /// Resize, then convert to `format`.
    pub fn scale_to_format(&self, image: &HostImage, width: u32, height: u32, format: ImageFormat) -> Result<HostImage> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        let steps = plan_steps(image.dimensions(), (width, height), self.quality);
        if steps.is_empty() && self.background.is_none() {
            return Ok(image.to_format(format));
        }

        let alpha = self.working_alpha();
        let mut buf = to_working(image, alpha)?;
        if let Some(bg) = self.background {
            blend_background(&mut buf, bg);
        }
        let last = steps.len().saturating_sub(1);
        for (i, (w, h)) in steps.into_iter().enumerate() {
            let filter = if i == last { self.final_filter() } else { FilterType::Triangle };
            buf = imageops::resize(&buf, w, h, filter);
            if let Some(bg) = self.background {
                blend_background(&mut buf, bg);
            }
        }
        log::trace!(
            "scaled {}x{} -> {}x{} ({:?})",
            image.width(),
            image.height(),
            width,
            height,
            self.quality
        );
        Ok(from_working(buf, alpha)?.to_format(format))
    }

    /// Scale by `(scale_w, scale_h)` with the longest edge clamped to
    /// `max_dim`, keeping the aspect ratio. `None` when a side rounds to 0.
    pub fn scale_limited(&self, image: &HostImage, scale_w: f64, scale_h: f64, max_dim: u32) -> Result<Option<HostImage>> {
        let Some((w, h)) = limited_size(image.dimensions(), scale_w, scale_h, max_dim) else {
            return Ok(None);
        };
        self.scale(image, w, h).map(Some)
    }
}

/// Target size for [`Scaler::scale_limited`].
pub fn limited_size(src: (u32, u32), scale_w: f64, scale_h: f64, max_dim: u32) -> Option<(u32, u32)> {
    let mut w = (src.0 as f64 * scale_w).round();
    let mut h = (src.1 as f64 * scale_h).round();
    let longest = w.max(h);
    if longest > max_dim as f64 {
        let factor = max_dim as f64 / longest;
        w = (w * factor).round();
        h = (h * factor).round();
    }
    if w < 1.0 || h < 1.0 || !w.is_finite() || !h.is_finite() {
        return None;
    }
    Some((w as u32, h as u32))
}

/// One-shot resize with an optional background colour.
pub fn resize(
    image: &HostImage,
    width: u32,
    height: u32,
    quality: ScaleQuality,
    background: Option<[f32; 3]>,
) -> Result<HostImage> {
    Scaler::new(quality).with_background(background).scale(image, width, height)
}

fn to_working(image: &HostImage, alpha: AlphaMode) -> Result<Rgba32FImage> {
    let work = image.convert(ImageFormat::RGBA32F.with_alpha_mode(alpha));
    let floats: Vec<f32> = work
        .pixels()
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    let expected = floats.len();
    Rgba32FImage::from_raw(image.width(), image.height(), floats).ok_or(ImageError::BufferSize {
        expected: image.width() as usize * image.height() as usize * 4,
        actual: expected,
    })
}

fn from_working(buf: Rgba32FImage, alpha: AlphaMode) -> Result<HostImage> {
    let (w, h) = buf.dimensions();
    let bytes = bytemuck::cast_slice::<f32, u8>(buf.as_raw()).to_vec();
    HostImage::from_pixels(w, h, ImageFormat::RGBA32F.with_alpha_mode(alpha), bytes)
}

/// Transparent pixels take the background colour with zero alpha; the rest
/// are composited over it and become opaque.
fn blend_background(buf: &mut Rgba32FImage, bg: [f32; 3]) {
    for px in buf.pixels_mut() {
        let a = px.0[3];
        if a <= TRANSPARENT_ALPHA {
            px.0 = [bg[0], bg[1], bg[2], 0.0];
        } else {
            for c in 0..3 {
                px.0[c] = px.0[c] * a + bg[c] * (1.0 - a);
            }
            px.0[3] = 1.0;
        }
    }
}
