// ============================================================================
// FORMAT CONVERSION — closed matrix over type × layout × alpha convention
// ============================================================================
//
// Every conversion is one forward pass: each destination pixel depends only on
// the source pixel at the same coordinate, so rows are converted in parallel.

use std::borrow::Cow;

use rayon::prelude::*;

use crate::error::Result;
use crate::format::{AlphaMode, ComponentLayout, ComponentType, ImageFormat};
use crate::image::{HostImage, load_pixel, store_pixel};

/// How colour collapses into a single grey component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GreyReduction {
    /// Keep the leading colour component, drop the trailing ones.
    #[default]
    FirstChannel,
    /// Mean of R, G and B.
    Average,
}

/// Knobs for the conversion matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// When converting from Float32, a pixel with any NaN component becomes
    /// all-zero (transparent black) in the target. Off by default; without it
    /// a NaN component alone maps to 0 in Integer8 targets.
    pub nan_as_transparent: bool,
    pub grey: GreyReduction,
}

impl ConvertOptions {
    pub fn nan_as_transparent(mut self, enabled: bool) -> Self {
        self.nan_as_transparent = enabled;
        self
    }

    pub fn grey(mut self, grey: GreyReduction) -> Self {
        self.grey = grey;
        self
    }
}

#[inline]
fn premultiplied(format: &ImageFormat) -> bool {
    format.alpha_mode() == AlphaMode::PreMultiplied && format.layout().has_alpha()
}

/// Convert one pixel in place from `src` to `dst` in the float view.
///
/// `px[..src.component_count()]` holds the source pixel on entry;
/// `px[..dst.component_count()]` holds the result on return.
pub fn convert_pixel_f32(src: &ImageFormat, dst: &ImageFormat, px: &mut [f32; 4], options: &ConvertOptions) {
    if options.nan_as_transparent
        && src.component_type() == ComponentType::Float32
        && px[..src.component_count()].iter().any(|v| v.is_nan())
    {
        *px = [0.0; 4];
        return;
    }

    // Expand to RGBA.
    match src.layout() {
        ComponentLayout::G => *px = [px[0], px[0], px[0], 1.0],
        ComponentLayout::Ga => *px = [px[0], px[0], px[0], px[1]],
        ComponentLayout::Rgb => px[3] = 1.0,
        ComponentLayout::Rgba => {}
    }

    // Alpha convention.
    match (premultiplied(src), premultiplied(dst)) {
        (true, false) => {
            let a = px[3];
            if a > 0.0 {
                px[0] /= a;
                px[1] /= a;
                px[2] /= a;
            } else {
                *px = [0.0; 4];
            }
        }
        (false, true) => {
            let a = px[3];
            px[0] *= a;
            px[1] *= a;
            px[2] *= a;
        }
        _ => {}
    }

    // Reduce to the target layout.
    let grey = |px: &[f32; 4]| match options.grey {
        GreyReduction::FirstChannel => px[0],
        GreyReduction::Average => (px[0] + px[1] + px[2]) / 3.0,
    };
    match dst.layout() {
        ComponentLayout::G => px[0] = grey(px),
        ComponentLayout::Ga => {
            px[0] = grey(px);
            px[1] = px[3];
        }
        ComponentLayout::Rgb | ComponentLayout::Rgba => {}
    }
}

/// Convert one packed row of `src` pixels into `dst_row`.
pub fn convert_row(src: &ImageFormat, src_row: &[u8], dst: &ImageFormat, dst_row: &mut [u8], options: &ConvertOptions) {
    let mut px = [0f32; 4];
    for (s, d) in src_row
        .chunks_exact(src.bytes_per_pixel())
        .zip(dst_row.chunks_exact_mut(dst.bytes_per_pixel()))
    {
        load_pixel(src, s, &mut px);
        convert_pixel_f32(src, dst, &mut px, options);
        store_pixel(dst, d, &px);
    }
}

impl HostImage {
    /// Image in `format` with default options. Returns `self` borrowed when the
    /// format already matches; treat the result as copy-on-write.
    pub fn convert(&self, format: ImageFormat) -> Cow<'_, HostImage> {
        self.convert_with(format, &ConvertOptions::default())
    }

    pub fn convert_with(&self, format: ImageFormat, options: &ConvertOptions) -> Cow<'_, HostImage> {
        if self.format() == format {
            return Cow::Borrowed(self);
        }
        Cow::Owned(self.convert_owned(format, options))
    }

    /// Like [`HostImage::convert`] but takes a raw component count; `None`
    /// keeps the current value. Counts outside `1..=4` are unsupported.
    pub fn convert_parts(
        &self,
        component_type: Option<ComponentType>,
        component_count: Option<usize>,
        alpha: Option<AlphaMode>,
    ) -> Result<Cow<'_, HostImage>> {
        let current = self.format();
        let layout = match component_count {
            Some(n) => ComponentLayout::from_count(n)?,
            None => current.layout(),
        };
        let format = ImageFormat::new(
            component_type.unwrap_or(current.component_type()),
            layout,
            alpha.unwrap_or(current.alpha_mode()),
        );
        Ok(self.convert(format))
    }

    /// Always-owned conversion; never aliases `self`.
    pub fn to_format(&self, format: ImageFormat) -> HostImage {
        match self.convert(format) {
            Cow::Borrowed(same) => same.copy(),
            Cow::Owned(converted) => converted,
        }
    }

    fn convert_owned(&self, format: ImageFormat, options: &ConvertOptions) -> HostImage {
        let src_format = self.format();
        // Dimensions were validated when `self` was built.
        let mut out = self.allocate_like(format);
        let src_stride = self.row_stride();
        let dst_stride = out.row_stride();
        out.raw_mut()
            .par_chunks_mut(dst_stride)
            .zip(self.pixels().par_chunks(src_stride))
            .for_each(|(dst_row, src_row)| {
                convert_row(&src_format, src_row, &format, dst_row, options);
            });
        out
    }
}
