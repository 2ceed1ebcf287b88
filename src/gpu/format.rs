// ============================================================================
// GPU FORMAT TABLE — ImageFormat -> internal format / format / type + swizzle
// ============================================================================
//
// Deterministic and keyed only by component type × layout; the alpha
// convention does not change how bytes are submitted.

use crate::format::{ComponentLayout, ComponentType, ImageFormat};

/// Sized storage format of the texture object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
}

/// Channel layout of the submitted pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub const fn component_count(self) -> usize {
        match self {
            PixelFormat::Red => 1,
            PixelFormat::Rg => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Scalar type of the submitted pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    UnsignedByte,
    Float,
}

impl DataType {
    pub const fn size(self) -> usize {
        match self {
            DataType::UnsignedByte => 1,
            DataType::Float => 4,
        }
    }
}

/// Where one sampled output channel reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwizzleSource {
    Red,
    Green,
    Blue,
    Alpha,
    Zero,
    One,
}

/// Per-channel source for the sampled (r, g, b, a) vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Swizzle(pub [SwizzleSource; 4]);

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle([
        SwizzleSource::Red,
        SwizzleSource::Green,
        SwizzleSource::Blue,
        SwizzleSource::Alpha,
    ]);
    /// Grey replicated into RGB, opaque alpha.
    pub const GREY: Swizzle = Swizzle([
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::One,
    ]);
    /// Grey replicated into RGB, alpha stored in the second channel.
    pub const GREY_ALPHA: Swizzle = Swizzle([
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::Green,
    ]);

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Sample one texel the way texture hardware would: missing colour
    /// channels read 0, missing alpha reads `one`, then the swizzle picks.
    pub fn apply<T: Copy>(&self, texel: &[T], zero: T, one: T) -> [T; 4] {
        let fetch = |i: usize| texel.get(i).copied().unwrap_or(if i == 3 { one } else { zero });
        self.0.map(|source| match source {
            SwizzleSource::Red => fetch(0),
            SwizzleSource::Green => fetch(1),
            SwizzleSource::Blue => fetch(2),
            SwizzleSource::Alpha => fetch(3),
            SwizzleSource::Zero => zero,
            SwizzleSource::One => one,
        })
    }

    /// Output channel that carries stored channel `channel`, if any.
    pub fn output_for(&self, channel: usize) -> Option<usize> {
        let wanted = match channel {
            0 => SwizzleSource::Red,
            1 => SwizzleSource::Green,
            2 => SwizzleSource::Blue,
            3 => SwizzleSource::Alpha,
            _ => return None,
        };
        self.0.iter().position(|&s| s == wanted)
    }
}

/// Everything a backend needs to allocate and fill a texture for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatTriple {
    pub internal_format: InternalFormat,
    pub pixel_format: PixelFormat,
    pub data_type: DataType,
    pub swizzle: Swizzle,
}

impl FormatTriple {
    pub fn for_format(format: &ImageFormat) -> Self {
        use ComponentLayout as L;
        use ComponentType as T;

        let (internal_format, pixel_format, swizzle) = match (format.component_type(), format.layout()) {
            (T::Integer8, L::G) => (InternalFormat::R8, PixelFormat::Red, Swizzle::GREY),
            (T::Integer8, L::Ga) => (InternalFormat::Rg8, PixelFormat::Rg, Swizzle::GREY_ALPHA),
            (T::Integer8, L::Rgb) => (InternalFormat::Rgb8, PixelFormat::Rgb, Swizzle::IDENTITY),
            (T::Integer8, L::Rgba) => (InternalFormat::Rgba8, PixelFormat::Rgba, Swizzle::IDENTITY),
            (T::Float32, L::G) => (InternalFormat::R32F, PixelFormat::Red, Swizzle::GREY),
            (T::Float32, L::Ga) => (InternalFormat::Rg32F, PixelFormat::Rg, Swizzle::GREY_ALPHA),
            (T::Float32, L::Rgb) => (InternalFormat::Rgb32F, PixelFormat::Rgb, Swizzle::IDENTITY),
            (T::Float32, L::Rgba) => (InternalFormat::Rgba32F, PixelFormat::Rgba, Swizzle::IDENTITY),
        };
        let data_type = match format.component_type() {
            T::Integer8 => DataType::UnsignedByte,
            T::Float32 => DataType::Float,
        };
        Self {
            internal_format,
            pixel_format,
            data_type,
            swizzle,
        }
    }

    /// Bytes per submitted pixel; always equals the image's bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_format.component_count() * self.data_type.size()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
    LinearMipmapLinear,
}

/// Sampler state attached to uploaded textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
    pub min_filter: Filter,
    pub mag_filter: Filter,
}

impl SamplerParams {
    /// Repeat wrap; trilinear minification when mip levels exist.
    pub fn for_mipmaps(mipmaps: bool) -> Self {
        Self {
            wrap_s: Wrap::Repeat,
            wrap_t: Wrap::Repeat,
            min_filter: if mipmaps { Filter::LinearMipmapLinear } else { Filter::Linear },
            mag_filter: Filter::Linear,
        }
    }
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self::for_mipmaps(true)
    }
}
