// ============================================================================
// IMAGE FORMAT — component type × layout × alpha convention
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ImageError, Result};

/// Numeric storage kind of a single component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// 8-bit unsigned integer, `0..=255` maps to `0.0..=1.0`.
    Integer8,
    /// 32-bit IEEE float, native byte order.
    Float32,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub const fn size(self) -> usize {
        match self {
            ComponentType::Integer8 => 1,
            ComponentType::Float32 => 4,
        }
    }

    pub fn all() -> &'static [ComponentType] {
        &[ComponentType::Integer8, ComponentType::Float32]
    }
}

/// Set and order of components per pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentLayout {
    G,
    Ga,
    Rgb,
    Rgba,
}

impl ComponentLayout {
    pub const fn component_count(self) -> usize {
        match self {
            ComponentLayout::G => 1,
            ComponentLayout::Ga => 2,
            ComponentLayout::Rgb => 3,
            ComponentLayout::Rgba => 4,
        }
    }

    /// Layout for a component count in `1..=4`.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(ComponentLayout::G),
            2 => Ok(ComponentLayout::Ga),
            3 => Ok(ComponentLayout::Rgb),
            4 => Ok(ComponentLayout::Rgba),
            n => Err(ImageError::component_count(n)),
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, ComponentLayout::Ga | ComponentLayout::Rgba)
    }

    /// Index of the alpha component, if any.
    pub const fn alpha_index(self) -> Option<usize> {
        match self {
            ComponentLayout::Ga => Some(1),
            ComponentLayout::Rgba => Some(3),
            _ => None,
        }
    }

    /// Number of colour (non-alpha) components.
    pub const fn color_count(self) -> usize {
        match self {
            ComponentLayout::G | ComponentLayout::Ga => 1,
            ComponentLayout::Rgb | ComponentLayout::Rgba => 3,
        }
    }

    pub fn all() -> &'static [ComponentLayout] {
        &[
            ComponentLayout::G,
            ComponentLayout::Ga,
            ComponentLayout::Rgb,
            ComponentLayout::Rgba,
        ]
    }
}

/// Whether colour components are stored already multiplied by alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    PostMultiplied,
    PreMultiplied,
}

impl AlphaMode {
    pub fn all() -> &'static [AlphaMode] {
        &[AlphaMode::PostMultiplied, AlphaMode::PreMultiplied]
    }
}

/// Immutable pixel format descriptor. Equality is structural.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageFormat {
    component_type: ComponentType,
    layout: ComponentLayout,
    alpha: AlphaMode,
}

impl ImageFormat {
    pub const RGBA8: ImageFormat = ImageFormat::new(
        ComponentType::Integer8,
        ComponentLayout::Rgba,
        AlphaMode::PostMultiplied,
    );
    pub const RGB8: ImageFormat = ImageFormat::new(
        ComponentType::Integer8,
        ComponentLayout::Rgb,
        AlphaMode::PostMultiplied,
    );
    pub const GREY8: ImageFormat = ImageFormat::new(
        ComponentType::Integer8,
        ComponentLayout::G,
        AlphaMode::PostMultiplied,
    );
    pub const RGBA32F: ImageFormat = ImageFormat::new(
        ComponentType::Float32,
        ComponentLayout::Rgba,
        AlphaMode::PostMultiplied,
    );

    pub const fn new(component_type: ComponentType, layout: ComponentLayout, alpha: AlphaMode) -> Self {
        Self {
            component_type,
            layout,
            alpha,
        }
    }

    /// Build a format from a raw component count, rejecting counts outside `1..=4`.
    pub fn from_count(component_type: ComponentType, count: usize, alpha: AlphaMode) -> Result<Self> {
        Ok(Self::new(component_type, ComponentLayout::from_count(count)?, alpha))
    }

    pub const fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub const fn layout(&self) -> ComponentLayout {
        self.layout
    }

    pub const fn alpha_mode(&self) -> AlphaMode {
        self.alpha
    }

    pub const fn component_count(&self) -> usize {
        self.layout.component_count()
    }

    pub const fn component_size(&self) -> usize {
        self.component_type.size()
    }

    /// `component_count × component_size`.
    pub const fn bytes_per_pixel(&self) -> usize {
        self.component_count() * self.component_size()
    }

    pub fn with_component_type(self, component_type: ComponentType) -> Self {
        Self { component_type, ..self }
    }

    pub fn with_layout(self, layout: ComponentLayout) -> Self {
        Self { layout, ..self }
    }

    pub fn with_alpha_mode(self, alpha: AlphaMode) -> Self {
        Self { alpha, ..self }
    }

    /// Every format in the closed conversion matrix.
    pub fn all() -> impl Iterator<Item = ImageFormat> {
        ComponentType::all().iter().flat_map(|&t| {
            ComponentLayout::all().iter().flat_map(move |&l| {
                AlphaMode::all().iter().map(move |&a| ImageFormat::new(t, l, a))
            })
        })
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::RGBA8
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layout = match self.layout {
            ComponentLayout::G => "G",
            ComponentLayout::Ga => "GA",
            ComponentLayout::Rgb => "RGB",
            ComponentLayout::Rgba => "RGBA",
        };
        let ty = match self.component_type {
            ComponentType::Integer8 => "8",
            ComponentType::Float32 => "32F",
        };
        let alpha = match self.alpha {
            AlphaMode::PostMultiplied => "",
            AlphaMode::PreMultiplied => " (premultiplied)",
        };
        write!(f, "{layout}{ty}{alpha}")
    }
}

// ============================================================================
// COMPONENT SCALING — byte view <-> float view
// ============================================================================

/// `byte = clamp(round(value * 255))`. NaN maps to 0.
#[inline]
pub fn f32_to_u8(value: f32) -> u8 {
    // `as` saturates and sends NaN to 0.
    (value * 255.0).round() as u8
}

#[inline]
pub fn u8_to_f32(value: u8) -> f32 {
    value as f32 / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel_follows_type_and_layout() {
        for format in ImageFormat::all() {
            assert_eq!(
                format.bytes_per_pixel(),
                format.component_count() * format.component_type().size()
            );
        }
        assert_eq!(ImageFormat::RGBA8.bytes_per_pixel(), 4);
        assert_eq!(ImageFormat::RGBA32F.bytes_per_pixel(), 16);
        assert_eq!(ImageFormat::GREY8.bytes_per_pixel(), 1);
    }

    #[test]
    fn format_matrix_has_sixteen_entries() {
        assert_eq!(ImageFormat::all().count(), 16);
    }

    #[test]
    fn component_count_outside_range_is_rejected() {
        assert!(ComponentLayout::from_count(0).is_err());
        assert!(ComponentLayout::from_count(5).is_err());
        assert_eq!(ComponentLayout::from_count(2).unwrap(), ComponentLayout::Ga);
    }

    #[test]
    fn byte_float_scaling_clamps_and_rounds() {
        assert_eq!(f32_to_u8(1.0), 255);
        assert_eq!(f32_to_u8(2.0), 255);
        assert_eq!(f32_to_u8(-1.0), 0);
        assert_eq!(f32_to_u8(f32::NAN), 0);
        assert_eq!(f32_to_u8(0.5), 128);
        for b in 0..=255u8 {
            assert_eq!(f32_to_u8(u8_to_f32(b)), b);
        }
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(ImageFormat::RGBA8.to_string(), "RGBA8");
        let f = ImageFormat::new(ComponentType::Float32, ComponentLayout::Ga, AlphaMode::PreMultiplied);
        assert_eq!(f.to_string(), "GA32F (premultiplied)");
    }
}
