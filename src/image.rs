// ============================================================================
// HOST IMAGE — format + pixel buffer, the mutable core data type
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{ImageError, Result};
use crate::format::{
    AlphaMode, ComponentLayout, ComponentType, ImageFormat, f32_to_u8, u8_to_f32,
};

/// Largest image we agree to allocate (256 megapixels).
const MAX_PIXELS: u64 = 256_000_000;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)
}

// ---- component codec -------------------------------------------------------

/// Read one component starting at `bytes[0]` as a float-view value.
#[inline]
pub(crate) fn load_component(ty: ComponentType, bytes: &[u8]) -> f32 {
    match ty {
        ComponentType::Integer8 => u8_to_f32(bytes[0]),
        ComponentType::Float32 => bytemuck::pod_read_unaligned::<f32>(&bytes[..4]),
    }
}

/// Write one float-view component at `bytes[0]`.
#[inline]
pub(crate) fn store_component(ty: ComponentType, bytes: &mut [u8], value: f32) {
    match ty {
        ComponentType::Integer8 => bytes[0] = f32_to_u8(value),
        ComponentType::Float32 => bytes[..4].copy_from_slice(bytemuck::bytes_of(&value)),
    }
}

/// Decode a whole pixel into `dst[..component_count]`.
#[inline]
pub(crate) fn load_pixel(format: &ImageFormat, bytes: &[u8], dst: &mut [f32]) {
    let size = format.component_size();
    let ty = format.component_type();
    for (c, out) in dst.iter_mut().take(format.component_count()).enumerate() {
        *out = load_component(ty, &bytes[c * size..]);
    }
}

/// Encode `src[..component_count]` into a whole pixel.
#[inline]
pub(crate) fn store_pixel(format: &ImageFormat, bytes: &mut [u8], src: &[f32]) {
    let size = format.component_size();
    let ty = format.component_type();
    for (c, &v) in src.iter().take(format.component_count()).enumerate() {
        store_component(ty, &mut bytes[c * size..], v);
    }
}

// ============================================================================
// HOST IMAGE
// ============================================================================

/// An image held in host memory: fixed dimensions, one [`ImageFormat`], one
/// [`PixelBuffer`] laid out row-major, top row first.
///
/// Every mutating call bumps [`HostImage::generation`]; GPU texture bindings
/// compare against it to decide whether they are stale.
pub struct HostImage {
    width: u32,
    height: u32,
    format: ImageFormat,
    pixels: PixelBuffer,
    id: u64,
    generation: u64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    width: u32,
    height: u32,
    format: ImageFormat,
    pixels: Vec<u8>,
}

impl HostImage {
    // ---- construction -------------------------------------------------------

    /// Zero-filled image.
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Result<Self> {
        let len = Self::buffer_len(width, height, &format)?;
        Ok(Self::with_buffer(width, height, format, PixelBuffer::zeroed(len)))
    }

    /// Adopt caller-supplied pixel bytes. Surplus bytes are truncated.
    pub fn from_pixels(width: u32, height: u32, format: ImageFormat, mut pixels: Vec<u8>) -> Result<Self> {
        let len = Self::buffer_len(width, height, &format)?;
        if pixels.len() < len {
            return Err(ImageError::BufferSize {
                expected: len,
                actual: pixels.len(),
            });
        }
        pixels.truncate(len);
        Ok(Self::with_buffer(width, height, format, PixelBuffer::from_vec(pixels)))
    }

    /// 1×1 fully transparent RGBA8 pixel, the "no texture" placeholder.
    pub fn transparent_1x1() -> Self {
        Self::with_buffer(1, 1, ImageFormat::RGBA8, PixelBuffer::zeroed(4))
    }

    fn with_buffer(width: u32, height: u32, format: ImageFormat, pixels: PixelBuffer) -> Self {
        Self {
            width,
            height,
            format,
            pixels,
            id: next_id(),
            generation: 0,
        }
    }

    fn buffer_len(width: u32, height: u32, format: &ImageFormat) -> Result<usize> {
        let total = width as u64 * height as u64;
        if width == 0 || height == 0 || total > MAX_PIXELS {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        Ok(total as usize * format.bytes_per_pixel())
    }

    /// New zero-filled image with the same dimensions and format.
    pub fn allocate(&self) -> HostImage {
        Self::with_buffer(
            self.width,
            self.height,
            self.format,
            PixelBuffer::zeroed(self.pixels.len()),
        )
    }

    /// New zero-filled image with the same format and the given dimensions.
    pub fn allocate_with(&self, width: u32, height: u32) -> Result<HostImage> {
        Self::new(width, height, self.format)
    }

    /// Zero-filled image with the same dimensions in another format.
    pub(crate) fn allocate_like(&self, format: ImageFormat) -> HostImage {
        let len = self.width as usize * self.height as usize * format.bytes_per_pixel();
        Self::with_buffer(self.width, self.height, format, PixelBuffer::zeroed(len))
    }

    /// Deep copy; the result never observes later writes to `self`.
    pub fn copy(&self) -> HostImage {
        Self::with_buffer(self.width, self.height, self.format, self.pixels.deep_copy())
    }

    /// Cheap copy that shares storage until either side writes.
    pub fn share(&self) -> HostImage {
        Self::with_buffer(self.width, self.height, self.format, self.pixels.share())
    }

    // ---- metadata -----------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn component_type(&self) -> ComponentType {
        self.format.component_type()
    }

    pub fn layout(&self) -> ComponentLayout {
        self.format.layout()
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.format.alpha_mode()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Bytes per row (`width * bytes_per_pixel`, rows are tightly packed).
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Process-unique identity; copies and shares get a fresh one.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mutation counter. Bumped by every write through this image.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record an out-of-band write (e.g. through [`HostImage::pixels_mut`]).
    #[inline]
    pub fn mark_modified(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    // ---- raw storage --------------------------------------------------------

    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_slice()
    }

    /// Mutable raw bytes. Counts as a mutation.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.mark_modified();
        self.pixels.as_mut_slice()
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Mutable storage without bumping the generation; callers mark afterwards.
    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        self.pixels.as_mut_slice()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &self.pixels.as_slice()[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        self.mark_modified();
        let stride = self.row_stride();
        let start = y as usize * stride;
        &mut self.pixels.as_mut_slice()[start..start + stride]
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels.into_vec()
    }

    // ---- bulk operations ----------------------------------------------------

    /// Zero-fill the buffer in place.
    pub fn clear(&mut self) {
        self.pixels.clear();
        self.mark_modified();
    }

    /// Set every pixel to `color` (float view, `component_count` entries).
    pub fn fill_f32(&mut self, color: &[f32]) {
        let bpp = self.bytes_per_pixel();
        let stride = self.row_stride();
        let format = self.format;
        let data = self.raw_mut();
        let mut encoded = [0u8; 16];
        store_pixel(&format, &mut encoded[..bpp], color);
        for px in data[..stride].chunks_exact_mut(bpp) {
            px.copy_from_slice(&encoded[..bpp]);
        }
        let (first, rest) = data.split_at_mut(stride);
        for row in rest.chunks_exact_mut(stride) {
            row.copy_from_slice(first);
        }
        self.mark_modified();
    }

    // ---- indexing helpers ----------------------------------------------------

    #[inline(always)]
    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} image",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }

    fn check_index(&self, x: u32, y: u32, component: usize) -> Result<()> {
        if x >= self.width || y >= self.height || component >= self.format.component_count() {
            return Err(ImageError::Index {
                x,
                y,
                component,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    // ---- pixel access: byte view ------------------------------------------

    /// Copy pixel `(x, y)` into `dst[..component_count]` as bytes.
    #[inline]
    pub fn pixel_bytes(&self, x: u32, y: u32, dst: &mut [u8]) {
        let n = self.format.component_count();
        match self.component_type() {
            ComponentType::Integer8 => {
                let o = self.offset(x, y);
                dst[..n].copy_from_slice(&self.pixels.as_slice()[o..o + n]);
            }
            ComponentType::Float32 => {
                for (c, out) in dst.iter_mut().take(n).enumerate() {
                    *out = self.component_u8(x, y, c);
                }
            }
        }
    }

    #[inline]
    pub fn set_pixel_bytes(&mut self, x: u32, y: u32, src: &[u8]) {
        let n = self.format.component_count();
        let o = self.offset(x, y);
        match self.component_type() {
            ComponentType::Integer8 => {
                self.raw_mut()[o..o + n].copy_from_slice(&src[..n]);
            }
            ComponentType::Float32 => {
                let data = self.raw_mut();
                for (c, &b) in src.iter().take(n).enumerate() {
                    store_component(ComponentType::Float32, &mut data[o + c * 4..], u8_to_f32(b));
                }
            }
        }
        self.mark_modified();
    }

    #[inline]
    pub fn component_u8(&self, x: u32, y: u32, component: usize) -> u8 {
        let o = self.offset(x, y) + component * self.format.component_size();
        match self.component_type() {
            ComponentType::Integer8 => self.pixels.as_slice()[o],
            ComponentType::Float32 => f32_to_u8(load_component(ComponentType::Float32, &self.pixels.as_slice()[o..])),
        }
    }

    #[inline]
    pub fn set_component_u8(&mut self, x: u32, y: u32, component: usize, value: u8) {
        let o = self.offset(x, y) + component * self.format.component_size();
        let ty = self.component_type();
        match ty {
            ComponentType::Integer8 => self.raw_mut()[o] = value,
            ComponentType::Float32 => store_component(ty, &mut self.raw_mut()[o..], u8_to_f32(value)),
        }
        self.mark_modified();
    }

    // ---- pixel access: float view -----------------------------------------

    /// Copy pixel `(x, y)` into `dst[..component_count]` as floats.
    #[inline]
    pub fn pixel_f32(&self, x: u32, y: u32, dst: &mut [f32]) {
        let o = self.offset(x, y);
        load_pixel(&self.format, &self.pixels.as_slice()[o..], dst);
    }

    #[inline]
    pub fn set_pixel_f32(&mut self, x: u32, y: u32, src: &[f32]) {
        let o = self.offset(x, y);
        let format = self.format;
        store_pixel(&format, &mut self.raw_mut()[o..], src);
        self.mark_modified();
    }

    #[inline]
    pub fn component_f32(&self, x: u32, y: u32, component: usize) -> f32 {
        let o = self.offset(x, y) + component * self.format.component_size();
        load_component(self.component_type(), &self.pixels.as_slice()[o..])
    }

    #[inline]
    pub fn set_component_f32(&mut self, x: u32, y: u32, component: usize, value: f32) {
        let o = self.offset(x, y) + component * self.format.component_size();
        let ty = self.component_type();
        store_component(ty, &mut self.raw_mut()[o..], value);
        self.mark_modified();
    }

    // ---- checked access -----------------------------------------------------

    pub fn checked_component_f32(&self, x: u32, y: u32, component: usize) -> Result<f32> {
        self.check_index(x, y, component)?;
        Ok(self.component_f32(x, y, component))
    }

    pub fn checked_set_component_f32(&mut self, x: u32, y: u32, component: usize, value: f32) -> Result<()> {
        self.check_index(x, y, component)?;
        self.set_component_f32(x, y, component, value);
        Ok(())
    }

    pub fn checked_component_u8(&self, x: u32, y: u32, component: usize) -> Result<u8> {
        self.check_index(x, y, component)?;
        Ok(self.component_u8(x, y, component))
    }

    pub fn checked_set_component_u8(&mut self, x: u32, y: u32, component: usize, value: u8) -> Result<()> {
        self.check_index(x, y, component)?;
        self.set_component_u8(x, y, component, value);
        Ok(())
    }

    pub fn checked_pixel_f32(&self, x: u32, y: u32, dst: &mut [f32]) -> Result<()> {
        self.check_index(x, y, 0)?;
        self.pixel_f32(x, y, dst);
        Ok(())
    }

    pub fn checked_set_pixel_f32(&mut self, x: u32, y: u32, src: &[f32]) -> Result<()> {
        self.check_index(x, y, 0)?;
        self.set_pixel_f32(x, y, src);
        Ok(())
    }

    // ---- sub-image blit -----------------------------------------------------

    fn check_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<()> {
        let fits_x = x as u64 + width as u64 <= self.width as u64;
        let fits_y = y as u64 + height as u64 <= self.height as u64;
        if !fits_x || !fits_y {
            return Err(ImageError::Bounds {
                x,
                y,
                width,
                height,
                image_width: self.width,
                image_height: self.height,
            });
        }
        Ok(())
    }

    /// Copy the `width × height` rectangle at `(x, y)` into a new image of the
    /// same format, one contiguous range copy per row.
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Result<HostImage> {
        self.check_region(x, y, width, height)?;
        let mut dst = Self::new(width, height, self.format)?;
        let bpp = self.bytes_per_pixel();
        let src_stride = self.row_stride();
        let dst_stride = dst.row_stride();
        let x_off = x as usize * bpp;
        let src = self.pixels.as_slice();
        let out = dst.raw_mut();
        for row in 0..height as usize {
            let s = (y as usize + row) * src_stride + x_off;
            let d = row * dst_stride;
            out[d..d + dst_stride].copy_from_slice(&src[s..s + dst_stride]);
        }
        Ok(dst)
    }

    /// Write `image` at `(x, y)`, converting it to this image's format first.
    pub fn set_sub_image(&mut self, x: u32, y: u32, image: &HostImage) -> Result<()> {
        self.check_region(x, y, image.width, image.height)?;
        let src = image.convert(self.format);
        let bpp = self.bytes_per_pixel();
        let dst_stride = self.row_stride();
        let src_stride = src.row_stride();
        let x_off = x as usize * bpp;
        let src_bytes = src.pixels();
        let out = self.raw_mut();
        for row in 0..src.height as usize {
            let s = row * src_stride;
            let d = (y as usize + row) * dst_stride + x_off;
            out[d..d + src_stride].copy_from_slice(&src_bytes[s..s + src_stride]);
        }
        self.mark_modified();
        Ok(())
    }

    /// Copy the overlapping top-left region of `self` into `dst`.
    pub fn copy_into(&self, dst: &mut HostImage) {
        let w = self.width.min(dst.width);
        let h = self.height.min(dst.height);
        if self.format == dst.format {
            let len = w as usize * self.bytes_per_pixel();
            let src_stride = self.row_stride();
            let dst_stride = dst.row_stride();
            let src = self.pixels.as_slice();
            let out = dst.raw_mut();
            for row in 0..h as usize {
                out[row * dst_stride..row * dst_stride + len]
                    .copy_from_slice(&src[row * src_stride..row * src_stride + len]);
            }
            dst.mark_modified();
        } else {
            let mut px = [0f32; 4];
            for y in 0..h {
                for x in 0..w {
                    self.pixel_f32(x, y, &mut px);
                    crate::convert::convert_pixel_f32(
                        &self.format,
                        &dst.format,
                        &mut px,
                        &crate::convert::ConvertOptions::default(),
                    );
                    dst.set_pixel_f32(x, y, &px);
                }
            }
        }
    }

    // ---- sampling -----------------------------------------------------------

    /// Bilinearly interpolated component at normalised `(u, v)`, clamped to
    /// the image edge.
    pub fn sample_bilinear(&self, u: f64, v: f64, component: usize) -> f32 {
        let max_x = self.width - 1;
        let max_y = self.height - 1;

        let (x0, fx) = Self::split_coord(u, max_x);
        let (y0, fy) = Self::split_coord(v, max_y);
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);

        let c00 = self.component_f32(x0, y0, component) as f64;
        let c10 = self.component_f32(x1, y0, component) as f64;
        let c01 = self.component_f32(x0, y1, component) as f64;
        let c11 = self.component_f32(x1, y1, component) as f64;

        let top = c00 + (c10 - c00) * fx;
        let bottom = c01 + (c11 - c01) * fx;
        (top + (bottom - top) * fy) as f32
    }

    fn split_coord(t: f64, max: u32) -> (u32, f64) {
        if max == 0 {
            return (0, 0.0);
        }
        let pos = (t.clamp(0.0, 1.0)) * max as f64;
        let i = (pos.floor() as u32).min(max);
        (i, pos - i as f64)
    }

    /// Mean of the colour components at `(x, y)`.
    pub fn brightness(&self, x: u32, y: u32) -> f32 {
        let mut px = [0f32; 4];
        self.pixel_f32(x, y, &mut px);
        let n = self.layout().color_count();
        px[..n].iter().sum::<f32>() / n as f32
    }

    // ---- resize -------------------------------------------------------------

    /// Resize with the default scaler quality. Same size returns a copy.
    pub fn resize(&self, width: u32, height: u32) -> Result<HostImage> {
        if (width, height) == self.dimensions() {
            return Ok(self.copy());
        }
        crate::scaler::Scaler::default().scale(self, width, height)
    }

    // ---- snapshots ----------------------------------------------------------

    /// Encode dimensions, format and pixels for in-process transport.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            width: self.width,
            height: self.height,
            format: self.format,
            pixels: self.pixels.as_slice().to_vec(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<HostImage> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        Self::from_pixels(snapshot.width, snapshot.height, snapshot.format, snapshot.pixels)
    }
}

impl PartialEq for HostImage {
    /// Dimensions, format and raw bytes; identity and generation are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.pixels == other.pixels
    }
}

impl Eq for HostImage {}

impl Clone for HostImage {
    /// Same as [`HostImage::share`]: copy-on-write storage, fresh identity.
    fn clone(&self) -> Self {
        self.share()
    }
}

impl std::fmt::Debug for HostImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}
