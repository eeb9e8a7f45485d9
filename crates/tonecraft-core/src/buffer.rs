//! Pixel buffers and views.
//!
//! Samples are interleaved, rows may be padded, and multi-byte samples are
//! stored in native endianness. Rows of a strided buffer need not be aligned,
//! so samples are read and written through `bytemuck` unaligned copies.

use bytemuck::Pod;
use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::try_alloc;
use crate::{CurveError, CurveResult};

/// Storage type of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    U16,
    F32,
}

impl SampleFormat {
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16 => 2,
            SampleFormat::F32 => 4,
        }
    }

    /// Largest representable value for integer formats; 1.0 for float.
    #[inline]
    pub fn max_value(self) -> f32 {
        match self {
            SampleFormat::U8 => 255.0,
            SampleFormat::U16 => 65535.0,
            SampleFormat::F32 => 1.0,
        }
    }

    /// Decode the host's pixel format code into a format and channel count.
    ///
    /// 0 = RGB8, 1 = RGBA8, 2 = RGB16, 3 = RGBA16, 4 = RGB32F, 5 = RGBA32F.
    pub fn from_host_code(code: i32) -> CurveResult<(SampleFormat, u32)> {
        match code {
            0 => Ok((SampleFormat::U8, 3)),
            1 => Ok((SampleFormat::U8, 4)),
            2 => Ok((SampleFormat::U16, 3)),
            3 => Ok((SampleFormat::U16, 4)),
            4 => Ok((SampleFormat::F32, 3)),
            5 => Ok((SampleFormat::F32, 4)),
            other => Err(CurveError::InvalidParams(format!(
                "unknown pixel format code {}",
                other
            ))),
        }
    }
}

/// Shape and layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
    /// Interleaved channels per pixel (1 to 4).
    pub channels: u32,
    pub format: SampleFormat,
    /// Bytes from the start of one row to the start of the next.
    pub row_stride: usize,
}

impl ImageGeometry {
    /// Geometry with no row padding.
    pub fn packed(width: u32, height: u32, channels: u32, format: SampleFormat) -> Self {
        let row_stride = width as usize * channels as usize * format.bytes_per_sample();
        Self {
            width,
            height,
            channels,
            format,
            row_stride,
        }
    }

    /// Same geometry with a different row stride.
    pub fn with_stride(mut self, row_stride: usize) -> Self {
        self.row_stride = row_stride;
        self
    }

    /// Bytes of pixel data in one row, excluding padding.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels as usize * self.format.bytes_per_sample()
    }

    /// Minimum data length: full strides for every row but the last.
    pub fn required_len(&self) -> CurveResult<usize> {
        let overflow = || CurveError::InvalidParams("image dimensions overflow".to_string());
        let row_bytes = (self.width as usize)
            .checked_mul(self.channels as usize)
            .and_then(|n| n.checked_mul(self.format.bytes_per_sample()))
            .ok_or_else(overflow)?;
        (self.height as usize)
            .saturating_sub(1)
            .checked_mul(self.row_stride)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or_else(overflow)
    }

    /// Check dimensions, channel count and stride.
    pub fn validate(&self) -> CurveResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CurveError::InvalidParams(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=4).contains(&self.channels) {
            return Err(CurveError::InvalidParams(format!(
                "channel count must be 1 to 4, got {}",
                self.channels
            )));
        }
        // Also rejects overflow before the stride comparison
        self.required_len()?;
        if self.row_stride < self.row_bytes() {
            return Err(CurveError::InvalidParams(format!(
                "row stride {} smaller than row size {}",
                self.row_stride,
                self.row_bytes()
            )));
        }
        Ok(())
    }

    /// Width, height and channel count match. Format and stride may differ.
    pub fn same_shape(&self, other: &ImageGeometry) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }
}

fn check_data(data_len: usize, geometry: &ImageGeometry) -> CurveResult<()> {
    geometry.validate()?;
    let required = geometry.required_len()?;
    if data_len < required {
        return Err(CurveError::InvalidParams(format!(
            "buffer holds {} bytes, geometry needs {}",
            data_len, required
        )));
    }
    Ok(())
}

/// Read-only, non-owning view of pixel data.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    data: &'a [u8],
    geometry: ImageGeometry,
}

impl<'a> PixelView<'a> {
    /// Wrap caller-owned data.
    ///
    /// # Errors
    /// `InvalidParams` if the geometry is malformed or `data` is too short.
    pub fn new(data: &'a [u8], geometry: ImageGeometry) -> CurveResult<Self> {
        check_data(data.len(), &geometry)?;
        Ok(Self { data, geometry })
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Pixel bytes of row `y`, without padding.
    #[inline]
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.geometry.row_stride;
        &self.data[start..start + self.geometry.row_bytes()]
    }

    /// Normalized value of one sample.
    pub fn sample(&self, x: u32, y: u32, channel: u32) -> Option<f32> {
        let g = &self.geometry;
        if x >= g.width || y >= g.height || channel >= g.channels {
            return None;
        }
        let index = (x * g.channels + channel) as usize;
        Some(read_sample(g.format, self.row(y), index))
    }
}

/// Writable, non-owning view of pixel data.
#[derive(Debug)]
pub struct PixelViewMut<'a> {
    data: &'a mut [u8],
    geometry: ImageGeometry,
}

impl<'a> PixelViewMut<'a> {
    /// Wrap caller-owned data.
    ///
    /// # Errors
    /// `InvalidParams` if the geometry is malformed or `data` is too short.
    pub fn new(data: &'a mut [u8], geometry: ImageGeometry) -> CurveResult<Self> {
        check_data(data.len(), &geometry)?;
        Ok(Self { data, geometry })
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Pixel bytes of row `y`, without padding.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.geometry.row_stride;
        let len = self.geometry.row_bytes();
        &mut self.data[start..start + len]
    }

    /// Data up to the end of the last row, for splitting into row bands.
    pub(crate) fn rows_data_mut(&mut self) -> &mut [u8] {
        // Validated at construction
        let len = self.geometry.required_len().unwrap_or(0);
        &mut self.data[..len]
    }
}

/// Owned pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    geometry: ImageGeometry,
}

impl PixelBuffer {
    /// Zero-filled packed buffer.
    pub fn new(width: u32, height: u32, channels: u32, format: SampleFormat) -> CurveResult<Self> {
        let geometry = ImageGeometry::packed(width, height, channels, format);
        geometry.validate()?;
        let data = try_alloc::<u8>(geometry.required_len()?)?;
        Ok(Self { data, geometry })
    }

    /// Zero-filled buffer with the same shape and layout as `geometry`.
    pub fn with_geometry(geometry: ImageGeometry) -> CurveResult<Self> {
        geometry.validate()?;
        let data = try_alloc::<u8>(geometry.required_len()?)?;
        Ok(Self { data, geometry })
    }

    /// Take ownership of raw bytes.
    pub fn from_raw(data: Vec<u8>, geometry: ImageGeometry) -> CurveResult<Self> {
        check_data(data.len(), &geometry)?;
        Ok(Self { data, geometry })
    }

    /// Packed buffer from typed samples.
    pub fn from_samples<T: Pod>(
        width: u32,
        height: u32,
        channels: u32,
        format: SampleFormat,
        samples: &[T],
    ) -> CurveResult<Self> {
        if std::mem::size_of::<T>() != format.bytes_per_sample() {
            return Err(CurveError::UnsupportedFormat(format!(
                "{}-byte samples do not match {:?}",
                std::mem::size_of::<T>(),
                format
            )));
        }
        let geometry = ImageGeometry::packed(width, height, channels, format);
        Self::from_raw(bytemuck::cast_slice(samples).to_vec(), geometry)
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            data: &self.data,
            geometry: self.geometry,
        }
    }

    pub fn view_mut(&mut self) -> PixelViewMut<'_> {
        PixelViewMut {
            data: &mut self.data,
            geometry: self.geometry,
        }
    }

    /// Normalized value of one sample.
    pub fn sample(&self, x: u32, y: u32, channel: u32) -> Option<f32> {
        self.view().sample(x, y, channel)
    }

    /// Store a normalized value. Integer formats clamp and round.
    pub fn set_sample(&mut self, x: u32, y: u32, channel: u32, value: f32) -> CurveResult<()> {
        let g = self.geometry;
        if x >= g.width || y >= g.height || channel >= g.channels {
            return Err(CurveError::InvalidParams(format!(
                "sample ({}, {}, {}) outside {}x{}x{} image",
                x, y, channel, g.width, g.height, g.channels
            )));
        }
        let index = (x * g.channels + channel) as usize;
        let mut view = self.view_mut();
        write_sample(g.format, view.row_mut(y), index, value);
        Ok(())
    }

    /// Convert an 8-bit RGB buffer to an `image::RgbImage`.
    pub fn to_rgb_image(&self) -> CurveResult<RgbImage> {
        let g = &self.geometry;
        if g.format != SampleFormat::U8 || g.channels != 3 {
            return Err(CurveError::UnsupportedFormat(format!(
                "expected 8-bit RGB, got {:?} with {} channels",
                g.format, g.channels
            )));
        }
        let view = self.view();
        let mut pixels = try_alloc::<u8>(g.row_bytes() * g.height as usize)?;
        for (y, out) in pixels.chunks_exact_mut(g.row_bytes()).enumerate() {
            out.copy_from_slice(view.row(y as u32));
        }
        RgbImage::from_raw(g.width, g.height, pixels).ok_or_else(|| {
            CurveError::InvalidParams("pixel data does not match image size".to_string())
        })
    }
}

impl TryFrom<RgbImage> for PixelBuffer {
    type Error = CurveError;

    fn try_from(img: RgbImage) -> CurveResult<Self> {
        let (width, height) = img.dimensions();
        let geometry = ImageGeometry::packed(width, height, 3, SampleFormat::U8);
        Self::from_raw(img.into_raw(), geometry)
    }
}

impl TryFrom<RgbaImage> for PixelBuffer {
    type Error = CurveError;

    fn try_from(img: RgbaImage) -> CurveResult<Self> {
        let (width, height) = img.dimensions();
        let geometry = ImageGeometry::packed(width, height, 4, SampleFormat::U8);
        Self::from_raw(img.into_raw(), geometry)
    }
}

impl TryFrom<ImageBuffer<Rgb<u16>, Vec<u16>>> for PixelBuffer {
    type Error = CurveError;

    fn try_from(img: ImageBuffer<Rgb<u16>, Vec<u16>>) -> CurveResult<Self> {
        let (width, height) = img.dimensions();
        Self::from_samples(width, height, 3, SampleFormat::U16, img.as_raw().as_slice())
    }
}

impl TryFrom<Rgb32FImage> for PixelBuffer {
    type Error = CurveError;

    fn try_from(img: Rgb32FImage) -> CurveResult<Self> {
        let (width, height) = img.dimensions();
        Self::from_samples(width, height, 3, SampleFormat::F32, img.as_raw().as_slice())
    }
}

/// Read sample `index` of a row as a normalized value.
#[inline]
pub(crate) fn read_sample(format: SampleFormat, row: &[u8], index: usize) -> f32 {
    match format {
        SampleFormat::U8 => row[index] as f32 / format.max_value(),
        SampleFormat::U16 => {
            let o = index * 2;
            bytemuck::pod_read_unaligned::<u16>(&row[o..o + 2]) as f32 / format.max_value()
        }
        SampleFormat::F32 => {
            let o = index * 4;
            bytemuck::pod_read_unaligned::<f32>(&row[o..o + 4])
        }
    }
}

/// Write a normalized value to sample `index` of a row.
///
/// Integer formats clamp to [0, 1] and round to nearest; float stores as is.
#[inline]
pub(crate) fn write_sample(format: SampleFormat, row: &mut [u8], index: usize, value: f32) {
    match format {
        SampleFormat::U8 => {
            row[index] = (value.clamp(0.0, 1.0) * format.max_value()).round() as u8;
        }
        SampleFormat::U16 => {
            let v = (value.clamp(0.0, 1.0) * format.max_value()).round() as u16;
            let o = index * 2;
            row[o..o + 2].copy_from_slice(bytemuck::bytes_of(&v));
        }
        SampleFormat::F32 => {
            let o = index * 4;
            row[o..o + 4].copy_from_slice(bytemuck::bytes_of(&value));
        }
    }
}

/// Copy a sample between rows, converting format if needed.
#[inline]
pub(crate) fn copy_sample(
    src_format: SampleFormat,
    src: &[u8],
    dst_format: SampleFormat,
    dst: &mut [u8],
    index: usize,
) {
    if src_format == dst_format {
        let n = src_format.bytes_per_sample();
        let o = index * n;
        dst[o..o + n].copy_from_slice(&src[o..o + n]);
    } else {
        write_sample(dst_format, dst, index, read_sample(src_format, src, index));
    }
}
