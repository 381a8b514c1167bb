use std::io::{Cursor, Write};

use image::{ImageEncoder, ImageFormat};

use crate::foundation::core::{Point, Rect, Rgba8};
use crate::foundation::error::{VedError, VedResult};

/// A frame read back from a [`RenderSurface`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Straight-alpha RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn solid(width: u32, height: u32, color: Rgba8) -> Self {
        let px = color.to_array();
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&px);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(i..i + 4)?;
        Some(Rgba8::new(px[0], px[1], px[2], px[3]))
    }

    /// Append the PNG encoding of this frame to `out`.
    ///
    /// Uses fast compression: frames are re-encoded by the muxer anyway.
    pub fn encode_png_into(&self, out: &mut Vec<u8>) -> VedResult<()> {
        let encoder = image::codecs::png::PngEncoder::new_with_quality(
            out,
            image::codecs::png::CompressionType::Fast,
            image::codecs::png::FilterType::Adaptive,
        );
        encoder.write_image(
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }

    /// Encode this frame in `format` and write it to `w`.
    pub fn write_image(&self, w: &mut dyn Write, format: ImageFormat) -> VedResult<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| VedError::render("frame data does not match width*height*4"))?;
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)?;
        w.write_all(&buf)?;
        Ok(())
    }
}

/// Offscreen drawing target shared by every video-capable layer of a timeline.
///
/// Callers bind the surface before clearing or reading it back; implementations backed by a
/// context-switching API make their context current in [`RenderSurface::bind`].
pub trait RenderSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Make this surface the current drawing target.
    fn bind(&mut self) -> VedResult<()>;

    /// Overwrite every pixel with `color`.
    fn clear(&mut self, color: Rgba8) -> VedResult<()>;

    /// Composite a solid rectangle (source-over).
    fn fill_rect(&mut self, rect: Rect, color: Rgba8) -> VedResult<()>;

    /// Composite a straight-alpha RGBA8 image with its top-left corner at `origin`.
    fn draw_rgba(&mut self, origin: Point, width: u32, height: u32, data: &[u8])
    -> VedResult<()>;

    /// Copy out the current color buffer.
    fn read_back(&mut self) -> VedResult<FrameRGBA>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_has_exact_size_and_color() {
        let f = FrameRGBA::solid(3, 2, Rgba8::new(1, 2, 3, 4));
        assert_eq!(f.data.len(), 3 * 2 * 4);
        assert_eq!(f.pixel(2, 1), Some(Rgba8::new(1, 2, 3, 4)));
        assert_eq!(f.pixel(3, 0), None);
    }

    #[test]
    fn png_encoding_decodes_back_to_same_pixels() {
        let f = FrameRGBA::solid(2, 2, Rgba8::new(255, 0, 255, 255));
        let mut buf = Vec::new();
        f.encode_png_into(&mut buf).unwrap();
        let img = image::load_from_memory(&buf).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.into_raw(), f.data);
    }

    #[test]
    fn write_image_rejects_short_buffer() {
        let f = FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 4],
        };
        let mut out = Vec::new();
        assert!(f.write_image(&mut out, ImageFormat::Png).is_err());
    }
}
