use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::core::{Point, Rect, Rgba8};
use crate::foundation::error::VedResult;
use crate::layer::{Content, VideoContent};
use crate::render::surface::RenderSurface;

/// A solid color rectangle. `rect: None` covers the whole surface.
#[derive(Clone, Debug)]
pub struct Solid {
    pub rect: Option<Rect>,
    pub color: Rgba8,
}

impl Solid {
    pub fn new(rect: Rect, color: Rgba8) -> Self {
        Self {
            rect: Some(rect),
            color,
        }
    }

    pub fn full(color: Rgba8) -> Self {
        Self { rect: None, color }
    }
}

impl VideoContent for Solid {
    fn render(&mut self, _t: f64, surface: &mut dyn RenderSurface) -> VedResult<()> {
        let rect = self.rect.unwrap_or_else(|| {
            Rect::new(
                0.0,
                0.0,
                f64::from(surface.width()),
                f64::from(surface.height()),
            )
        });
        surface.fill_rect(rect, self.color)
    }
}

impl Content for Solid {
    fn video(&mut self) -> Option<&mut dyn VideoContent> {
        Some(self)
    }
}

/// A still image decoded once at construction.
#[derive(Clone, Debug)]
pub struct Picture {
    pub origin: Point,
    width: u32,
    height: u32,
    /// Straight-alpha RGBA8, row-major, tightly packed.
    rgba8: Arc<Vec<u8>>,
}

impl Picture {
    pub fn from_rgba8(origin: Point, width: u32, height: u32, rgba8: Vec<u8>) -> Self {
        Self {
            origin,
            width,
            height,
            rgba8: Arc::new(rgba8),
        }
    }

    pub fn decode(bytes: &[u8], origin: Point) -> VedResult<Self> {
        let rgba = image::load_from_memory(bytes)
            .context("decode image from memory")?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::from_rgba8(origin, width, height, rgba.into_raw()))
    }

    pub fn open(path: &Path, origin: Point) -> VedResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image '{}'", path.display()))?;
        Self::decode(&bytes, origin)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl VideoContent for Picture {
    fn render(&mut self, _t: f64, surface: &mut dyn RenderSurface) -> VedResult<()> {
        surface.draw_rgba(self.origin, self.width, self.height, &self.rgba8)
    }
}

impl Content for Picture {
    fn video(&mut self) -> Option<&mut dyn VideoContent> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::foundation::core::Canvas;
    use crate::render::cpu::CpuSurface;

    fn bound_surface(w: u32, h: u32) -> CpuSurface {
        let mut s = CpuSurface::new(Canvas::new(w, h).unwrap());
        s.bind().unwrap();
        s.clear(Rgba8::BLACK).unwrap();
        s
    }

    #[test]
    fn full_solid_covers_surface() {
        let mut s = bound_surface(3, 2);
        Solid::full(Rgba8::new(0, 255, 0, 255))
            .render(0.0, &mut s)
            .unwrap();
        let f = s.read_back().unwrap();
        assert!(f.data.chunks_exact(4).all(|px| px == [0, 255, 0, 255]));
    }

    #[test]
    fn picture_decodes_png_and_draws_at_origin() {
        let img = image::RgbaImage::from_raw(1, 1, vec![10, 20, 30, 255]).unwrap();
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let mut pic = Picture::decode(&png, Point::new(1.0, 0.0)).unwrap();
        assert_eq!(pic.dimensions(), (1, 1));

        let mut s = bound_surface(2, 1);
        pic.render(0.0, &mut s).unwrap();
        let f = s.read_back().unwrap();
        assert_eq!(f.pixel(0, 0), Some(Rgba8::BLACK));
        assert_eq!(f.pixel(1, 0), Some(Rgba8::new(10, 20, 30, 255)));
    }

    #[test]
    fn picture_rejects_garbage() {
        assert!(Picture::decode(b"not an image", Point::ZERO).is_err());
    }
}
