use crate::foundation::core::{Canvas, Point, Rect, Rgba8};
use crate::foundation::error::{VedError, VedResult};
use crate::render::surface::{FrameRGBA, RenderSurface};

/// In-memory RGBA8 surface. The default surface of a [`crate::Timeline`].
#[derive(Clone, Debug)]
pub struct CpuSurface {
    canvas: Canvas,
    data: Vec<u8>,
    bound: bool,
    binds: u64,
}

impl CpuSurface {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            data: vec![0u8; canvas.pixel_count() * 4],
            canvas,
            bound: false,
            binds: 0,
        }
    }

    /// Number of times [`RenderSurface::bind`] was called.
    pub fn bind_count(&self) -> u64 {
        self.binds
    }

    fn ensure_bound(&self) -> VedResult<()> {
        if !self.bound {
            return Err(VedError::render("surface used before bind"));
        }
        Ok(())
    }

    /// Integer pixel span `[lo, hi)` covered by `[a, b)`, clipped to `[0, limit)`.
    fn span(a: f64, b: f64, limit: u32) -> (usize, usize) {
        let lo = a.round().clamp(0.0, f64::from(limit)) as usize;
        let hi = b.round().clamp(0.0, f64::from(limit)) as usize;
        (lo, hi.max(lo))
    }

    fn blend_at(&mut self, idx: usize, src: [u8; 4]) {
        let dst = &mut self.data[idx..idx + 4];
        let sa = u32::from(src[3]);
        if sa == 255 {
            dst.copy_from_slice(&src);
            return;
        }
        if sa == 0 {
            return;
        }
        let da = u32::from(dst[3]);
        let inv = 255 - sa;
        // out_a = sa + da * (1 - sa), all in 0..=255 fixed point.
        let out_a = sa * 255 + da * inv;
        if out_a == 0 {
            dst.copy_from_slice(&[0, 0, 0, 0]);
            return;
        }
        for c in 0..3 {
            let sc = u32::from(src[c]);
            let dc = u32::from(dst[c]);
            let num = sc * sa * 255 + dc * da * inv;
            dst[c] = ((num + out_a / 2) / out_a).min(255) as u8;
        }
        dst[3] = ((out_a + 127) / 255).min(255) as u8;
    }
}

impl RenderSurface for CpuSurface {
    fn width(&self) -> u32 {
        self.canvas.width
    }

    fn height(&self) -> u32 {
        self.canvas.height
    }

    fn bind(&mut self) -> VedResult<()> {
        self.bound = true;
        self.binds += 1;
        Ok(())
    }

    fn clear(&mut self, color: Rgba8) -> VedResult<()> {
        self.ensure_bound()?;
        let px = color.to_array();
        for d in self.data.chunks_exact_mut(4) {
            d.copy_from_slice(&px);
        }
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8) -> VedResult<()> {
        self.ensure_bound()?;
        let rect = rect.abs();
        let (x0, x1) = Self::span(rect.x0, rect.x1, self.canvas.width);
        let (y0, y1) = Self::span(rect.y0, rect.y1, self.canvas.height);
        let stride = self.canvas.width as usize * 4;
        let px = color.to_array();
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_at(y * stride + x * 4, px);
            }
        }
        Ok(())
    }

    fn draw_rgba(
        &mut self,
        origin: Point,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> VedResult<()> {
        self.ensure_bound()?;
        if data.len() != width as usize * height as usize * 4 {
            return Err(VedError::render(format!(
                "image data is {} bytes, expected {}x{}x4",
                data.len(),
                width,
                height
            )));
        }
        // origins past these bounds are fully clipped
        let ox = origin
            .x
            .round()
            .clamp(-f64::from(width), f64::from(self.canvas.width)) as i64;
        let oy = origin
            .y
            .round()
            .clamp(-f64::from(height), f64::from(self.canvas.height)) as i64;
        let stride = self.canvas.width as usize * 4;
        for sy in 0..i64::from(height) {
            let dy = oy + sy;
            if dy < 0 || dy >= i64::from(self.canvas.height) {
                continue;
            }
            for sx in 0..i64::from(width) {
                let dx = ox + sx;
                if dx < 0 || dx >= i64::from(self.canvas.width) {
                    continue;
                }
                let si = ((sy * i64::from(width) + sx) * 4) as usize;
                let src = [data[si], data[si + 1], data[si + 2], data[si + 3]];
                self.blend_at(dy as usize * stride + dx as usize * 4, src);
            }
        }
        Ok(())
    }

    fn read_back(&mut self) -> VedResult<FrameRGBA> {
        self.ensure_bound()?;
        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: self.data.clone(),
        })
    }
}
