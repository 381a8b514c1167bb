use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use image::ImageFormat;

use crate::driver::{AudioTick, Driver, TickKind, TickReport};
use crate::encode::ffmpeg::{Muxer, OutputTarget, ensure_parent_dir};
use crate::export::clock::SubTickClock;
use crate::export::schedule::{Capture, RecordOpts};
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{VedError, VedResult};
use crate::layer::{LayerId, LayerRef};
use crate::render::cpu::CpuSurface;
use crate::render::surface::{FrameRGBA, RenderSurface};
use crate::tracks::Tracks;

/// Process-unique identity of a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimelineId(pub(crate) u64);

impl TimelineId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a screenshot is written.
pub enum ScreenshotTarget<'a> {
    /// Image format is taken from the file extension.
    Path(&'a Path),
    Writer {
        writer: &'a mut dyn Write,
        format: ImageFormat,
    },
}

/// One layer's contribution to [`Timeline::sample`].
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSample {
    pub layer: LayerId,
    pub start_time: f64,
    pub values: Vec<f32>,
}

/// Summary of a finished [`Timeline::record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordStats {
    pub frames: usize,
    pub audio_streams: usize,
    pub samples: usize,
}

/// Canvas, background and placed layers sharing one clock.
///
/// Dropping the timeline detaches every layer and releases the surface.
pub struct Timeline {
    id: TimelineId,
    canvas: Canvas,
    background: Rgba8,
    current_time: f64,
    driver: Driver,
    tracks: Tracks,
    surface: Box<dyn RenderSurface>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("id", &self.id)
            .field("canvas", &self.canvas)
            .field("background", &self.background)
            .field("current_time", &self.current_time)
            .field("tracks", &self.tracks)
            .finish_non_exhaustive()
    }
}

impl Timeline {
    /// Timeline drawing onto an in-memory [`CpuSurface`].
    pub fn new(width: u32, height: u32, background: Rgba8) -> VedResult<Self> {
        let canvas = Canvas::new(width, height)?;
        Ok(Self::with_surface(
            background,
            Box::new(CpuSurface::new(canvas)),
        ))
    }

    /// Timeline drawing onto a caller-provided surface; the canvas is the surface's size.
    pub fn with_surface(background: Rgba8, surface: Box<dyn RenderSurface>) -> Self {
        let id = TimelineId::next();
        Self {
            id,
            canvas: Canvas {
                width: surface.width(),
                height: surface.height(),
            },
            background,
            current_time: 0.0,
            driver: Driver::new(),
            tracks: Tracks::new(id),
            surface,
        }
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn background(&self) -> Rgba8 {
        self.background
    }

    pub fn set_background(&mut self, background: Rgba8) {
        self.background = background;
    }

    /// Instant of the most recent tick.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut Tracks {
        &mut self.tracks
    }

    /// Place `layer` so that its local time zero lands at `offset` seconds.
    pub fn add_layer(&mut self, offset: f64, layer: impl Into<LayerRef>) -> VedResult<&mut Self> {
        self.tracks.push(offset, layer)?;
        Ok(self)
    }

    /// Remove every placement of `layer`. Returns how many were removed.
    pub fn remove_layer(&mut self, layer: &LayerRef) -> VedResult<usize> {
        self.tracks.remove_layer(layer)
    }

    /// Latest end time over all tracks, `0.0` when empty.
    pub fn duration(&self) -> f64 {
        self.tracks.iter().map(|t| t.end()).fold(0.0, f64::max)
    }

    /// Advance the lifecycle to `t` and produce the requested outputs.
    pub fn tick(
        &mut self,
        t: f64,
        kind: TickKind,
        on_audio: &mut dyn FnMut(AudioTick<'_>) -> VedResult<()>,
    ) -> VedResult<TickReport> {
        if !t.is_finite() {
            return Err(VedError::config(format!("cannot tick at {t}")));
        }
        self.current_time = t;
        self.driver.tick(
            &self.tracks,
            self.surface.as_mut(),
            self.background,
            t,
            kind,
            on_audio,
        )
    }

    /// Composite picture at `t`.
    pub fn render(&mut self, t: f64) -> VedResult<FrameRGBA> {
        self.tick(t, TickKind::VIDEO, &mut |_| Ok(()))?;
        self.surface.bind()?;
        self.surface.read_back()
    }

    /// One sample frame from every audio-emitting layer active at `t`.
    ///
    /// Sampling advances finite sources by one frame, just like an export does.
    pub fn sample(&mut self, t: f64) -> VedResult<Vec<LayerSample>> {
        let mut out = Vec::new();
        self.tick(t, TickKind::AUDIO, &mut |tick| {
            out.push(LayerSample {
                layer: tick.layer,
                start_time: tick.track.offset,
                values: tick.values.to_vec(),
            });
            Ok(())
        })?;
        Ok(out)
    }

    pub fn screenshot(&mut self, t: f64, target: ScreenshotTarget<'_>) -> VedResult<()> {
        let frame = self.render(t)?;
        match target {
            ScreenshotTarget::Path(path) => {
                ensure_parent_dir(path)?;
                image::save_buffer_with_format(
                    path,
                    &frame.data,
                    frame.width,
                    frame.height,
                    image::ColorType::Rgba8,
                    ImageFormat::from_path(path)?,
                )?;
            }
            ScreenshotTarget::Writer { writer, format } => frame.write_image(writer, format)?,
        }
        Ok(())
    }

    /// Render `[start, end]` at `fps` (boundary inclusive) and hand each frame to
    /// `on_frame` with its instant. Returns the number of frames produced.
    pub fn play(
        &mut self,
        start: f64,
        end: f64,
        fps: Fps,
        mut on_frame: impl FnMut(f64, &FrameRGBA) -> VedResult<()>,
    ) -> VedResult<usize> {
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(VedError::config(format!(
                "invalid preview range [{start}, {end}]"
            )));
        }
        let fps = Fps::new(fps.num, fps.den)?;
        let step = fps.frame_duration_secs();
        let mut frames = 0usize;
        loop {
            let t = start + frames as f64 * step;
            if t > end + 1e-9 {
                break;
            }
            let frame = self.render(t)?;
            on_frame(t, &frame)?;
            frames += 1;
        }
        Ok(frames)
    }

    /// Deactivate every active layer and rewind the clock.
    pub fn reset(&mut self) -> VedResult<()> {
        for track in &self.tracks {
            track.layer.borrow_mut()?.deactivate();
        }
        self.current_time = 0.0;
        Ok(())
    }

    /// Walk `[start, end]` on the sub-tick clock and collect frames and audio.
    ///
    /// Every layer is deactivated first, so layers entering the range start fresh.
    #[tracing::instrument(skip(self, opts), fields(timeline = self.id.0))]
    pub fn capture(&mut self, opts: &RecordOpts) -> VedResult<Capture> {
        let (start, end) = opts.range(self.duration())?;
        let clock = SubTickClock::new(opts.fps, opts.sample_rate, end - start)?;
        tracing::info!(
            start,
            end,
            fps = %opts.fps,
            sample_rate = opts.sample_rate,
            frames = clock.frame_count(),
            "capturing timeline"
        );

        self.reset()?;
        let mut capture = Capture::new(start, end, opts.fps, opts.sample_rate);
        for tick in clock.ticks() {
            let kind = TickKind {
                video: tick.frame,
                audio: tick.sample,
            };
            self.tick(start + tick.time, kind, &mut |a| capture.push_audio(a))?;
            if tick.frame {
                self.surface.bind()?;
                let frame = self.surface.read_back()?;
                capture.frames.push(&frame)?;
            }
        }
        self.reset()?;
        Ok(capture)
    }

    /// Capture `[start, end]` and mux it into `target` with the system encoder.
    pub fn record(&mut self, opts: &RecordOpts, target: OutputTarget<'_>) -> VedResult<RecordStats> {
        let capture = self.capture(opts)?;
        let stats = RecordStats {
            frames: capture.frames.frame_count(),
            audio_streams: capture.audio.len(),
            samples: capture.audio.iter().map(|s| s.sample_count()).sum(),
        };
        Muxer::new(opts.mux.clone()).run(&capture, target)?;
        tracing::info!(
            frames = stats.frames,
            audio_streams = stats.audio_streams,
            samples = stats.samples,
            "recorded timeline"
        );
        Ok(stats)
    }
}
