//! Per-instant lifecycle driver.
//!
//! For every track the driver decides whether the layer's activation window holds at the
//! requested instant, fires `activate`/`deactivate` on window entry and exit, and pulls the
//! layer's contribution. The window test is stateless, so ticks may arrive in any order.

use crate::foundation::core::Rgba8;
use crate::foundation::error::VedResult;
use crate::layer::format::AudioFormat;
use crate::layer::{LayerId, SampleStatus};
use crate::render::surface::RenderSurface;
use crate::tracks::{Track, Tracks};

/// Which outputs a tick produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickKind {
    pub video: bool,
    pub audio: bool,
}

impl TickKind {
    pub const VIDEO: Self = Self {
        video: true,
        audio: false,
    };
    pub const AUDIO: Self = Self {
        video: false,
        audio: true,
    };
    pub const BOTH: Self = Self {
        video: true,
        audio: true,
    };
}

/// Lifecycle transitions and output produced by one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub activated: usize,
    pub deactivated: usize,
    pub drawn: usize,
    pub sampled: usize,
}

/// One sample frame pulled from an audio-emitting layer.
#[derive(Debug)]
pub struct AudioTick<'a> {
    pub track: &'a Track,
    pub layer: LayerId,
    pub format: AudioFormat,
    /// One normalized value per channel.
    pub values: &'a [f32],
}

#[derive(Debug, Default)]
pub struct Driver {
    scratch: Vec<f32>,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every track to global time `t`.
    ///
    /// Video ticks bind `surface` and clear it to `background` before any layer draws;
    /// layers then draw in track order. Audio ticks hand each emitted sample frame to
    /// `on_audio`.
    pub fn tick(
        &mut self,
        tracks: &Tracks,
        surface: &mut dyn RenderSurface,
        background: Rgba8,
        t: f64,
        kind: TickKind,
        on_audio: &mut dyn FnMut(AudioTick<'_>) -> VedResult<()>,
    ) -> VedResult<TickReport> {
        let mut report = TickReport::default();

        if kind.video {
            surface.bind()?;
            surface.clear(background)?;
        }

        for track in tracks {
            let mut layer = track.layer.borrow_mut()?;

            if !track.contains(t) {
                if layer.is_active() {
                    layer.deactivate();
                    report.deactivated += 1;
                    tracing::debug!(layer = ?layer.id(), t, "deactivated");
                }
                continue;
            }

            if !layer.is_active() {
                layer.activate()?;
                report.activated += 1;
                tracing::debug!(layer = ?layer.id(), t, "activated");
            }

            let local = t - track.offset;

            if kind.video && layer.produce_video(local, surface)? {
                report.drawn += 1;
            }

            let format = if kind.audio {
                layer.emitted_audio_format()
            } else {
                None
            };
            if let Some(format) = format {
                self.scratch.clear();
                self.scratch.resize(usize::from(format.channels), 0.0);
                if layer.produce_audio(local, &mut self.scratch)? == SampleStatus::Ready {
                    report.sampled += 1;
                    let id = layer.id();
                    drop(layer);
                    on_audio(AudioTick {
                        track,
                        layer: id,
                        format,
                        values: &self.scratch,
                    })?;
                }
            }
        }

        Ok(report)
    }
}
