use crate::driver::AudioTick;
use crate::encode::ffmpeg::MuxOptions;
use crate::foundation::core::Fps;
use crate::foundation::error::{VedError, VedResult};
use crate::layer::LayerId;
use crate::layer::format::AudioFormat;
use crate::render::surface::FrameRGBA;

/// Export range, rates and encoder settings.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RecordOpts {
    /// First instant, in timeline seconds.
    pub start: f64,
    /// Last instant (inclusive). `None` exports up to the timeline's duration.
    pub end: Option<f64>,
    pub fps: Fps,
    pub sample_rate: u32,
    pub mux: MuxOptions,
}

impl Default for RecordOpts {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
            fps: Fps { num: 30, den: 1 },
            sample_rate: 44_100,
            mux: MuxOptions::default(),
        }
    }
}

impl RecordOpts {
    pub fn with_range(mut self, start: f64, end: Option<f64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_rates(mut self, fps: Fps, sample_rate: u32) -> Self {
        self.fps = fps;
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_mux(mut self, mux: MuxOptions) -> Self {
        self.mux = mux;
        self
    }

    /// Resolve `[start, end]` against a timeline of `duration` seconds.
    pub fn range(&self, duration: f64) -> VedResult<(f64, f64)> {
        Fps::new(self.fps.num, self.fps.den)?;
        if self.sample_rate == 0 {
            return Err(VedError::config("sample rate must be > 0"));
        }
        let end = self.end.unwrap_or(duration);
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(VedError::config(format!(
                "export start must be a non-negative number of seconds, got {}",
                self.start
            )));
        }
        if !end.is_finite() || end < self.start {
            return Err(VedError::config(format!(
                "export end {end} is before start {}",
                self.start
            )));
        }
        Ok((self.start, end))
    }
}

/// Concatenated PNG encodings of every exported frame, in timeline order.
#[derive(Clone, Debug, Default)]
pub struct FrameStream {
    data: Vec<u8>,
    frames: usize,
}

impl FrameStream {
    pub fn push(&mut self, frame: &FrameRGBA) -> VedResult<()> {
        frame.encode_png_into(&mut self.data)?;
        self.frames += 1;
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Raw PCM pulled from one layer during an export.
#[derive(Clone, Debug)]
pub struct AudioStream {
    pub layer: LayerId,
    /// Absolute placement of the layer on the timeline, in seconds.
    pub start_time: f64,
    pub format: AudioFormat,
    /// Rate the layer was sampled at, which is the export's sample rate.
    pub sample_rate: u32,
    /// Packed little-endian samples, channels interleaved.
    pub data: Vec<u8>,
}

impl AudioStream {
    pub fn sample_count(&self) -> usize {
        match self.format.frame_bytes() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    /// Seconds between the start of the export and the first sample of this stream.
    pub fn delay(&self, export_start: f64) -> f64 {
        (self.start_time - export_start).max(0.0)
    }
}

/// Everything an export collected before it is handed to the muxer.
#[derive(Clone, Debug)]
pub struct Capture {
    pub start: f64,
    pub end: f64,
    pub fps: Fps,
    pub sample_rate: u32,
    pub frames: FrameStream,
    /// One entry per audio-emitting layer, in order of first sample.
    pub audio: Vec<AudioStream>,
}

impl Capture {
    pub fn new(start: f64, end: f64, fps: Fps, sample_rate: u32) -> Self {
        Self {
            start,
            end,
            fps,
            sample_rate,
            frames: FrameStream::default(),
            audio: Vec::new(),
        }
    }

    pub fn stream(&self, layer: LayerId) -> Option<&AudioStream> {
        self.audio.iter().find(|s| s.layer == layer)
    }

    /// Quantize one sample frame into the layer's stream, opening the stream on first use.
    pub fn push_audio(&mut self, tick: AudioTick<'_>) -> VedResult<()> {
        let idx = match self.audio.iter().position(|s| s.layer == tick.layer) {
            Some(idx) => idx,
            None => {
                tracing::debug!(layer = ?tick.layer, start = tick.track.offset, "audio stream opened");
                self.audio.push(AudioStream {
                    layer: tick.layer,
                    start_time: tick.track.offset,
                    format: tick.format,
                    sample_rate: self.sample_rate,
                    data: Vec::new(),
                });
                self.audio.len() - 1
            }
        };
        let stream = &mut self.audio[idx];
        for &v in tick.values {
            stream.format.pack(v, &mut stream.data)?;
        }
        Ok(())
    }
}
