use byteorder::{LittleEndian, WriteBytesExt};

use crate::foundation::core::Point;
use crate::foundation::error::{VedError, VedResult};
use crate::layer::format::{AudioFormat, MediaInfo};
use crate::layer::{AudioContent, Content, Layer, SampleStatus, VideoContent};
use crate::render::surface::{FrameRGBA, RenderSurface};

/// Number of bytes requested from a [`MediaSource`] per read.
pub const AUDIO_BUFFER_SIZE: usize = 1 << 20;

/// Forward gaps up to this many seconds are decoded through instead of seeking.
const MAX_SKIP_SECONDS: u64 = 1;

/// Decoded media provided by an external decoder.
pub trait MediaSource {
    fn info(&self) -> MediaInfo;

    /// Reposition the audio read cursor to `t` seconds.
    fn seek(&mut self, t: f64) -> VedResult<()>;

    /// Next chunk of packed PCM in [`MediaInfo::audio`] layout, at most `max_bytes` long.
    /// `None` marks the end of the stream.
    fn read_audio(&mut self, max_bytes: usize) -> VedResult<Option<Vec<u8>>>;

    /// Picture at `t` seconds, if the source has video.
    fn video_frame(&mut self, _t: f64) -> VedResult<Option<FrameRGBA>> {
        Ok(None)
    }
}

/// In-memory packed PCM.
#[derive(Clone, Debug)]
pub struct PcmSource {
    format: AudioFormat,
    data: Vec<u8>,
    pos: usize,
}

impl PcmSource {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            pos: 0,
        }
    }

    /// `frames` sample frames holding `value` on every channel.
    pub fn constant(format: AudioFormat, value: f32, frames: usize) -> VedResult<Self> {
        let mut data = Vec::with_capacity(frames * format.frame_bytes());
        for _ in 0..frames * usize::from(format.channels) {
            format.pack(value, &mut data)?;
        }
        Ok(Self::new(format, data))
    }

    fn frames(&self) -> usize {
        match self.format.frame_bytes() {
            0 => 0,
            n => self.data.len() / n,
        }
    }
}

impl MediaSource for PcmSource {
    fn info(&self) -> MediaInfo {
        MediaInfo {
            video: None,
            audio: Some(self.format),
            duration: self.frames() as f64 / f64::from(self.format.sample_rate),
        }
    }

    fn seek(&mut self, t: f64) -> VedResult<()> {
        if !t.is_finite() || t < 0.0 {
            return Err(VedError::config(format!("cannot seek to {t}")));
        }
        let frame = frame_index(t, self.format.sample_rate) as usize;
        self.pos = frame
            .saturating_mul(self.format.frame_bytes())
            .min(self.data.len());
        Ok(())
    }

    fn read_audio(&mut self, max_bytes: usize) -> VedResult<Option<Vec<u8>>> {
        if self.pos >= self.data.len() || max_bytes == 0 {
            return Ok(None);
        }
        let end = (self.pos + max_bytes).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(chunk))
    }
}

/// Content backed by a [`MediaSource`].
///
/// Audio is resampled by index: a sample at local time `t` returns the source frame
/// `floor(t * sample_rate)`, so the layer may be sampled at any rate. Forward reads decode
/// sequentially; going backwards or far ahead seeks the source. Activation rewinds the
/// source to its start.
pub struct Media {
    source: Box<dyn MediaSource>,
    info: MediaInfo,
    origin: Point,
    buffer: Vec<u8>,
    buffer_pos: usize,
    ended: bool,
    /// Index of the next frame `next_frame_bytes` will return.
    position: u64,
    /// Most recently returned frame, reused while upsampling.
    held: Option<(u64, Vec<u8>)>,
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("info", &self.info)
            .field("origin", &self.origin)
            .field("buffer_pos", &self.buffer_pos)
            .field("ended", &self.ended)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Media {
    pub fn new(source: impl MediaSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn MediaSource>) -> Self {
        Self {
            info: source.info(),
            source,
            origin: Point::ZERO,
            buffer: Vec::new(),
            buffer_pos: 0,
            ended: false,
            position: 0,
            held: None,
        }
    }

    /// Where the top-left corner of the picture lands on the surface.
    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn info(&self) -> MediaInfo {
        self.info
    }

    /// Wrap into a layer lasting the media's reported duration.
    pub fn into_layer(self) -> VedResult<Layer> {
        Layer::new(self.info.duration, self)
    }

    fn rewind(&mut self) -> VedResult<()> {
        self.reposition(0, 1)
    }

    /// Seek the source so the next frame read is `frame`.
    fn reposition(&mut self, frame: u64, sample_rate: u32) -> VedResult<()> {
        self.source.seek(frame as f64 / f64::from(sample_rate))?;
        self.buffer.clear();
        self.buffer_pos = 0;
        self.ended = false;
        self.position = frame;
        self.held = None;
        Ok(())
    }

    /// Buffer at least `need` unread bytes. Returns how many are available, which is less
    /// than `need` only once the source is drained.
    fn fill(&mut self, need: usize) -> VedResult<usize> {
        while self.buffer.len() - self.buffer_pos < need && !self.ended {
            match self.source.read_audio(AUDIO_BUFFER_SIZE)? {
                Some(chunk) if !chunk.is_empty() => {
                    self.buffer.drain(..self.buffer_pos);
                    self.buffer_pos = 0;
                    self.buffer.extend_from_slice(&chunk);
                }
                _ => self.ended = true,
            }
        }
        Ok(self.buffer.len() - self.buffer_pos)
    }

    /// Next packed sample frame, `None` at a clean end of stream.
    fn next_frame_bytes(&mut self, format: AudioFormat) -> VedResult<Option<&[u8]>> {
        let need = format.frame_bytes();
        if need == 0 {
            return Ok(None);
        }
        match self.fill(need)? {
            0 => Ok(None),
            available if available < need => Err(VedError::exhausted(format!(
                "audio stream ended {available} bytes into a {need}-byte sample frame"
            ))),
            _ => {
                let start = self.buffer_pos;
                self.buffer_pos += need;
                self.position += 1;
                Ok(Some(&self.buffer[start..start + need]))
            }
        }
    }

    /// The whole audio stream as a WAV file.
    ///
    /// Rewinds the source before and after reading; do not call while the layer is active.
    pub fn audio_data(&mut self) -> VedResult<Vec<u8>> {
        let format = self
            .info
            .audio
            .ok_or_else(|| VedError::config("no audio data available"))?;
        self.rewind()?;
        let mut pcm = Vec::new();
        while let Some(frame) = self.next_frame_bytes(format)? {
            pcm.extend_from_slice(frame);
        }
        self.rewind()?;
        wav_bytes(format, &pcm)
    }
}

impl VideoContent for Media {
    fn render(&mut self, t: f64, surface: &mut dyn RenderSurface) -> VedResult<()> {
        if let Some(frame) = self.source.video_frame(t)? {
            surface.draw_rgba(self.origin, frame.width, frame.height, &frame.data)?;
        }
        Ok(())
    }
}

impl AudioContent for Media {
    fn format(&self) -> AudioFormat {
        self.info.audio.unwrap_or(AudioFormat {
            channels: 0,
            sample_bits: 16,
            sample_rate: 1,
        })
    }

    fn sample(&mut self, t: f64, out: &mut [f32]) -> VedResult<SampleStatus> {
        let format = self.format();
        let target = frame_index(t, format.sample_rate);

        if !matches!(&self.held, Some((index, _)) if *index == target) {
            let ahead = target.checked_sub(self.position);
            if ahead.is_none_or(|n| n > MAX_SKIP_SECONDS * u64::from(format.sample_rate)) {
                self.reposition(target, format.sample_rate)?;
            }
            while self.position < target {
                if self.next_frame_bytes(format)?.is_none() {
                    return Ok(SampleStatus::EndOfStream);
                }
            }
            let Some(frame) = self.next_frame_bytes(format)? else {
                return Ok(SampleStatus::EndOfStream);
            };
            let frame = frame.to_vec();
            self.held = Some((target, frame));
        }

        let Some((_, frame)) = &self.held else {
            return Ok(SampleStatus::EndOfStream);
        };
        let bps = format.bytes_per_sample();
        for (slot, packed) in out.iter_mut().zip(frame.chunks_exact(bps)) {
            *slot = format.unpack(packed)?;
        }
        Ok(SampleStatus::Ready)
    }
}

impl Content for Media {
    fn on_activate(&mut self) -> VedResult<()> {
        self.rewind()
    }

    fn video(&mut self) -> Option<&mut dyn VideoContent> {
        if self.info.video.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn audio(&mut self) -> Option<&mut dyn AudioContent> {
        if self.info.audio.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

/// Sample frame covering local time `t`.
fn frame_index(t: f64, sample_rate: u32) -> u64 {
    if !t.is_finite() || t <= 0.0 {
        return 0;
    }
    (t * f64::from(sample_rate) + 1e-9).floor() as u64
}

/// Wrap packed PCM in a canonical 44-byte RIFF/WAVE header.
///
/// WAV stores 8-bit samples unsigned, so signed bytes are offset by 128.
pub fn wav_bytes(format: AudioFormat, pcm: &[u8]) -> VedResult<Vec<u8>> {
    let data_len = u32::try_from(pcm.len())
        .map_err(|_| VedError::config("audio data too large for a WAV file"))?;
    let block_align = format.frame_bytes() as u16;
    let byte_rate = format.sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_len)?;
    out.extend_from_slice(b"WAVEfmt ");
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(1)?;
    out.write_u16::<LittleEndian>(format.channels)?;
    out.write_u32::<LittleEndian>(format.sample_rate)?;
    out.write_u32::<LittleEndian>(byte_rate)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(format.sample_bits)?;
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len)?;
    if format.sample_bits == 8 {
        out.extend(pcm.iter().map(|&b| (b as i8 as i16 + 128) as u8));
    } else {
        out.extend_from_slice(pcm);
    }
    Ok(out)
}
