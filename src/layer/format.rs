use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::foundation::error::{VedError, VedResult};

/// Audio stream shape of a layer: channel count, bits per sample and native rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    /// 8 (signed byte) or 16 (signed little-endian short).
    pub sample_bits: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn new(channels: u16, sample_bits: u16, sample_rate: u32) -> VedResult<Self> {
        if sample_bits != 8 && sample_bits != 16 {
            return Err(VedError::config(format!(
                "unsupported sample size {sample_bits} bits (expected 8 or 16)"
            )));
        }
        if sample_rate == 0 {
            return Err(VedError::config("audio sample_rate must be > 0"));
        }
        Ok(Self {
            channels,
            sample_bits,
            sample_rate,
        })
    }

    pub fn bytes_per_sample(self) -> usize {
        usize::from(self.sample_bits / 8)
    }

    /// Bytes for one sample on every channel.
    pub fn frame_bytes(self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Raw PCM demuxer name understood by ffmpeg's `-f`.
    pub fn pcm_format(self) -> &'static str {
        if self.sample_bits == 8 { "s8" } else { "s16le" }
    }

    /// Scale a normalized sample into this format and append the packed bytes.
    pub fn pack(self, value: f32, out: &mut Vec<u8>) -> VedResult<()> {
        let v = if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        match self.sample_bits {
            8 => out.write_i8((v * f32::from(i8::MAX)).round() as i8)?,
            16 => out.write_i16::<LittleEndian>((v * f32::from(i16::MAX)).round() as i16)?,
            bits => {
                return Err(VedError::config(format!(
                    "unsupported sample size {bits} bits"
                )));
            }
        }
        Ok(())
    }

    /// Inverse of [`AudioFormat::pack`] for one packed sample.
    pub fn unpack(self, mut bytes: &[u8]) -> VedResult<f32> {
        let v = match self.sample_bits {
            8 => f32::from(bytes.read_i8()?) / f32::from(i8::MAX),
            16 => f32::from(bytes.read_i16::<LittleEndian>()?) / f32::from(i16::MAX),
            bits => {
                return Err(VedError::config(format!(
                    "unsupported sample size {bits} bits"
                )));
            }
        };
        Ok(v.clamp(-1.0, 1.0))
    }
}

/// Picture shape of a decoded video stream.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub sample_aspect: f64,
    pub frame_rate: f64,
}

/// What a media source reported at load time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaInfo {
    pub video: Option<VideoFormat>,
    pub audio: Option<AudioFormat>,
    /// Seconds.
    pub duration: f64,
}
