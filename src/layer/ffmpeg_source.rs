use std::path::{Path, PathBuf};

use crate::foundation::error::{VedError, VedResult};
use crate::layer::format::MediaInfo;
#[cfg(feature = "media-ffmpeg")]
use crate::layer::format::{AudioFormat, VideoFormat};
use crate::layer::media::{MediaSource, PcmSource};
use crate::render::surface::FrameRGBA;

/// Media file decoded by the system `ffmpeg`/`ffprobe` binaries.
///
/// Audio is decoded once, on first seek, to interleaved signed 16-bit PCM at the stream's
/// native rate and channel count. Video frames are decoded on demand.
#[derive(Debug)]
pub struct FfmpegMediaSource {
    path: PathBuf,
    info: MediaInfo,
    pcm: Option<PcmSource>,
}

impl FfmpegMediaSource {
    /// Probe `path` and read its stream formats.
    pub fn open(path: impl AsRef<Path>) -> VedResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe(&path)?;
        Ok(Self {
            path,
            info,
            pcm: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pcm(&mut self) -> VedResult<&mut PcmSource> {
        if self.pcm.is_none() {
            let format = self
                .info
                .audio
                .ok_or_else(|| VedError::config("no audio data available"))?;
            let data = decode_audio_s16(&self.path, format.channels, format.sample_rate)?;
            self.pcm = Some(PcmSource::new(format, data));
        }
        self.pcm
            .as_mut()
            .ok_or_else(|| VedError::render("audio decode produced no buffer"))
    }
}

impl MediaSource for FfmpegMediaSource {
    fn info(&self) -> MediaInfo {
        self.info
    }

    fn seek(&mut self, t: f64) -> VedResult<()> {
        if self.info.audio.is_none() {
            return Ok(());
        }
        self.pcm()?.seek(t)
    }

    fn read_audio(&mut self, max_bytes: usize) -> VedResult<Option<Vec<u8>>> {
        if self.info.audio.is_none() {
            return Ok(None);
        }
        self.pcm()?.read_audio(max_bytes)
    }

    fn video_frame(&mut self, t: f64) -> VedResult<Option<FrameRGBA>> {
        match self.info.video {
            Some(video) => decode_video_frame(&self.path, video.width, video.height, t).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(feature = "media-ffmpeg")]
fn probe(path: &Path) -> VedResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        sample_aspect_ratio: Option<String>,
        channels: Option<u16>,
        sample_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| VedError::EncoderUnavailable(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(VedError::config(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| VedError::serde(format!("ffprobe json parse failed: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| {
            Some(VideoFormat {
                width: s.width?,
                height: s.height?,
                sample_aspect: s
                    .sample_aspect_ratio
                    .as_deref()
                    .and_then(|r| parse_ratio(r, ':'))
                    .unwrap_or(1.0),
                frame_rate: s
                    .r_frame_rate
                    .as_deref()
                    .and_then(|r| parse_ratio(r, '/'))
                    .unwrap_or(0.0),
            })
        });

    let audio = match parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
    {
        Some(s) => {
            let rate = s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse::<u32>().ok())
                .ok_or_else(|| VedError::config("audio stream without a sample rate"))?;
            Some(AudioFormat::new(s.channels.unwrap_or(2), 16, rate)?)
        }
        None => None,
    };

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        video,
        audio,
        duration,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn probe(_path: &Path) -> VedResult<MediaInfo> {
    Err(VedError::config(
        "media layers require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn parse_ratio(s: &str, sep: char) -> Option<f64> {
    let (a, b) = s.split_once(sep)?;
    let a = a.parse::<f64>().ok()?;
    let b = b.parse::<f64>().ok()?;
    if b == 0.0 {
        return None;
    }
    Some(a / b)
}

#[cfg(feature = "media-ffmpeg")]
fn decode_audio_s16(path: &Path, channels: u16, sample_rate: u32) -> VedResult<Vec<u8>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ac",
            &channels.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| VedError::EncoderUnavailable(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(VedError::config(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out.stdout)
}

#[cfg(not(feature = "media-ffmpeg"))]
fn decode_audio_s16(_path: &Path, _channels: u16, _sample_rate: u32) -> VedResult<Vec<u8>> {
    Err(VedError::config(
        "media layers require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn decode_video_frame(path: &Path, width: u32, height: u32, t: f64) -> VedResult<FrameRGBA> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{t:.6}")])
        .arg("-i")
        .arg(path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| VedError::EncoderUnavailable(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(VedError::config(format!(
            "ffmpeg video decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let expected = width as usize * height as usize * 4;
    if expected == 0 || out.stdout.len() < expected {
        return Err(VedError::exhausted(format!(
            "decoded video frame has {} bytes, expected {expected}",
            out.stdout.len()
        )));
    }
    let mut data = out.stdout;
    data.truncate(expected);
    Ok(FrameRGBA {
        width,
        height,
        data,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn decode_video_frame(_path: &Path, _width: u32, _height: u32, _t: f64) -> VedResult<FrameRGBA> {
    Err(VedError::config(
        "media layers require the 'media-ffmpeg' feature",
    ))
}

#[cfg(all(test, feature = "media-ffmpeg"))]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_ratios() {
        assert_eq!(parse_ratio("30000/1001", '/'), Some(30_000.0 / 1001.0));
        assert_eq!(parse_ratio("1:1", ':'), Some(1.0));
        assert_eq!(parse_ratio("0/0", '/'), None);
        assert_eq!(parse_ratio("junk", '/'), None);
    }
}
