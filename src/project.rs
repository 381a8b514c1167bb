use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::foundation::core::{Point, Rect, Rgba8};
use crate::foundation::error::{VedError, VedResult};
use crate::layer::Layer;
use crate::layer::audio::{Constant, Silence, Tone};
use crate::layer::ffmpeg_source::FfmpegMediaSource;
use crate::layer::format::AudioFormat;
use crate::layer::media::Media;
use crate::layer::visual::{Picture, Solid};
use crate::timeline::Timeline;

/// A timeline described as JSON.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProjectFile {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: Rgba8,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

fn default_background() -> Rgba8 {
    Rgba8::BLACK
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LayerEntry {
    #[serde(default)]
    pub offset: f64,
    /// Seconds. Required for everything except media, which defaults to its own length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default = "default_true")]
    pub output_audio: bool,
    pub content: ContentSpec,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSpec {
    Solid {
        color: Rgba8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rect: Option<Rect>,
    },
    Image {
        path: PathBuf,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Silence {
        #[serde(default)]
        audio: AudioSpec,
    },
    Constant {
        value: f32,
        #[serde(default)]
        audio: AudioSpec,
    },
    Tone {
        frequency: f64,
        #[serde(default = "default_amplitude")]
        amplitude: f32,
        #[serde(default)]
        audio: AudioSpec,
    },
    Media {
        path: PathBuf,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
}

fn default_amplitude() -> f32 {
    0.5
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AudioSpec {
    pub channels: u16,
    pub sample_bits: u16,
    pub sample_rate: u32,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_bits: 16,
            sample_rate: 44_100,
        }
    }
}

impl AudioSpec {
    fn format(self) -> VedResult<AudioFormat> {
        AudioFormat::new(self.channels, self.sample_bits, self.sample_rate)
    }
}

impl ProjectFile {
    pub fn from_path(path: &Path) -> VedResult<Self> {
        use anyhow::Context as _;
        let f = File::open(path)
            .with_context(|| format!("failed to open project '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| VedError::serde(format!("'{}': {e}", path.display())))
    }

    pub fn from_json(s: &str) -> VedResult<Self> {
        serde_json::from_str(s).map_err(|e| VedError::serde(e.to_string()))
    }

    /// Check everything that can be checked without touching asset files.
    pub fn validate(&self) -> VedResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VedError::config("canvas width/height must be > 0"));
        }
        for (i, entry) in self.layers.iter().enumerate() {
            let ctx = |msg: String| VedError::config(format!("layer {i}: {msg}"));
            if !entry.offset.is_finite() || entry.offset < 0.0 {
                return Err(ctx(format!("offset must be >= 0, got {}", entry.offset)));
            }
            match entry.duration {
                Some(d) if !d.is_finite() || d <= 0.0 => {
                    return Err(ctx(format!("duration must be > 0, got {d}")));
                }
                None if !matches!(entry.content, ContentSpec::Media { .. }) => {
                    return Err(ctx("duration is required".to_owned()));
                }
                _ => {}
            }
            match &entry.content {
                ContentSpec::Silence { audio }
                | ContentSpec::Constant { audio, .. }
                | ContentSpec::Tone { audio, .. } => {
                    audio.format().map_err(|e| ctx(e.to_string()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build a timeline. Relative asset paths resolve against `assets_root`.
    pub fn build(&self, assets_root: &Path) -> VedResult<Timeline> {
        self.validate()?;
        let mut timeline = Timeline::new(self.width, self.height, self.background)?;
        for entry in &self.layers {
            let layer = entry.build(assets_root)?.with_output_audio(entry.output_audio);
            timeline.add_layer(entry.offset, layer)?;
        }
        tracing::debug!(layers = self.layers.len(), duration = timeline.duration(), "project built");
        Ok(timeline)
    }
}

impl LayerEntry {
    fn build(&self, assets_root: &Path) -> VedResult<Layer> {
        let duration = self.duration.unwrap_or(0.0);
        match &self.content {
            ContentSpec::Solid { color, rect } => match rect {
                Some(rect) => Layer::new(duration, Solid::new(*rect, *color)),
                None => Layer::new(duration, Solid::full(*color)),
            },
            ContentSpec::Image { path, x, y } => Layer::new(
                duration,
                Picture::open(&assets_root.join(path), Point::new(*x, *y))?,
            ),
            ContentSpec::Silence { audio } => Layer::new(duration, Silence::new(audio.format()?)),
            ContentSpec::Constant { value, audio } => {
                Layer::new(duration, Constant::new(*value, audio.format()?))
            }
            ContentSpec::Tone {
                frequency,
                amplitude,
                audio,
            } => Layer::new(duration, Tone::new(*frequency, *amplitude, audio.format()?)),
            ContentSpec::Media { path, x, y } => {
                let media = Media::new(FfmpegMediaSource::open(assets_root.join(path))?)
                    .with_origin(Point::new(*x, *y));
                match self.duration {
                    Some(d) => Layer::new(d, media),
                    None => media.into_layer(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "width": 4,
        "height": 2,
        "background": [255, 0, 255, 255],
        "layers": [
            { "offset": 0.5, "duration": 1.0,
              "content": { "type": "solid", "color": [0, 255, 0, 255],
                           "rect": { "x0": 0, "y0": 0, "x1": 2, "y1": 2 } } },
            { "offset": 1.0, "duration": 2.0, "output_audio": false,
              "content": { "type": "tone", "frequency": 440,
                           "audio": { "channels": 1, "sample_rate": 8000 } } }
        ]
    }"#;

    #[test]
    fn parses_and_builds() {
        let project = ProjectFile::from_json(SAMPLE).unwrap();
        assert_eq!(project.layers.len(), 2);
        let mut tl = project.build(Path::new(".")).unwrap();
        assert_eq!(tl.duration(), 3.0);
        assert_eq!(tl.background(), Rgba8::new(255, 0, 255, 255));

        let frame = tl.render(0.75).unwrap();
        assert_eq!(frame.pixel(1, 1), Some(Rgba8::new(0, 255, 0, 255)));
        assert_eq!(frame.pixel(3, 1), Some(Rgba8::new(255, 0, 255, 255)));

        let tone = tl.tracks().get(1).unwrap().layer.clone();
        assert!(!tone.borrow().unwrap().output_audio());
    }

    #[test]
    fn validation_reports_the_layer() {
        let mut project = ProjectFile::from_json(SAMPLE).unwrap();
        project.layers[1].duration = None;
        let err = project.validate().unwrap_err().to_string();
        assert!(err.contains("layer 1"), "{err}");

        let mut project = ProjectFile::from_json(SAMPLE).unwrap();
        project.layers[0].offset = -1.0;
        assert!(project.validate().is_err());

        let mut project = ProjectFile::from_json(SAMPLE).unwrap();
        project.layers[1].content = ContentSpec::Silence {
            audio: AudioSpec {
                sample_bits: 24,
                ..AudioSpec::default()
            },
        };
        assert!(project.validate().is_err());
    }

    #[test]
    fn unknown_content_type_is_a_serde_error() {
        let err = ProjectFile::from_json(
            r#"{"width":1,"height":1,"layers":[{"duration":1,"content":{"type":"blur"}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, VedError::Serde(_)));
    }
}
