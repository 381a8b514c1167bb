#![forbid(unsafe_code)]
//! Programmatic timeline compositor.
//!
//! Layers are placed on a [`Timeline`], which renders the composite picture or samples the
//! audio of every active layer at any instant, and records a time range into a media file by
//! piping frames and raw audio into the system `ffmpeg`.

pub mod driver;
pub mod encode;
pub mod export;
pub mod foundation;
pub mod layer;
pub mod project;
pub mod render;
pub mod timeline;
pub mod tracks;

pub use driver::{AudioTick, Driver, TickKind, TickReport};
pub use encode::{MuxOptions, Muxer, OutputTarget, is_ffmpeg_on_path};
pub use export::{AudioStream, Capture, FrameStream, RecordOpts, SubTick, SubTickClock};
pub use foundation::core::{Canvas, Fps, Point, Rect, Rgba8};
pub use foundation::error::{VedError, VedResult};
pub use layer::audio::{Constant, Silence, Tone};
pub use layer::ffmpeg_source::FfmpegMediaSource;
pub use layer::format::{AudioFormat, MediaInfo, VideoFormat};
pub use layer::media::{Media, MediaSource, PcmSource};
pub use layer::visual::{Picture, Solid};
pub use layer::{
    AudioContent, Content, Layer, LayerId, LayerRef, SampleStatus, VideoContent,
};
pub use project::ProjectFile;
pub use render::cpu::CpuSurface;
pub use render::surface::{FrameRGBA, RenderSurface};
pub use timeline::{LayerSample, RecordStats, ScreenshotTarget, Timeline, TimelineId};
pub use tracks::{Track, Tracks};
