pub mod ffmpeg;

pub use ffmpeg::{MuxOptions, Muxer, OutputTarget, ensure_parent_dir, is_ffmpeg_on_path};
