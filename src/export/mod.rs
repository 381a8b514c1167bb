//! Export scheduling: walking a timeline on the sub-tick clock and collecting the raw
//! streams the muxer consumes.

pub mod clock;
pub mod schedule;

pub use clock::{SubTick, SubTickClock};
pub use schedule::{AudioStream, Capture, FrameStream, RecordOpts};
