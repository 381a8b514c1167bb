//! Content items placed on a [`crate::Timeline`].
//!
//! A [`Layer`] owns the lifecycle state every item shares (duration, active flag, owning
//! timeline) and delegates the actual content to a boxed [`Content`]. Capabilities are
//! discovered through [`Content::video`] and [`Content::audio`] rather than by type.

pub mod audio;
pub mod ffmpeg_source;
pub mod format;
pub mod media;
pub mod visual;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::error::{VedError, VedResult};
use crate::layer::format::AudioFormat;
use crate::render::surface::RenderSurface;
use crate::timeline::TimelineId;

/// Process-unique identity of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl LayerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Result of pulling one audio sample frame from a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleStatus {
    /// `out` holds one value per channel.
    Ready,
    /// A finite source has no more samples; nothing was written.
    EndOfStream,
}

/// Draws pixels onto the timeline surface.
pub trait VideoContent {
    /// `t` is seconds since the layer's start.
    fn render(&mut self, t: f64, surface: &mut dyn RenderSurface) -> VedResult<()>;
}

/// Produces normalized samples in `[-1, 1]`.
pub trait AudioContent {
    fn format(&self) -> AudioFormat;

    /// Fill `out` (one slot per channel) with the sample at `t` seconds since the layer's
    /// start.
    fn sample(&mut self, t: f64, out: &mut [f32]) -> VedResult<SampleStatus>;
}

/// The content carried by a [`Layer`].
///
/// Every hook has a no-op default; implementors override the capabilities they provide.
pub trait Content {
    /// Called once per activation window, before the first produce call.
    fn on_activate(&mut self) -> VedResult<()> {
        Ok(())
    }

    /// Called once when the activation window ends.
    fn on_deactivate(&mut self) {}

    fn on_attach(&mut self, _timeline: TimelineId) {}

    fn on_detach(&mut self) {}

    fn video(&mut self) -> Option<&mut dyn VideoContent> {
        None
    }

    fn audio(&mut self) -> Option<&mut dyn AudioContent> {
        None
    }
}

/// A timed content item.
pub struct Layer {
    id: LayerId,
    duration: f64,
    active: bool,
    output_audio: bool,
    timeline: Option<TimelineId>,
    content: Box<dyn Content>,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("duration", &self.duration)
            .field("active", &self.active)
            .field("output_audio", &self.output_audio)
            .field("timeline", &self.timeline)
            .finish_non_exhaustive()
    }
}

impl Layer {
    /// Create a standalone layer lasting `duration` seconds.
    pub fn new(duration: f64, content: impl Content + 'static) -> VedResult<Self> {
        Self::from_boxed(duration, Box::new(content))
    }

    pub fn from_boxed(duration: f64, content: Box<dyn Content>) -> VedResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(VedError::config(format!(
                "layer duration must be a positive number of seconds, got {duration}"
            )));
        }
        Ok(Self {
            id: LayerId::next(),
            duration,
            active: false,
            output_audio: true,
            timeline: None,
            content,
        })
    }

    /// Whether audio from this layer is written to exported files. Defaults to `true`.
    pub fn with_output_audio(mut self, output_audio: bool) -> Self {
        self.output_audio = output_audio;
        self
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn output_audio(&self) -> bool {
        self.output_audio
    }

    /// The timeline this layer is attached to, if any.
    pub fn timeline(&self) -> Option<TimelineId> {
        self.timeline
    }

    pub fn has_video(&mut self) -> bool {
        self.content.video().is_some()
    }

    pub fn audio_format(&mut self) -> Option<AudioFormat> {
        self.content.audio().map(|a| a.format())
    }

    /// Format of the audio this layer contributes to exports, if any.
    pub fn emitted_audio_format(&mut self) -> Option<AudioFormat> {
        if !self.output_audio {
            return None;
        }
        self.audio_format().filter(|f| f.channels > 0)
    }

    /// Audio capable, exported, and at least one channel.
    pub fn emits_audio(&mut self) -> bool {
        self.emitted_audio_format().is_some()
    }

    pub(crate) fn attach(&mut self, timeline: TimelineId) -> VedResult<()> {
        if let Some(current) = self.timeline {
            return Err(VedError::config(format!(
                "layer {:?} is already attached to timeline {:?}",
                self.id, current
            )));
        }
        self.timeline = Some(timeline);
        self.content.on_attach(timeline);
        Ok(())
    }

    /// No-op when not attached.
    pub(crate) fn detach(&mut self) {
        if self.timeline.take().is_some() {
            self.content.on_detach();
        }
    }

    pub(crate) fn activate(&mut self) -> VedResult<()> {
        if self.active {
            return Ok(());
        }
        self.content.on_activate()?;
        self.active = true;
        Ok(())
    }

    /// No-op when already inactive.
    pub(crate) fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.content.on_deactivate();
    }

    /// Draw the layer at local time `t`. Returns `false` when the layer has no video.
    pub(crate) fn produce_video(
        &mut self,
        t: f64,
        surface: &mut dyn RenderSurface,
    ) -> VedResult<bool> {
        match self.content.video() {
            Some(video) => {
                video.render(t, surface)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pull one sample per channel at local time `t`.
    pub(crate) fn produce_audio(&mut self, t: f64, out: &mut [f32]) -> VedResult<SampleStatus> {
        let audio = self
            .content
            .audio()
            .ok_or_else(|| VedError::config("no audio data available"))?;
        audio.sample(t, out)
    }
}

/// Shared handle to a [`Layer`].
///
/// The timeline holds one clone and drives the lifecycle; callers may keep others to
/// inspect state or to remove the layer later. Identity is by handle, not by value.
#[derive(Clone)]
pub struct LayerRef {
    id: LayerId,
    inner: Rc<RefCell<Layer>>,
}

impl LayerRef {
    pub fn new(layer: Layer) -> Self {
        Self {
            id: layer.id,
            inner: Rc::new(RefCell::new(layer)),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn borrow(&self) -> VedResult<Ref<'_, Layer>> {
        self.inner
            .try_borrow()
            .map_err(|_| VedError::render(format!("layer {:?} is mutably borrowed", self.id)))
    }

    pub fn borrow_mut(&self) -> VedResult<RefMut<'_, Layer>> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| VedError::render(format!("layer {:?} is already borrowed", self.id)))
    }

    pub fn ptr_eq(&self, other: &LayerRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Layer> for LayerRef {
    fn from(layer: Layer) -> Self {
        Self::new(layer)
    }
}

impl std::fmt::Debug for LayerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(layer) => layer.fmt(f),
            Err(_) => f.debug_tuple("LayerRef").field(&self.id).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::layer::audio::Constant;
    use crate::layer::visual::Solid;

    #[derive(Default)]
    struct Hooks {
        activations: Rc<Cell<u32>>,
        deactivations: Rc<Cell<u32>>,
        detaches: Rc<Cell<u32>>,
    }

    impl Content for Hooks {
        fn on_activate(&mut self) -> VedResult<()> {
            self.activations.set(self.activations.get() + 1);
            Ok(())
        }

        fn on_deactivate(&mut self) {
            self.deactivations.set(self.deactivations.get() + 1);
        }

        fn on_detach(&mut self) {
            self.detaches.set(self.detaches.get() + 1);
        }
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(Layer::new(0.0, Hooks::default()).is_err());
        assert!(Layer::new(-1.0, Hooks::default()).is_err());
        assert!(Layer::new(f64::NAN, Hooks::default()).is_err());
        assert!(Layer::new(f64::INFINITY, Hooks::default()).is_err());
    }

    #[test]
    fn layer_ids_are_unique() {
        let a = Layer::new(1.0, Hooks::default()).unwrap();
        let b = Layer::new(1.0, Hooks::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn activate_and_deactivate_are_not_redundant() {
        let hooks = Hooks::default();
        let (a, d) = (hooks.activations.clone(), hooks.deactivations.clone());
        let mut layer = Layer::new(1.0, hooks).unwrap();

        layer.deactivate();
        assert_eq!(d.get(), 0);

        layer.activate().unwrap();
        layer.activate().unwrap();
        assert!(layer.is_active());
        assert_eq!(a.get(), 1);

        layer.deactivate();
        layer.deactivate();
        assert!(!layer.is_active());
        assert_eq!(d.get(), 1);
    }

    #[test]
    fn double_detach_is_a_noop() {
        let hooks = Hooks::default();
        let detaches = hooks.detaches.clone();
        let mut layer = Layer::new(1.0, hooks).unwrap();
        layer.detach();
        assert_eq!(detaches.get(), 0);

        layer.attach(TimelineId(7)).unwrap();
        assert_eq!(layer.timeline(), Some(TimelineId(7)));
        assert!(layer.attach(TimelineId(8)).is_err());

        layer.detach();
        layer.detach();
        assert_eq!(layer.timeline(), None);
        assert_eq!(detaches.get(), 1);
    }

    #[test]
    fn audio_request_on_video_only_layer_is_a_config_error() {
        let mut layer = Layer::new(1.0, Solid::full(crate::Rgba8::BLACK)).unwrap();
        let mut out = [0.0f32; 1];
        let err = layer.produce_audio(0.0, &mut out).unwrap_err();
        assert!(err.to_string().contains("no audio data available"));
        assert!(!layer.emits_audio());
        assert!(layer.has_video());
    }

    #[test]
    fn muted_layer_does_not_emit() {
        let fmt = AudioFormat::new(1, 16, 44_100).unwrap();
        let mut layer = Layer::new(1.0, Constant::new(0.5, fmt))
            .unwrap()
            .with_output_audio(false);
        assert!(!layer.emits_audio());
        assert_eq!(layer.emitted_audio_format(), None);
        assert_eq!(layer.audio_format(), Some(fmt));

        let mut loud = Layer::new(1.0, Constant::new(0.5, fmt)).unwrap();
        assert_eq!(loud.emitted_audio_format(), Some(fmt));
    }

    #[test]
    fn layer_ref_identity_is_by_handle() {
        let a = LayerRef::new(Layer::new(1.0, Hooks::default()).unwrap());
        let b = a.clone();
        let c = LayerRef::new(Layer::new(1.0, Hooks::default()).unwrap());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));

        let guard = a.borrow_mut().unwrap();
        assert!(b.borrow().is_err());
        drop(guard);
        assert!(b.borrow().is_ok());
    }
}
