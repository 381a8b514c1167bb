use crate::foundation::error::VedResult;
use crate::layer::format::AudioFormat;
use crate::layer::{AudioContent, Content, SampleStatus};

/// Audio layer without source data: every sample is `0.0`.
#[derive(Clone, Copy, Debug)]
pub struct Silence {
    pub format: AudioFormat,
}

impl Silence {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl AudioContent for Silence {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn sample(&mut self, _t: f64, out: &mut [f32]) -> VedResult<SampleStatus> {
        out.fill(0.0);
        Ok(SampleStatus::Ready)
    }
}

impl Content for Silence {
    fn audio(&mut self) -> Option<&mut dyn AudioContent> {
        Some(self)
    }
}

/// Holds one value on every channel.
#[derive(Clone, Copy, Debug)]
pub struct Constant {
    pub value: f32,
    pub format: AudioFormat,
}

impl Constant {
    pub fn new(value: f32, format: AudioFormat) -> Self {
        Self {
            value: value.clamp(-1.0, 1.0),
            format,
        }
    }
}

impl AudioContent for Constant {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn sample(&mut self, _t: f64, out: &mut [f32]) -> VedResult<SampleStatus> {
        out.fill(self.value);
        Ok(SampleStatus::Ready)
    }
}

impl Content for Constant {
    fn audio(&mut self) -> Option<&mut dyn AudioContent> {
        Some(self)
    }
}

/// Sine wave, same phase on every channel.
#[derive(Clone, Copy, Debug)]
pub struct Tone {
    pub frequency: f64,
    pub amplitude: f32,
    pub format: AudioFormat,
}

impl Tone {
    pub fn new(frequency: f64, amplitude: f32, format: AudioFormat) -> Self {
        Self {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            format,
        }
    }
}

impl AudioContent for Tone {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn sample(&mut self, t: f64, out: &mut [f32]) -> VedResult<SampleStatus> {
        let v = (std::f64::consts::TAU * self.frequency * t).sin() as f32 * self.amplitude;
        out.fill(v);
        Ok(SampleStatus::Ready)
    }
}

impl Content for Tone {
    fn audio(&mut self) -> Option<&mut dyn AudioContent> {
        Some(self)
    }
}
