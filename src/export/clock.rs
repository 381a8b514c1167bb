use crate::foundation::core::{Fps, gcd, lcm};
use crate::foundation::error::{VedError, VedResult};

/// Common clock of a frame rate and a sample rate.
///
/// Ticks per second is the rational least common multiple of the two rates,
/// `lcm(a, c) / gcd(b, d)` for rates `a/b` and `c/d` in lowest terms. Frames and samples are
/// then due every whole number of sub-ticks, so neither stream drifts against the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubTickClock {
    ticks_num: u64,
    ticks_den: u64,
    frame_period: u64,
    sample_period: u64,
    last: u64,
}

/// A sub-tick at which a frame, a sample, or both are due.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubTick {
    pub index: u64,
    /// Seconds since the clock's start.
    pub time: f64,
    pub frame: bool,
    pub sample: bool,
}

impl SubTickClock {
    /// Clock covering `[0, span]` seconds, both ends inclusive.
    pub fn new(fps: Fps, sample_rate: u32, span: f64) -> VedResult<Self> {
        if sample_rate == 0 {
            return Err(VedError::config("sample rate must be > 0"));
        }
        if !span.is_finite() || span < 0.0 {
            return Err(VedError::config(format!(
                "export span must be a non-negative number of seconds, got {span}"
            )));
        }
        let fps = Fps::new(fps.num, fps.den)?.reduced();
        let (a, b) = (u64::from(fps.num), u64::from(fps.den));
        let (c, d) = (u64::from(sample_rate), 1u64);

        let ticks_num = lcm(a, c)
            .ok_or_else(|| VedError::config("frame and sample rates overflow the sub-tick clock"))?;
        let ticks_den = gcd(b, d);
        let frame_period = (ticks_num / a) * (b / ticks_den);
        let sample_period = (ticks_num / c) * (d / ticks_den);

        let ticks = span * ticks_num as f64 / ticks_den as f64;
        // absorb float error so that e.g. 0.3s at 10fps still lands on its last frame
        let last = (ticks + ticks * 1e-12 + 1e-9).floor() as u64;

        Ok(Self {
            ticks_num,
            ticks_den,
            frame_period,
            sample_period,
            last,
        })
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_num as f64 / self.ticks_den as f64
    }

    pub fn frame_period(&self) -> u64 {
        self.frame_period
    }

    pub fn sample_period(&self) -> u64 {
        self.sample_period
    }

    /// Index of the final sub-tick.
    pub fn last_index(&self) -> u64 {
        self.last
    }

    pub fn frame_count(&self) -> u64 {
        self.last / self.frame_period + 1
    }

    pub fn sample_count(&self) -> u64 {
        self.last / self.sample_period + 1
    }

    pub fn time_of(&self, index: u64) -> f64 {
        index as f64 * self.ticks_den as f64 / self.ticks_num as f64
    }

    /// Every sub-tick with something due, in order.
    pub fn ticks(&self) -> SubTicks {
        SubTicks {
            clock: *self,
            next_frame: 0,
            next_sample: 0,
        }
    }
}

/// Iterator returned by [`SubTickClock::ticks`].
#[derive(Clone, Debug)]
pub struct SubTicks {
    clock: SubTickClock,
    next_frame: u64,
    next_sample: u64,
}

impl Iterator for SubTicks {
    type Item = SubTick;

    fn next(&mut self) -> Option<SubTick> {
        let index = self.next_frame.min(self.next_sample);
        if index > self.clock.last {
            return None;
        }
        let frame = index == self.next_frame;
        let sample = index == self.next_sample;
        if frame {
            self.next_frame = self.next_frame.saturating_add(self.clock.frame_period);
        }
        if sample {
            self.next_sample = self.next_sample.saturating_add(self.clock.sample_period);
        }
        Some(SubTick {
            index,
            time: self.clock.time_of(index),
            frame,
            sample,
        })
    }
}
