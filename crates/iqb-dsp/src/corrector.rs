//! Phase/amplitude correction
//!
//! First-order model: `re' = re + p·im`, `im' = im + p·re` (both from the
//! original values), then `re' *= 1 + a`, `im' *= 1 - a`.
//!
//! [`Corrector`] ramps linearly from the last fully applied values to the
//! current target across each block, so a parameter refresh never produces a
//! step in the output.

use iqb_core::IqSample;
use serde::{Deserialize, Serialize};

/// Apply the correction model to one sample
#[inline]
pub fn correct(sample: IqSample, phase: f32, amplitude: f32) -> IqSample {
    let re = sample.re + phase * sample.im;
    let im = sample.im + phase * sample.re;
    IqSample::new(re * (1.0 + amplitude), im * (1.0 - amplitude))
}

/// Apply a constant correction to a whole block
pub fn correct_block(block: &mut [IqSample], phase: f32, amplitude: f32) {
    for sample in block.iter_mut() {
        *sample = correct(*sample, phase, amplitude);
    }
}

/// Target and last-applied correction values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corrector {
    phase: f32,
    last_phase: f32,
    amplitude: f32,
    last_amplitude: f32,
}

impl Corrector {
    pub fn new(phase: f32, amplitude: f32) -> Self {
        Self {
            phase,
            last_phase: phase,
            amplitude,
            last_amplitude: amplitude,
        }
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    #[inline]
    pub fn last_phase(&self) -> f32 {
        self.last_phase
    }

    #[inline]
    pub fn last_amplitude(&self) -> f32 {
        self.last_amplitude
    }

    /// New target, reached at the end of the next block
    pub fn set_target(&mut self, phase: f32, amplitude: f32) {
        self.phase = phase;
        self.amplitude = amplitude;
    }

    /// Correct a block, interpolating from last-applied to target
    pub fn apply(&mut self, block: &mut [IqSample]) {
        match block.len() {
            0 => {}
            1 => block[0] = correct(block[0], self.phase, self.amplitude),
            len => {
                let last = (len - 1) as f32;
                let scale = 1.0 / last;
                for (i, sample) in block.iter_mut().enumerate() {
                    let toward_target = i as f32;
                    let toward_last = last - toward_target;
                    let phase = (toward_target * self.phase + toward_last * self.last_phase) * scale;
                    let amplitude = (toward_target * self.amplitude
                        + toward_last * self.last_amplitude)
                        * scale;
                    *sample = correct(*sample, phase, amplitude);
                }
            }
        }

        self.last_phase = self.phase;
        self.last_amplitude = self.amplitude;
    }
}
