//! Lookback smoothing of raw estimates
//!
//! Raw phase/amplitude candidates go into two circular histories whose
//! capacity is a power of two (index wrap by bitmask). After a reset the
//! first `warmup_cycles` candidates are published as-is. Then the averaging
//! depth starts at `min_lookback` and grows by one per refresh up to
//! `capacity - 1`; the published value is the mean of the new candidate and
//! the `depth` entries written before it.

use iqb_core::{BalancerConfig, IqbError, IqbResult};

use crate::try_zeroed;

#[derive(Debug, Clone, PartialEq)]
pub struct LookbackFilter {
    raw_phases: Vec<f32>,
    raw_amplitudes: Vec<f32>,
    mask: usize,
    cursor: usize,
    /// Earlier entries averaged with the newest one
    depth: usize,
    /// Refreshes since the last reset, saturating at `warmup_cycles`
    warmup: usize,
    warmup_cycles: usize,
    min_lookback: usize,
}

impl LookbackFilter {
    pub fn new(config: &BalancerConfig) -> IqbResult<Self> {
        let capacity = config.lookback_capacity;
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(IqbError::InvalidLookback(capacity));
        }

        Ok(Self {
            raw_phases: try_zeroed(capacity, 0.0, "raw_phases")?,
            raw_amplitudes: try_zeroed(capacity, 0.0, "raw_amplitudes")?,
            mask: capacity - 1,
            cursor: 0,
            depth: 0,
            warmup: 0,
            warmup_cycles: config.warmup_cycles,
            min_lookback: config.min_lookback.clamp(1, capacity - 1),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn warmup(&self) -> usize {
        self.warmup
    }

    #[inline]
    pub fn is_warming_up(&self) -> bool {
        self.warmup < self.warmup_cycles
    }

    /// Restart the warm-up ramp. History is kept but not read until the
    /// depth has grown back over it.
    pub fn reset_warmup(&mut self) {
        self.warmup = 0;
        self.depth = 0;
    }

    /// Record raw candidates, return the values to publish
    pub fn push(&mut self, raw_phase: f32, raw_amplitude: f32) -> (f32, f32) {
        let slot = self.cursor;
        self.raw_phases[slot] = raw_phase;
        self.raw_amplitudes[slot] = raw_amplitude;
        self.cursor = (slot + 1) & self.mask;

        if self.warmup < self.warmup_cycles {
            self.warmup += 1;
            self.depth = 0;
            return (raw_phase, raw_amplitude);
        }

        self.depth = if self.depth == 0 {
            self.min_lookback
        } else {
            (self.depth + 1).min(self.mask)
        };

        let mut phase_sum = 0.0f32;
        let mut amplitude_sum = 0.0f32;
        for back in (1..=self.depth).rev() {
            let index = slot.wrapping_sub(back) & self.mask;
            phase_sum += self.raw_phases[index];
            amplitude_sum += self.raw_amplitudes[index];
        }
        phase_sum += raw_phase;
        amplitude_sum += raw_amplitude;

        let scale = 1.0 / (self.depth + 1) as f32;
        (phase_sum * scale, amplitude_sum * scale)
    }
}
