//! Mirror-bin correlation estimator
//!
//! Windows of `fft_bins` samples (50% overlap) are corrected with a trial
//! phase/amplitude, tapered and transformed. For every bin pair `(i, n - i)`,
//! mirror images of each other about DC, the product `X[i]·X[n - i]` is added
//! to both slots. The product is proportional to the image leakage, so its
//! imaginary part tracks the residual phase error and its real part the
//! residual amplitude error.
//!
//! The baseline trial also accumulates `|X[i]|²` per bin. The utility uses
//! the ratio of mirror energy to own energy to favour bins whose image is
//! informative.

use std::sync::Arc;

use iqb_core::{BalancerConfig, IQ_ZERO, IqSample, IqbResult};

use crate::corrector::correct_block;
use crate::try_zeroed;
use crate::window::SpectralTables;

/// Which accumulator a pass feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trial {
    /// Current correction values
    Baseline,
    /// Current values plus one step on each axis
    Perturbed,
}

/// Correlation and energy accumulators for one balancer
#[derive(Debug, Clone)]
pub struct CorrelationEstimator {
    tables: Arc<SpectralTables>,
    corr: Vec<IqSample>,
    corr_plus: Vec<IqSample>,
    boost: Vec<f32>,
    scratch: Vec<IqSample>,
    /// Baseline windows accumulated since the last reset
    windows: usize,
    center_bins_to_skip: usize,
    dc_ramp_bins: usize,
    energy_epsilon: f32,
}

impl CorrelationEstimator {
    pub fn new(tables: Arc<SpectralTables>, config: &BalancerConfig) -> IqbResult<Self> {
        let bins = tables.fft_bins();
        Ok(Self {
            corr: try_zeroed(bins, IQ_ZERO, "corr")?,
            corr_plus: try_zeroed(bins, IQ_ZERO, "corr_plus")?,
            boost: try_zeroed(bins, 0.0, "boost")?,
            scratch: try_zeroed(bins, IQ_ZERO, "fft scratch")?,
            tables,
            windows: 0,
            center_bins_to_skip: config.center_bins_to_skip,
            dc_ramp_bins: config.dc_ramp_bins(),
            energy_epsilon: config.energy_epsilon,
        })
    }

    /// Zero all accumulators (start of an integration cycle)
    pub fn reset(&mut self) {
        self.corr.fill(IQ_ZERO);
        self.corr_plus.fill(IQ_ZERO);
        self.boost.fill(0.0);
        self.windows = 0;
    }

    #[inline]
    pub fn corr(&self) -> &[IqSample] {
        &self.corr
    }

    #[inline]
    pub fn corr_plus(&self) -> &[IqSample] {
        &self.corr_plus
    }

    #[inline]
    pub fn boost(&self) -> &[f32] {
        &self.boost
    }

    /// Baseline windows accumulated since the last reset
    #[inline]
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Accumulate up to `max_windows` overlapping windows of `iq` at the given
    /// trial point. Returns the number of windows taken (0 when `iq` is
    /// shorter than one FFT).
    pub fn accumulate(
        &mut self,
        iq: &[IqSample],
        phase: f32,
        amplitude: f32,
        trial: Trial,
        max_windows: usize,
    ) -> usize {
        let n = self.scratch.len();
        let hop = n / 2;
        let mut taken = 0;
        let mut offset = 0;

        while taken < max_windows && offset + n <= iq.len() {
            self.scratch.copy_from_slice(&iq[offset..offset + n]);
            correct_block(&mut self.scratch, phase, amplitude);
            self.tables.transform(&mut self.scratch);

            let acc = match trial {
                Trial::Baseline => &mut self.corr,
                Trial::Perturbed => &mut self.corr_plus,
            };
            for i in 1..=n / 2 {
                let j = n - i;
                let product = self.scratch[i] * self.scratch[j];
                acc[i] += product;
                if i != j {
                    acc[j] += product;
                }
            }

            if trial == Trial::Baseline {
                for (energy, x) in self.boost.iter_mut().zip(&self.scratch) {
                    *energy += x.norm_sqr();
                }
            }

            taken += 1;
            offset += hop;
        }

        if trial == Trial::Baseline {
            self.windows += taken;
        }
        taken
    }

    /// Reduce one accumulator to the weighted scalar the controller drives
    /// toward zero
    pub fn utility(&self, trial: Trial, optimal_bin: usize) -> IqSample {
        let corr = match trial {
            Trial::Baseline => &self.corr,
            Trial::Perturbed => &self.corr_plus,
        };
        let n = corr.len();
        let center = n / 2;
        let inv_ramp = 1.0 / self.dc_ramp_bins as f32;

        let mut acc = IQ_ZERO;
        for i in 1..n {
            let distance = i.abs_diff(center);
            if distance <= self.center_bins_to_skip {
                continue;
            }

            let ramp = if distance < self.dc_ramp_bins {
                distance as f32 * inv_ramp
            } else {
                1.0
            };
            let boost = self.tables.boost(i.abs_diff(optimal_bin));
            let ratio = self.boost[n - i] / (self.boost[i] + self.energy_epsilon);

            acc += corr[i] * (ramp * boost * ratio);
        }
        acc
    }
}
