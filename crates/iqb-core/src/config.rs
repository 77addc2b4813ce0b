//! Balancer configuration
//!
//! All tuning constants of the estimator live here so that an instance can be
//! built from JSON (see `iqb-bridge`) or from code. Every field has a default;
//! `validate()` is run by the balancer constructor.

use serde::{Deserialize, Serialize};

use crate::{IqbError, IqbResult};

// ============================================================================
// LIMITS
// ============================================================================

/// Minimum FFT size
pub const MIN_FFT_BINS: usize = 64;
/// Maximum FFT size
pub const MAX_FFT_BINS: usize = 65536;
/// Default FFT size
pub const DEFAULT_FFT_BINS: usize = 1024;

/// Validate an FFT length
pub fn validate_fft_bins(fft_bins: usize) -> IqbResult<()> {
    if fft_bins.is_power_of_two() && (MIN_FFT_BINS..=MAX_FFT_BINS).contains(&fft_bins) {
        Ok(())
    } else {
        Err(IqbError::InvalidFftSize(fft_bins))
    }
}

// ============ Step Bounds ============

/// Starting magnitude and bounds of one adaptive step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            initial: 1e-3,
            min: 1e-5,
            max: 1e-2,
        }
    }
}

impl StepConfig {
    fn validate(&self, name: &str) -> IqbResult<()> {
        let finite = self.initial.is_finite() && self.min.is_finite() && self.max.is_finite();
        if !finite || self.min <= 0.0 || self.min > self.initial || self.initial > self.max {
            return Err(IqbError::InvalidParam(format!(
                "{name}: need 0 < min <= initial <= max, got {self:?}"
            )));
        }
        Ok(())
    }

    /// Clamp a signed step so its magnitude stays within [min, max]
    #[inline]
    pub fn clamp_step(&self, step: f32) -> f32 {
        let sign = if step < 0.0 { -1.0 } else { 1.0 };
        sign * step.abs().clamp(self.min, self.max)
    }
}

// ============ Balancer Config ============

/// Tuning of one balancer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// FFT length (power of two)
    pub fft_bins: usize,
    /// Maximum windows per estimator pass (50% overlap)
    pub fft_integration: usize,
    /// Estimator passes accumulated before a refresh
    pub correlation_integration: usize,
    /// Estimation runs on every n-th processed block
    pub buffers_to_skip: usize,
    /// One-pole DC tracker coefficient
    pub dc_time_const: f32,
    pub initial_phase: f32,
    pub initial_amplitude: f32,
    pub phase_step: StepConfig,
    pub amplitude_step: StepConfig,
    pub step_increase: f32,
    pub step_decrease: f32,
    /// |mu| below this shrinks the step
    pub mu_shrink_below: f32,
    /// |mu| above this grows the step
    pub mu_grow_above: f32,
    /// Clamp of a single Newton estimate
    pub max_mu: f32,
    /// Lookback history capacity (power of two)
    pub lookback_capacity: usize,
    /// Refreshes applied unaveraged after a reset
    pub warmup_cycles: usize,
    /// Averaging depth right after warm-up
    pub min_lookback: usize,
    /// Bins around DC excluded from the utility
    pub center_bins_to_skip: usize,
    pub energy_epsilon: f32,
    pub denominator_epsilon: f32,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            fft_bins: DEFAULT_FFT_BINS,
            fft_integration: 8,
            correlation_integration: 8,
            buffers_to_skip: 2,
            dc_time_const: 1e-4,
            initial_phase: 0.0,
            initial_amplitude: 0.0,
            phase_step: StepConfig::default(),
            amplitude_step: StepConfig::default(),
            step_increase: 1.1,
            step_decrease: 0.9,
            mu_shrink_below: 1.0,
            mu_grow_above: 10.0,
            max_mu: 20.0,
            lookback_capacity: 16,
            warmup_cycles: 4,
            min_lookback: 2,
            center_bins_to_skip: 2,
            energy_epsilon: 1e-9,
            denominator_epsilon: 1e-12,
        }
    }
}

impl BalancerConfig {
    /// Defaults with a given starting correction
    pub fn with_initial(initial_phase: f32, initial_amplitude: f32) -> Self {
        Self {
            initial_phase,
            initial_amplitude,
            ..Self::default()
        }
    }

    /// Width of the linear weight ramp next to DC
    #[inline]
    pub fn dc_ramp_bins(&self) -> usize {
        (self.fft_bins / 32).max(1)
    }

    /// Check every invariant the balancer relies on
    pub fn validate(&self) -> IqbResult<()> {
        validate_fft_bins(self.fft_bins)?;

        if self.lookback_capacity < 2 || !self.lookback_capacity.is_power_of_two() {
            return Err(IqbError::InvalidLookback(self.lookback_capacity));
        }
        if self.min_lookback == 0
            || self.min_lookback > self.warmup_cycles
            || self.min_lookback >= self.lookback_capacity
        {
            return Err(IqbError::InvalidParam(format!(
                "min_lookback {} must be in 1..=warmup_cycles ({}) and below capacity ({})",
                self.min_lookback, self.warmup_cycles, self.lookback_capacity
            )));
        }

        validate_integration(
            self.buffers_to_skip,
            self.fft_integration,
            self.correlation_integration,
        )?;

        if !(self.dc_time_const > 0.0 && self.dc_time_const <= 1.0) {
            return Err(IqbError::InvalidParam(format!(
                "dc_time_const must be in (0, 1], got {}",
                self.dc_time_const
            )));
        }
        if !self.initial_phase.is_finite() || !self.initial_amplitude.is_finite() {
            return Err(IqbError::InvalidParam(
                "initial correction must be finite".into(),
            ));
        }

        self.phase_step.validate("phase_step")?;
        self.amplitude_step.validate("amplitude_step")?;

        if !(self.step_increase >= 1.0 && self.step_increase.is_finite()) {
            return Err(IqbError::InvalidParam(format!(
                "step_increase must be >= 1, got {}",
                self.step_increase
            )));
        }
        if !(self.step_decrease > 0.0 && self.step_decrease <= 1.0) {
            return Err(IqbError::InvalidParam(format!(
                "step_decrease must be in (0, 1], got {}",
                self.step_decrease
            )));
        }
        if !(self.mu_shrink_below >= 0.0 && self.mu_shrink_below <= self.mu_grow_above) {
            return Err(IqbError::InvalidParam(
                "mu_shrink_below must be in [0, mu_grow_above]".into(),
            ));
        }
        if !(self.max_mu > 0.0 && self.max_mu.is_finite()) {
            return Err(IqbError::InvalidParam(format!(
                "max_mu must be positive, got {}",
                self.max_mu
            )));
        }
        if self.center_bins_to_skip >= self.fft_bins / 2 {
            return Err(IqbError::InvalidParam(format!(
                "center_bins_to_skip {} leaves no usable bins",
                self.center_bins_to_skip
            )));
        }
        if !(self.energy_epsilon > 0.0) || !(self.denominator_epsilon > 0.0) {
            return Err(IqbError::InvalidParam("epsilons must be positive".into()));
        }

        Ok(())
    }
}

/// Validate the runtime-adjustable integration counts
pub fn validate_integration(
    buffers_to_skip: usize,
    fft_integration: usize,
    correlation_integration: usize,
) -> IqbResult<()> {
    if buffers_to_skip == 0 || fft_integration == 0 || correlation_integration == 0 {
        return Err(IqbError::InvalidParam(format!(
            "integration counts must be non-zero (skip={buffers_to_skip}, \
             fft={fft_integration}, corr={correlation_integration})"
        )));
    }
    Ok(())
}
