//! Adaptive IQ balancer
//!
//! Per `process` call:
//! 1. DC cancellation over the whole block
//! 2. every `buffers_to_skip` calls, one estimator pass (baseline and
//!    perturbed trial); every `correlation_integration` passes the
//!    accumulated correlations are reduced and the target refreshed
//! 3. interpolated phase/amplitude correction over the whole block
//!
//! An instance is single-writer: `process` takes `&mut self` and there is no
//! internal locking. Distinct instances share only the immutable tables.

use serde::Serialize;

use iqb_core::{BalancerConfig, IqSample, IqbResult, validate_integration};

use crate::controller::{AxisController, NewtonParams};
use crate::correlation::{CorrelationEstimator, Trial};
use crate::corrector::Corrector;
use crate::dc::DcCanceller;
use crate::lookback::LookbackFilter;
use crate::window::SpectralTables;

/// One refreshed estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub phase_mu: f32,
    pub amplitude_mu: f32,
    pub raw_phase: f32,
    pub raw_amplitude: f32,
    /// Published target after lookback smoothing
    pub phase: f32,
    pub amplitude: f32,
    pub lookback_depth: usize,
}

/// Snapshot of the mutable state of a balancer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancerState {
    pub iavg: f32,
    pub qavg: f32,
    pub phase: f32,
    pub last_phase: f32,
    pub phase_step: f32,
    pub amplitude: f32,
    pub last_amplitude: f32,
    pub amplitude_step: f32,
    pub optimal_bin: usize,
    pub warmup: usize,
    pub lookback_depth: usize,
    pub integrated_blocks: usize,
    pub skipped_blocks: usize,
}

/// IQ imbalance corrector for one continuous sample stream
#[derive(Debug, Clone)]
pub struct IqBalancer {
    config: BalancerConfig,
    dc: DcCanceller,
    corrector: Corrector,
    estimator: CorrelationEstimator,
    phase_axis: AxisController,
    amplitude_axis: AxisController,
    newton: NewtonParams,
    lookback: LookbackFilter,
    optimal_bin: usize,
    /// Estimator passes in the current integration cycle
    integrated: usize,
    /// Blocks since the last estimator pass
    skipped: usize,
    last_estimate: Option<Estimate>,
}

impl IqBalancer {
    /// Create a balancer. Fails on an invalid configuration or when a working
    /// buffer cannot be allocated.
    pub fn new(config: BalancerConfig) -> IqbResult<Self> {
        config.validate()?;

        let tables = SpectralTables::shared(config.fft_bins)?;
        let estimator = CorrelationEstimator::new(tables, &config)?;
        let lookback = LookbackFilter::new(&config)?;

        log::debug!(
            "iq balancer: {} bins, skip {}, fft x{}, corr x{}",
            config.fft_bins,
            config.buffers_to_skip,
            config.fft_integration,
            config.correlation_integration
        );

        Ok(Self {
            dc: DcCanceller::new(config.dc_time_const),
            corrector: Corrector::new(config.initial_phase, config.initial_amplitude),
            estimator,
            phase_axis: AxisController::new(config.phase_step),
            amplitude_axis: AxisController::new(config.amplitude_step),
            newton: NewtonParams::from_config(&config),
            lookback,
            optimal_bin: config.fft_bins / 2,
            integrated: 0,
            skipped: 0,
            last_estimate: None,
            config,
        })
    }

    pub fn with_defaults() -> IqbResult<Self> {
        Self::new(BalancerConfig::default())
    }

    #[inline]
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    #[inline]
    pub fn fft_bins(&self) -> usize {
        self.config.fft_bins
    }

    #[inline]
    pub fn optimal_bin(&self) -> usize {
        self.optimal_bin
    }

    #[inline]
    pub fn last_estimate(&self) -> Option<&Estimate> {
        self.last_estimate.as_ref()
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.corrector.phase()
    }

    #[inline]
    pub fn amplitude(&self) -> f32 {
        self.corrector.amplitude()
    }

    pub fn state(&self) -> BalancerState {
        BalancerState {
            iavg: self.dc.iavg(),
            qavg: self.dc.qavg(),
            phase: self.corrector.phase(),
            last_phase: self.corrector.last_phase(),
            phase_step: self.phase_axis.step(),
            amplitude: self.corrector.amplitude(),
            last_amplitude: self.corrector.last_amplitude(),
            amplitude_step: self.amplitude_axis.step(),
            optimal_bin: self.optimal_bin,
            warmup: self.lookback.warmup(),
            lookback_depth: self.lookback.depth(),
            integrated_blocks: self.integrated,
            skipped_blocks: self.skipped,
        }
    }

    /// Centre the utility weighting on a normalized frequency `w` in
    /// [-0.5, 0.5] (fraction of the sample rate). Values outside are folded
    /// to their magnitude and clamped to 0.5; NaN means DC. Restarts the
    /// lookback warm-up.
    pub fn set_optimal_point(&mut self, w: f32) {
        let w = if w.is_nan() {
            0.0
        } else if w.abs() > 0.5 {
            w.abs().min(0.5)
        } else {
            w
        };

        let bins = self.config.fft_bins;
        let bin = (bins as f32 * (0.5 + w)).round() as usize;
        self.optimal_bin = bin.min(bins - 1);
        self.lookback.reset_warmup();

        log::debug!("optimal point {w} -> bin {}", self.optimal_bin);
    }

    /// Change the estimation cadence at runtime. Restarts the current
    /// integration cycle.
    pub fn configure(
        &mut self,
        buffers_to_skip: usize,
        fft_integration: usize,
        correlation_integration: usize,
    ) -> IqbResult<()> {
        validate_integration(buffers_to_skip, fft_integration, correlation_integration)?;

        self.config.buffers_to_skip = buffers_to_skip;
        self.config.fft_integration = fft_integration;
        self.config.correlation_integration = correlation_integration;
        self.integrated = 0;
        self.skipped = 0;
        Ok(())
    }

    /// Correct a block in place. Any length is accepted; blocks shorter than
    /// one FFT add nothing to the estimate but are still corrected.
    pub fn process(&mut self, iq: &mut [IqSample]) {
        self.dc.process(iq);

        self.skipped += 1;
        if self.skipped >= self.config.buffers_to_skip {
            self.skipped = 0;
            self.estimate(iq);
        }

        self.corrector.apply(iq);
    }

    fn estimate(&mut self, iq: &[IqSample]) {
        if self.integrated == 0 {
            self.estimator.reset();
        }

        let phase = self.corrector.phase();
        let amplitude = self.corrector.amplitude();
        let windows = self.config.fft_integration;

        self.estimator
            .accumulate(iq, phase, amplitude, Trial::Baseline, windows);
        self.estimator.accumulate(
            iq,
            phase + self.phase_axis.step(),
            amplitude + self.amplitude_axis.step(),
            Trial::Perturbed,
            windows,
        );

        self.integrated += 1;
        if self.integrated < self.config.correlation_integration {
            return;
        }
        self.integrated = 0;

        if self.estimator.windows() == 0 {
            log::trace!("no full FFT window this cycle, estimate skipped");
            return;
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        let a = self.estimator.utility(Trial::Baseline, self.optimal_bin);
        let b = self.estimator.utility(Trial::Perturbed, self.optimal_bin);
        if !(a.is_finite() && b.is_finite()) {
            log::warn!("non-finite utility ({a}, {b}), estimate discarded");
            return;
        }

        let phase_est = self
            .phase_axis
            .estimate(self.corrector.phase(), a.im, b.im, &self.newton);
        let amplitude_est =
            self.amplitude_axis
                .estimate(self.corrector.amplitude(), a.re, b.re, &self.newton);
        if !(phase_est.candidate.is_finite() && amplitude_est.candidate.is_finite()) {
            log::warn!("non-finite candidate, estimate discarded");
            return;
        }

        self.phase_axis.adapt(phase_est.mu, &self.newton);
        self.amplitude_axis.adapt(amplitude_est.mu, &self.newton);

        let (phase, amplitude) = self
            .lookback
            .push(phase_est.candidate, amplitude_est.candidate);
        self.corrector.set_target(phase, amplitude);

        let estimate = Estimate {
            phase_mu: phase_est.mu,
            amplitude_mu: amplitude_est.mu,
            raw_phase: phase_est.candidate,
            raw_amplitude: amplitude_est.candidate,
            phase,
            amplitude,
            lookback_depth: self.lookback.depth(),
        };
        log::debug!(
            "estimate: phase {:.6} (raw {:.6}, mu {:.3}, step {:.2e}) \
             amplitude {:.6} (raw {:.6}, mu {:.3}, step {:.2e}) depth {}",
            estimate.phase,
            estimate.raw_phase,
            estimate.phase_mu,
            self.phase_axis.step(),
            estimate.amplitude,
            estimate.raw_amplitude,
            estimate.amplitude_mu,
            self.amplitude_axis.step(),
            estimate.lookback_depth
        );
        self.last_estimate = Some(estimate);
    }
}
