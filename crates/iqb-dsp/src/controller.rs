//! Newton-style step controller
//!
//! Each axis (phase, amplitude) is driven by a secant estimate of the root of
//! one component of the utility: the baseline trial gives `a`, the trial
//! perturbed by one step gives `b`, so `mu = a / (a - b)` is the number of
//! steps to the root. The step itself adapts: shrink near convergence, grow
//! when the root is many steps away.

use iqb_core::{BalancerConfig, StepConfig};

/// Shared adaptation constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonParams {
    pub step_increase: f32,
    pub step_decrease: f32,
    pub mu_shrink_below: f32,
    pub mu_grow_above: f32,
    pub max_mu: f32,
    pub denominator_epsilon: f32,
}

impl NewtonParams {
    pub fn from_config(config: &BalancerConfig) -> Self {
        Self {
            step_increase: config.step_increase,
            step_decrease: config.step_decrease,
            mu_shrink_below: config.mu_shrink_below,
            mu_grow_above: config.mu_grow_above,
            max_mu: config.max_mu,
            denominator_epsilon: config.denominator_epsilon,
        }
    }

    /// `a / (a - b)` with the denominator magnitude floored at epsilon
    #[inline]
    pub fn secant(&self, a: f32, b: f32) -> f32 {
        let mut denominator = a - b;
        if denominator.abs() < self.denominator_epsilon {
            denominator = if denominator < 0.0 {
                -self.denominator_epsilon
            } else {
                self.denominator_epsilon
            };
        }
        a / denominator
    }
}

/// Outcome of one axis update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisEstimate {
    /// Unclamped secant ratio
    pub mu: f32,
    /// Raw candidate: current value + step · clamped mu
    pub candidate: f32,
}

/// Adaptive step of one correction axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisController {
    step: f32,
    bounds: StepConfig,
}

impl AxisController {
    pub fn new(bounds: StepConfig) -> Self {
        Self {
            step: bounds.clamp_step(bounds.initial),
            bounds,
        }
    }

    /// Current signed step (perturbation of the second trial)
    #[inline]
    pub fn step(&self) -> f32 {
        self.step
    }

    #[inline]
    pub fn bounds(&self) -> StepConfig {
        self.bounds
    }

    /// Candidate for `current` from the two utility components. Pure; the
    /// step is only adapted by [`AxisController::adapt`].
    pub fn estimate(&self, current: f32, a: f32, b: f32, params: &NewtonParams) -> AxisEstimate {
        let mu = params.secant(a, b);
        let clamped = mu.clamp(-params.max_mu, params.max_mu);
        AxisEstimate {
            mu,
            candidate: current + self.step * clamped,
        }
    }

    /// Shrink or grow the step from the last secant ratio
    pub fn adapt(&mut self, mu: f32, params: &NewtonParams) {
        let magnitude = mu.abs();
        if magnitude < params.mu_shrink_below {
            self.step *= params.step_decrease;
        } else if magnitude > params.mu_grow_above {
            self.step *= params.step_increase;
        }
        self.step = self.bounds.clamp_step(self.step);
    }
}
