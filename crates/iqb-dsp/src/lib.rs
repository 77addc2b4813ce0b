//! iqb-dsp: Adaptive IQ balance engine
//!
//! Removes DC offset and estimates/cancels phase and amplitude imbalance on a
//! streaming complex baseband signal, in place.
//!
//! ## Modules
//! - `balancer` - `IqBalancer`, the per-stream engine
//! - `window` - shared taper, boost window and FFT plan per FFT length
//! - `fft` - in-place radix-2 FFT with centered output
//! - `dc` - two-channel exponential DC canceller
//! - `correlation` - mirror-bin correlation and energy accumulation, utility
//! - `controller` - secant direction estimate and adaptive steps
//! - `lookback` - warm-up and moving-average smoothing of raw estimates
//! - `corrector` - first-order correction model, interpolated per block

pub mod balancer;
pub mod controller;
pub mod correlation;
pub mod corrector;
pub mod dc;
pub mod fft;
pub mod lookback;
pub mod window;

pub use balancer::{BalancerState, Estimate, IqBalancer};
pub use iqb_core::{BalancerConfig, IqSample, IqbError, IqbResult, StepConfig};

/// Allocate a filled working buffer, reporting allocation failure as an error
pub(crate) fn try_zeroed<T: Clone>(len: usize, value: T, what: &str) -> IqbResult<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| IqbError::Allocation(format!("{what} ({len} entries): {e}")))?;
    buffer.resize(len, value);
    Ok(buffer)
}
