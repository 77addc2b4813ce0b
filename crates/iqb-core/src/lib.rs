//! iqb-core: Shared types for the IQ balance engine
//!
//! Sample type, error type and balancer configuration used by
//! `iqb-dsp` and `iqb-bridge`.

mod config;
mod error;

pub use config::*;
pub use error::*;

pub use num_complex::Complex32;

/// Complex baseband sample (I in `re`, Q in `im`)
///
/// `Complex32` is `#[repr(C)]`, so a slice of samples has the same layout as
/// interleaved `f32` I/Q pairs.
pub type IqSample = Complex32;

/// Zero-valued sample
pub const IQ_ZERO: IqSample = Complex32::new(0.0, 0.0);
