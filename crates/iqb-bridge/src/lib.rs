//! iqb-bridge: C ABI for the adaptive IQ balancer
//!
//! Hosts own balancers through opaque pointers:
//! - `iqb_balancer_create` / `iqb_balancer_create_with_config` allocate
//! - `iqb_balancer_process` corrects interleaved `float` I/Q pairs in place
//! - `iqb_balancer_destroy` releases
//!
//! Failures return null or -1 and leave a message for `iqb_last_error`.

mod error;
pub mod ffi;

pub use ffi::*;
pub use iqb_dsp::{IqBalancer, IqSample};
