//! Balancer FFI
//!
//! Every function tolerates a null balancer pointer. A balancer must only be
//! used from one thread at a time; distinct balancers are independent.

use std::ffi::{CStr, CString, c_char};
use std::ptr;

use iqb_core::{BalancerConfig, IqbError};
use iqb_dsp::{IqBalancer, IqSample};

use crate::error::{clear_error, last_error, set_error};

fn into_handle(context: &str, result: Result<IqBalancer, IqbError>) -> *mut IqBalancer {
    match result {
        Ok(balancer) => Box::into_raw(Box::new(balancer)),
        Err(e) => {
            set_error(context, &e);
            ptr::null_mut()
        }
    }
}

fn count(name: &str, value: i32) -> Result<usize, IqbError> {
    usize::try_from(value)
        .map_err(|_| IqbError::InvalidParam(format!("{name} must be non-negative, got {value}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Create a balancer with default tuning and the given starting correction.
/// Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn iqb_balancer_create(initial_phase: f32, initial_amplitude: f32) -> *mut IqBalancer {
    clear_error();
    into_handle(
        "iqb_balancer_create",
        IqBalancer::new(BalancerConfig::with_initial(initial_phase, initial_amplitude)),
    )
}

/// Create a balancer from a JSON `BalancerConfig`; missing fields take their
/// defaults and a null pointer means all defaults. Returns null when the JSON
/// or the resulting configuration is invalid.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_create_with_config(config_json: *const c_char) -> *mut IqBalancer {
    clear_error();
    const CONTEXT: &str = "iqb_balancer_create_with_config";

    let config = if config_json.is_null() {
        BalancerConfig::default()
    } else {
        let c_str = unsafe { CStr::from_ptr(config_json) };
        let parsed = c_str
            .to_str()
            .map_err(|e| IqbError::InvalidParam(format!("config is not UTF-8: {e}")))
            .and_then(|s| {
                serde_json::from_str::<BalancerConfig>(s)
                    .map_err(|e| IqbError::InvalidParam(format!("config JSON: {e}")))
            });
        match parsed {
            Ok(config) => config,
            Err(e) => {
                set_error(CONTEXT, &e);
                return ptr::null_mut();
            }
        }
    };

    into_handle(CONTEXT, IqBalancer::new(config))
}

/// Destroy a balancer. Null is a no-op.
///
/// # Safety
/// `balancer` must be null or a pointer returned by one of the create
/// functions that has not been destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_destroy(balancer: *mut IqBalancer) {
    if !balancer.is_null() {
        drop(unsafe { Box::from_raw(balancer) });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TUNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Centre the estimator weighting on normalized frequency `w` (-0.5..0.5)
///
/// # Safety
/// `balancer` must be null or a live balancer pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_set_optimal_point(balancer: *mut IqBalancer, w: f32) {
    if let Some(balancer) = unsafe { balancer.as_mut() } {
        balancer.set_optimal_point(w);
    }
}

/// Change the estimation cadence. Returns 0 on success, -1 on a null
/// balancer or invalid counts (the previous cadence is kept).
///
/// # Safety
/// `balancer` must be null or a live balancer pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_configure(
    balancer: *mut IqBalancer,
    buffers_to_skip: i32,
    fft_integration: i32,
    correlation_integration: i32,
) -> i32 {
    clear_error();
    const CONTEXT: &str = "iqb_balancer_configure";

    let Some(balancer) = (unsafe { balancer.as_mut() }) else {
        set_error(CONTEXT, &IqbError::InvalidParam("null balancer".into()));
        return -1;
    };

    let result = count("buffers_to_skip", buffers_to_skip).and_then(|skip| {
        let fft = count("fft_integration", fft_integration)?;
        let corr = count("correlation_integration", correlation_integration)?;
        balancer.configure(skip, fft, corr)
    });
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_error(CONTEXT, &e);
            -1
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Correct `length` samples of `iq` in place. Null pointers or a zero length
/// touch nothing.
///
/// # Safety
/// `balancer` must be null or a live balancer pointer; `iq` must be null or
/// point to `length` writable samples not aliased during the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_process(balancer: *mut IqBalancer, iq: *mut IqSample, length: usize) {
    if iq.is_null() || length == 0 {
        return;
    }
    let Some(balancer) = (unsafe { balancer.as_mut() }) else {
        return;
    };

    let block = unsafe { std::slice::from_raw_parts_mut(iq, length) };
    balancer.process(block);
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTROSPECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Current phase correction (0 for a null balancer)
///
/// # Safety
/// `balancer` must be null or a live balancer pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_phase(balancer: *const IqBalancer) -> f32 {
    unsafe { balancer.as_ref() }.map_or(0.0, IqBalancer::phase)
}

/// Current amplitude correction (0 for a null balancer)
///
/// # Safety
/// `balancer` must be null or a live balancer pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_amplitude(balancer: *const IqBalancer) -> f32 {
    unsafe { balancer.as_ref() }.map_or(0.0, IqBalancer::amplitude)
}

/// Balancer state as JSON. Free with `iqb_free_string`. Null for a null
/// balancer.
///
/// # Safety
/// `balancer` must be null or a live balancer pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_balancer_state_json(balancer: *const IqBalancer) -> *mut c_char {
    let Some(balancer) = (unsafe { balancer.as_ref() }) else {
        return ptr::null_mut();
    };

    let json = match serde_json::to_string(&balancer.state()) {
        Ok(json) => json,
        Err(e) => {
            set_error(
                "iqb_balancer_state_json",
                &IqbError::InvalidParam(e.to_string()),
            );
            return ptr::null_mut();
        }
    };
    CString::new(json).map_or(ptr::null_mut(), CString::into_raw)
}

/// Message of the last failure on this thread, or null. Free with
/// `iqb_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn iqb_last_error() -> *mut c_char {
    last_error()
        .and_then(|message| CString::new(message).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Free a string returned by this library. Null is a no-op.
///
/// # Safety
/// `s` must be null or a string returned by this library, freed once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn iqb_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
