//! Shared spectral tables
//!
//! The taper, the boost window and the FFT plan depend only on the FFT
//! length. They are built once per length and handed out as `Arc`s, so every
//! balancer with the same length reads the same immutable tables.
//!
//! # Design
//! The cache is a `OnceLock` holding a mutex-guarded map. Building happens
//! with the lock held, so two instances created concurrently on different
//! threads can never both build (or half-read) the same table.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use iqb_core::{IqSample, IqbResult, validate_fft_bins};

use crate::fft::Radix2Fft;

// ============ Constants ============

/// Floor of the boost window, relative to its peak
pub const BOOST_FACTOR: f64 = 100_000.0;

/// Boost window width is `fft_bins / BOOST_WIDTH_DIVISOR` bins
const BOOST_WIDTH_DIVISOR: usize = 25;

/// 7-term cosine-sum taper coefficients
const TAPER: [f64; 7] = [
    0.27105140069342,
    -0.43329793923448,
    0.21812299954311,
    -0.06592544638803,
    0.01081174209837,
    -0.00077658482522,
    0.00001388721735,
];

// ============ Tables ============

/// Immutable per-length tables
#[derive(Debug)]
pub struct SpectralTables {
    window: Vec<f32>,
    boost_window: Vec<f32>,
    fft: Radix2Fft,
}

impl SpectralTables {
    /// Build tables for `fft_bins`. Prefer [`SpectralTables::shared`].
    pub fn build(fft_bins: usize) -> IqbResult<Self> {
        validate_fft_bins(fft_bins)?;

        let span = (fft_bins - 1) as f64;
        let window = (0..fft_bins)
            .map(|i| {
                let x = 2.0 * PI * i as f64 / span;
                TAPER
                    .iter()
                    .enumerate()
                    .map(|(k, c)| c * (k as f64 * x).cos())
                    .sum::<f64>() as f32
            })
            .collect();

        let width = (fft_bins / BOOST_WIDTH_DIVISOR) as f64;
        let boost_window = (0..fft_bins)
            .map(|distance| {
                let x = distance as f64 / width;
                (1.0 / BOOST_FACTOR + (-x * x).exp()) as f32
            })
            .collect();

        Ok(Self {
            window,
            boost_window,
            fft: Radix2Fft::new(fft_bins)?,
        })
    }

    /// Tables for `fft_bins`, built on first use and cached process-wide
    pub fn shared(fft_bins: usize) -> IqbResult<Arc<Self>> {
        static CACHE: OnceLock<Mutex<HashMap<usize, Arc<SpectralTables>>>> = OnceLock::new();

        let mut cache = CACHE.get_or_init(|| Mutex::new(HashMap::new())).lock();
        if let Some(tables) = cache.get(&fft_bins) {
            return Ok(Arc::clone(tables));
        }

        let tables = Arc::new(Self::build(fft_bins)?);
        log::debug!("built spectral tables for {fft_bins} bins");
        cache.insert(fft_bins, Arc::clone(&tables));
        Ok(tables)
    }

    #[inline]
    pub fn fft_bins(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Boost weight for a bin `distance` away from the optimal bin
    #[inline]
    pub fn boost(&self, distance: usize) -> f32 {
        self.boost_window[distance]
    }

    #[inline]
    pub fn fft(&self) -> &Radix2Fft {
        &self.fft
    }

    /// Taper exactly `fft_bins` samples in place
    pub fn apply_window(&self, block: &mut [IqSample]) {
        debug_assert_eq!(block.len(), self.window.len());
        for (sample, &w) in block.iter_mut().zip(&self.window) {
            sample.re *= w;
            sample.im *= w;
        }
    }

    /// Taper then transform (centered spectrum)
    pub fn transform(&self, block: &mut [IqSample]) {
        self.apply_window(block);
        self.fft.process(block);
    }
}
