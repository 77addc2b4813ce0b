//! Fixed-size radix-2 FFT with centered output
//!
//! Iterative decimation-in-time transform working in place on `IqSample`
//! blocks. After the butterflies the two halves are swapped, so index 0 is the
//! negative-Nyquist edge and index `n / 2` is DC.

use std::f64::consts::PI;

use iqb_core::{IqSample, IqbResult, validate_fft_bins};

/// Precomputed radix-2 transform of one length
#[derive(Debug, Clone)]
pub struct Radix2Fft {
    len: usize,
    log2_len: u32,
    /// e^(-2πik/n) for k in 0..n/2
    twiddles: Vec<IqSample>,
}

impl Radix2Fft {
    /// Plan a transform. `len` must be a power of two in the supported range.
    pub fn new(len: usize) -> IqbResult<Self> {
        validate_fft_bins(len)?;

        let twiddles = (0..len / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / len as f64;
                IqSample::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();

        Ok(Self {
            len,
            log2_len: len.trailing_zeros(),
            twiddles,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transform exactly `len()` samples in place, centered layout
    pub fn process(&self, buffer: &mut [IqSample]) {
        debug_assert_eq!(buffer.len(), self.len);
        let buffer = &mut buffer[..self.len];

        self.bit_reverse(buffer);
        self.butterflies(buffer);

        // Swap halves: DC moves to the middle
        buffer.rotate_left(self.len / 2);
    }

    fn bit_reverse(&self, buffer: &mut [IqSample]) {
        let shift = usize::BITS - self.log2_len;
        for i in 1..self.len - 1 {
            let j = i.reverse_bits() >> shift;
            if i < j {
                buffer.swap(i, j);
            }
        }
    }

    fn butterflies(&self, buffer: &mut [IqSample]) {
        let n = self.len;
        let mut half = 1;
        while half < n {
            let span = half * 2;
            let stride = n / span;
            for start in (0..n).step_by(span) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let top = start + k;
                    let bottom = top + half;
                    let t = w * buffer[bottom];
                    buffer[bottom] = buffer[top] - t;
                    buffer[top] += t;
                }
            }
            half = span;
        }
    }
}
