//! DC offset removal
//!
//! Two one-pole exponential trackers (I and Q). The tracker is updated before
//! subtraction, so the average used on a sample already includes it.

use iqb_core::IqSample;
use serde::{Deserialize, Serialize};

/// Two-channel exponential DC tracker
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DcCanceller {
    iavg: f32,
    qavg: f32,
    k: f32,
}

impl DcCanceller {
    pub fn new(k: f32) -> Self {
        Self {
            iavg: 0.0,
            qavg: 0.0,
            k,
        }
    }

    /// Remove the tracked DC from every sample in place
    pub fn process(&mut self, block: &mut [IqSample]) {
        let (mut iavg, mut qavg) = (self.iavg, self.qavg);
        let k = self.k;

        for sample in block.iter_mut() {
            iavg += k * (sample.re - iavg);
            qavg += k * (sample.im - qavg);
            sample.re -= iavg;
            sample.im -= qavg;
        }

        self.iavg = iavg;
        self.qavg = qavg;
    }

    #[inline]
    pub fn iavg(&self) -> f32 {
        self.iavg
    }

    #[inline]
    pub fn qavg(&self) -> f32 {
        self.qavg
    }
}
