// src/encode/wavelet/filter_bank.rs

//! Analysis/synthesis filter taps.

use std::f64::consts::SQRT_2;

use crate::utils::error::{Result, WaveletError};

/// Four equal-length, odd-length filters for one wavelet.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    pub lpf: Vec<f64>,
    pub hpf: Vec<f64>,
    pub ilpf: Vec<f64>,
    pub ihpf: Vec<f64>,
}

/// Half of the CDF 9/7 low-pass filter, outermost tap first.
const CDF97_L: [f64; 5] = [
    0.026748757411,
    -0.016864118443,
    -0.078223266529,
    0.266864118443,
    0.602949018236,
];

/// Half of the CDF 9/7 high-pass filter, outermost tap first.
const CDF97_H: [f64; 5] = [
    0.0,
    0.045635881557,
    -0.028771763114,
    -0.295635881557,
    0.557543526229,
];

/// Mirrors a half filter around its last tap, optionally negating odd taps.
fn mirror(half: &[f64; 5], alternate: bool, gain: f64) -> Vec<f64> {
    let sign = |i: usize| if alternate && i % 2 == 1 { -1.0 } else { 1.0 };
    (0..9)
        .map(|i| {
            let k = if i < 5 { i } else { 8 - i };
            sign(k) * half[k] * gain
        })
        .collect()
}

impl FilterBank {
    pub fn new(lpf: Vec<f64>, hpf: Vec<f64>, ilpf: Vec<f64>, ihpf: Vec<f64>) -> Result<Self> {
        let n = lpf.len();
        if n % 2 == 0 || hpf.len() != n || ilpf.len() != n || ihpf.len() != n {
            return Err(WaveletError::config(
                "filter bank needs four filters of the same odd length",
            ));
        }
        Ok(FilterBank { lpf, hpf, ilpf, ihpf })
    }

    /// Cohen-Daubechies-Feauveau 9/7, scaled to agree with the lifting kernel.
    pub fn cdf97() -> Self {
        // analysis output is decimated by 2, so synthesis taps carry the factor back
        let synthesis_gain = 2.0 / SQRT_2;
        FilterBank {
            lpf: mirror(&CDF97_L, false, SQRT_2),
            hpf: mirror(&CDF97_H, false, SQRT_2),
            ilpf: mirror(&CDF97_H, true, synthesis_gain),
            ihpf: mirror(&CDF97_L, true, synthesis_gain),
        }
    }

    /// Number of taps in each filter.
    #[inline]
    pub fn len(&self) -> usize {
        self.lpf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lpf.is_empty()
    }

    /// Samples of symmetric extension needed on each side.
    #[inline]
    pub fn half(&self) -> usize {
        self.lpf.len() / 2
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::cdf97()
    }
}
