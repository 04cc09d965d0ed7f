// src/encode/wavelet/direct.rs

//! Convolution kernel over a symmetrically extended sequence.

use super::Kernel1d;
use super::filter_bank::FilterBank;

#[derive(Debug, Clone, Default)]
pub struct DirectKernel {
    filter: FilterBank,
}

impl DirectKernel {
    pub fn new(filter: FilterBank) -> Self {
        DirectKernel { filter }
    }

    pub fn filter(&self) -> &FilterBank {
        &self.filter
    }

    /// Copies `x` into the middle of `temp`, leaving `half()` slots on the
    /// left and `half() + 1` on the right. With `interleave`, the low half
    /// and high half of `x` are zipped together.
    pub(crate) fn load(&self, x: &[f64], interleave: bool, temp: &mut Vec<f64>) {
        let n = x.len();
        let h = self.filter.half();
        temp.clear();
        temp.resize(n + 2 * h + 1, 0.0);
        if interleave {
            let (low, high) = x.split_at(n / 2);
            for (i, (&l, &hi)) in low.iter().zip(high).enumerate() {
                temp[h + 2 * i] = l;
                temp[h + 2 * i + 1] = hi;
            }
        } else {
            temp[h..h + n].copy_from_slice(x);
        }
    }

    /// Fills the borders of a loaded `temp` holding `n` samples.
    ///
    /// A border with no halo is mirrored around the first or last sample.
    /// `left` supplies `half()` samples, `right` supplies `half() + 1`.
    pub(crate) fn extend(&self, temp: &mut [f64], n: usize, left: Option<&[f64]>, right: Option<&[f64]>) {
        let h = self.filter.half();
        let c = h + n - 1;
        for i in 1..=h {
            let l = h - i;
            temp[l] = match left {
                Some(halo) => halo[l],
                None => temp[h + i],
            };
            let r = c + i;
            temp[r] = match right {
                Some(halo) => halo[r - n - h],
                None => temp[c - i],
            };
        }
        temp[c + h + 1] = match right {
            Some(halo) => halo[h],
            None => temp[n - 2],
        };
    }

    /// Analysis filtering of an extended sequence into low then high bands.
    pub(crate) fn convolve_forward(&self, temp: &[f64], out: &mut [f64]) {
        let f = &self.filter;
        let len = out.len() / 2;
        for i in 0..len {
            let window = &temp[2 * i..2 * i + f.len() + 1];
            out[i] = f.lpf.iter().zip(window).map(|(a, b)| a * b).sum();
            out[len + i] = f.hpf.iter().zip(&window[1..]).map(|(a, b)| a * b).sum();
        }
    }

    /// Synthesis filtering of an interleaved, extended sequence.
    pub(crate) fn convolve_inverse(&self, temp: &[f64], out: &mut [f64]) {
        let f = &self.filter;
        for (i, value) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for d in 0..f.len() {
                // odd positions of the upsampled signal come from the high band
                let tap = if (i + d) & 1 == 1 { f.ihpf[d] } else { f.ilpf[d] };
                acc += tap * temp[i + d];
            }
            *value = acc;
        }
    }
}

impl Kernel1d for DirectKernel {
    fn forward_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>) {
        let n = data.len();
        if n < 2 {
            return;
        }
        debug_assert!(n % 2 == 0, "odd sequence length {}", n);
        self.load(data, false, temp);
        self.extend(temp, n, None, None);
        self.convolve_forward(temp, data);
    }

    fn inverse_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>) {
        let n = data.len();
        if n < 2 {
            return;
        }
        debug_assert!(n % 2 == 0, "odd sequence length {}", n);
        self.load(data, true, temp);
        self.extend(temp, n, None, None);
        self.convolve_inverse(temp, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_extension_mirrors_without_repeating_edge() {
        let k = DirectKernel::default();
        let mut temp = Vec::new();
        let x: Vec<f64> = (0..8).map(f64::from).collect();
        k.load(&x, false, &mut temp);
        k.extend(&mut temp, 8, None, None);
        assert_eq!(&temp[..4], &[4.0, 3.0, 2.0, 1.0]);
        assert_eq!(&temp[4..12], x.as_slice());
        assert_eq!(&temp[12..], &[6.0, 5.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_halos_replace_mirroring() {
        let k = DirectKernel::default();
        let mut temp = Vec::new();
        k.load(&[1.0; 8], false, &mut temp);
        k.extend(&mut temp, 8, Some(&[-1.0, -2.0, -3.0, -4.0]), Some(&[5.0, 6.0, 7.0, 8.0, 9.0]));
        assert_eq!(&temp[..4], &[-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(&temp[12..], &[5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_constant_signal() {
        let k = DirectKernel::default();
        let mut temp = Vec::new();
        let mut data = vec![3.0; 16];
        k.forward_1d_single(&mut data, &mut temp);
        for &v in &data[..8] {
            assert_relative_eq!(v, 3.0 * std::f64::consts::SQRT_2, epsilon = 1e-9);
        }
        for &v in &data[8..] {
            assert_relative_eq!(v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_round_trip() {
        let k = DirectKernel::default();
        let mut temp = Vec::new();
        let orig: Vec<f64> = (0..32).map(|i| (i as f64 * 0.7).sin() * 10.0 + i as f64).collect();
        let mut data = orig.clone();
        k.forward_1d_single(&mut data, &mut temp);
        k.inverse_1d_single(&mut data, &mut temp);
        for (a, b) in orig.iter().zip(&data) {
            assert_relative_eq!(a, b, epsilon = 1e-4, max_relative = 1e-4);
        }
    }
}
