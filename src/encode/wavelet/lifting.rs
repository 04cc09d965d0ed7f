// src/encode/wavelet/lifting.rs

//! CDF 9/7 by lifting: two predict/update pairs and a scaling step.

use super::Kernel1d;

/// Predict 1, update 1, predict 2, update 2.
const LIFT: [f64; 4] = [
    -1.5861343420693648,
    -0.0529801185718856,
    0.8829110755411875,
    0.4435068520511142,
];

const SCALE: f64 = 1.1496043988602418;

/// Odd samples from their even neighbours; the last one mirrors.
fn predict(data: &mut [f64], a: f64) {
    let n = data.len();
    let mut i = 1;
    while i + 2 < n {
        data[i] += a * (data[i - 1] + data[i + 1]);
        i += 2;
    }
    data[n - 1] += 2.0 * a * data[n - 2];
}

/// Even samples from their odd neighbours; the first one mirrors.
fn update(data: &mut [f64], a: f64) {
    let n = data.len();
    let mut i = 2;
    while i < n {
        data[i] += a * (data[i - 1] + data[i + 1]);
        i += 2;
    }
    data[0] += 2.0 * a * data[1];
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiftingKernel;

impl Kernel1d for LiftingKernel {
    fn forward_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>) {
        let n = data.len();
        if n < 2 {
            return;
        }
        debug_assert!(n % 2 == 0, "odd sequence length {}", n);
        predict(data, LIFT[0]);
        update(data, LIFT[1]);
        predict(data, LIFT[2]);
        update(data, LIFT[3]);

        temp.clear();
        temp.resize(n, 0.0);
        let half = n / 2;
        for (i, &v) in data.iter().enumerate() {
            if i % 2 == 1 {
                temp[half + i / 2] = v / SCALE;
            } else {
                temp[i / 2] = v * SCALE;
            }
        }
        data.copy_from_slice(temp);
    }

    fn inverse_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>) {
        let n = data.len();
        if n < 2 {
            return;
        }
        debug_assert!(n % 2 == 0, "odd sequence length {}", n);
        temp.clear();
        temp.resize(n, 0.0);
        let half = n / 2;
        for i in 0..half {
            temp[2 * i] = data[i] / SCALE;
            temp[2 * i + 1] = data[half + i] * SCALE;
        }
        data.copy_from_slice(temp);

        update(data, -LIFT[3]);
        predict(data, -LIFT[2]);
        update(data, -LIFT[1]);
        predict(data, -LIFT[0]);
    }
}
