use std::f32::consts::{PI, SQRT_2};

/********** First order low-pass filter **********/

#[derive(Debug, Clone, Copy)]
pub struct LowPass {
    alpha: f32,
    value: f32,
}

impl LowPass {
    /// `cutoff` [Hz], `period` [s]. A non-positive cutoff disables filtering.
    pub fn new(cutoff: f32, period: f32) -> Self {
        let alpha = if cutoff <= 0.0 {
            1.0
        } else {
            let rc = 1.0 / (2.0 * PI * cutoff);
            period / (rc + period)
        };
        LowPass { alpha, value: 0.0 }
    }

    pub fn filter(&mut self, input: f32) -> f32 {
        self.value += self.alpha * (input - self.value);
        self.value
    }

    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }
}

/********** Second order Butterworth low-pass filter **********/

// Bilinear transform with frequency pre-warping.
#[derive(Debug, Clone, Copy)]
pub struct Butterworth2 {
    b: [f32; 3],
    a: [f32; 2],
    x: [f32; 2],
    y: [f32; 2],
}

impl Butterworth2 {
    /// `cutoff` [Hz], `period` [s]. The cutoff is clamped below Nyquist.
    pub fn new(cutoff: f32, period: f32) -> Self {
        let nyquist = 0.5 / period;
        let cutoff = cutoff.max(1e-3).min(nyquist * 0.99);
        let k = (PI * cutoff * period).tan();
        let norm = 1.0 / (1.0 + SQRT_2 * k + k * k);
        let b0 = k * k * norm;
        Butterworth2 {
            b: [b0, 2.0 * b0, b0],
            a: [
                2.0 * (k * k - 1.0) * norm,
                (1.0 - SQRT_2 * k + k * k) * norm,
            ],
            x: [0.0; 2],
            y: [0.0; 2],
        }
    }

    pub fn filter(&mut self, input: f32) -> f32 {
        let output = self.b[0] * input + self.b[1] * self.x[0] + self.b[2] * self.x[1]
            - self.a[0] * self.y[0]
            - self.a[1] * self.y[1];
        self.x = [input, self.x[0]];
        self.y = [output, self.y[0]];
        output
    }

    pub fn reset(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; 2];
    }
}
