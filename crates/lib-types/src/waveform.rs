//! Sampled data exchanged with native models.
//!
//! # Impulse matrix layout
//!
//! `AMI_Init` receives the channel impulse responses as one contiguous
//! array of `row_size * (aggressors + 1)` doubles. The first `row_size`
//! samples are the victim (through) response; each following block of
//! `row_size` samples is one crosstalk aggressor:
//!
//! ```text
//! [ victim[0..row_size] | aggressor_1[0..row_size] | ... ]
//! ```

use crate::units::Seconds;
use serde::{Deserialize, Serialize};

/// Channel impulse responses handed to `AMI_Init`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpulseMatrix {
    /// Concatenated victim and aggressor responses.
    pub samples: Vec<f64>,

    /// Samples per response.
    pub row_size: usize,

    /// Number of aggressor responses following the victim.
    pub aggressors: usize,
}

impl ImpulseMatrix {
    /// Build a matrix from raw samples. The shape is not checked here;
    /// see [`ImpulseMatrix::is_consistent`].
    pub fn new(samples: Vec<f64>, row_size: usize, aggressors: usize) -> Self {
        Self {
            samples,
            row_size,
            aggressors,
        }
    }

    /// A victim-only matrix.
    pub fn from_victim(samples: Vec<f64>) -> Self {
        let row_size = samples.len();
        Self::new(samples, row_size, 0)
    }

    /// A victim-only unit impulse of height `1 / sample_interval`, so that
    /// its integral is one volt-second.
    pub fn unit_impulse(row_size: usize, sample_interval: Seconds) -> Self {
        let mut samples = vec![0.0; row_size];
        if let Some(first) = samples.first_mut() {
            *first = 1.0 / sample_interval.0;
        }
        Self::from_victim(samples)
    }

    /// Number of signal rows (victim plus aggressors).
    #[inline]
    pub fn rows(&self) -> usize {
        self.aggressors + 1
    }

    /// Sample count implied by `row_size` and `aggressors`.
    #[inline]
    pub fn expected_len(&self) -> usize {
        self.row_size * self.rows()
    }

    /// True when the sample buffer length matches the declared shape.
    pub fn is_consistent(&self) -> bool {
        self.row_size > 0 && self.samples.len() == self.expected_len()
    }

    /// One response row: 0 is the victim, 1.. are aggressors.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows() || !self.is_consistent() {
            return None;
        }
        let start = index * self.row_size;
        Some(&self.samples[start..start + self.row_size])
    }

    /// The victim response.
    pub fn victim(&self) -> Option<&[f64]> {
        self.row(0)
    }
}

/// A uniformly-sampled time-domain waveform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Sample values.
    pub samples: Vec<f64>,

    /// Time step between consecutive samples.
    pub dt: Seconds,
}

impl Waveform {
    pub fn new(samples: Vec<f64>, dt: Seconds) -> Self {
        Self { samples, dt }
    }

    /// A bipolar step: `pad_bits` bits at -0.5 followed by `bits` bits at
    /// +0.5, each bit `samples_per_bit` samples long.
    ///
    /// This is the stimulus used to recover a model's GetWave step
    /// response.
    pub fn step(pad_bits: usize, bits: usize, samples_per_bit: usize, dt: Seconds) -> Self {
        let mut samples = Vec::with_capacity((pad_bits + bits) * samples_per_bit);
        samples.extend(std::iter::repeat(-0.5).take(pad_bits * samples_per_bit));
        samples.extend(std::iter::repeat(0.5).take(bits * samples_per_bit));
        Self { samples, dt }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak-to-peak amplitude.
    pub fn peak_to_peak(&self) -> f64 {
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        if self.samples.is_empty() {
            0.0
        } else {
            max - min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_shape() {
        let m = ImpulseMatrix::new(vec![0.0; 12], 4, 2);
        assert!(m.is_consistent());
        assert_eq!(m.rows(), 3);
        assert_eq!(m.row(2), Some(&[0.0; 4][..]));
        assert_eq!(m.row(3), None);

        let bad = ImpulseMatrix::new(vec![0.0; 11], 4, 2);
        assert!(!bad.is_consistent());
        assert_eq!(bad.victim(), None);
    }

    #[test]
    fn test_unit_impulse_area() {
        let ts = Seconds::from_ps(1.0);
        let m = ImpulseMatrix::unit_impulse(8, ts);
        let area: f64 = m.samples.iter().sum::<f64>() * ts.0;
        assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_waveform() {
        let w = Waveform::step(2, 3, 4, Seconds::from_ps(1.0));
        assert_eq!(w.len(), 20);
        assert_eq!(w.samples[7], -0.5);
        assert_eq!(w.samples[8], 0.5);
        assert!((w.peak_to_peak() - 1.0).abs() < 1e-12);
    }
}
