//! Real FFT wrapper with named provider selection.
//!
//! The transform pair is fixed to the renderer's convention: a forward
//! `fft_size`-point real DFT producing `fft_size/2 + 1` bins, and an inverse
//! that owns the `1/N` normalisation, so spectra can be multiplied and
//! accumulated without tracking scale factors.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use sf_core::{ConfigError, ConfigResult, ProcessError, ProcessResult};
use sf_num::Scalar;

/// Provider names accepted by [`FftWrapper::new`].
const PROVIDERS: &[&str] = &["default", "realfft"];

pub struct FftWrapper<T: realfft::FftNum> {
    forward: Arc<dyn RealToComplex<T>>,
    inverse: Arc<dyn ComplexToReal<T>>,
    fft_size: usize,
    time_scratch: Vec<T>,
    freq_scratch: Vec<Complex<T>>,
}

impl<T: realfft::FftNum + Scalar> FftWrapper<T> {
    /// Plan a transform pair. `provider` selects the implementation;
    /// `"default"` maps to the best available (the realfft planner).
    pub fn new(provider: &str, fft_size: usize) -> ConfigResult<Self> {
        if !PROVIDERS.contains(&provider) {
            return Err(ConfigError::UnknownFftProvider(provider.to_string()));
        }
        if fft_size == 0 || fft_size % 2 != 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "fft_size",
                detail: format!("{fft_size} must be even and nonzero"),
            });
        }
        let mut planner = RealFftPlanner::<T>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        Ok(Self {
            forward,
            inverse,
            fft_size,
            time_scratch: vec![T::ZERO; fft_size],
            freq_scratch: vec![Complex::new(T::ZERO, T::ZERO); fft_size / 2 + 1],
        })
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of complex bins produced by the forward transform.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Forward transform. `input` may be shorter than the FFT size; it is
    /// zero-padded. `spectrum` must hold `num_bins()` values.
    pub fn forward(&mut self, input: &[T], spectrum: &mut [Complex<T>]) -> ProcessResult<()> {
        if input.len() > self.fft_size || spectrum.len() != self.num_bins() {
            return Err(ProcessError::Component {
                component: "FftWrapper".to_string(),
                detail: "forward transform size mismatch".to_string(),
            });
        }
        self.time_scratch[..input.len()].copy_from_slice(input);
        self.time_scratch[input.len()..].fill(T::ZERO);
        self.forward
            .process(&mut self.time_scratch, spectrum)
            .map_err(|e| ProcessError::Component {
                component: "FftWrapper".to_string(),
                detail: format!("forward transform failed: {e}"),
            })
    }

    /// Inverse transform including the `1/N` scaling. `output` must hold
    /// `fft_size` values.
    pub fn inverse(&mut self, spectrum: &[Complex<T>], output: &mut [T]) -> ProcessResult<()> {
        if spectrum.len() != self.num_bins() || output.len() != self.fft_size {
            return Err(ProcessError::Component {
                component: "FftWrapper".to_string(),
                detail: "inverse transform size mismatch".to_string(),
            });
        }
        self.freq_scratch.copy_from_slice(spectrum);
        self.inverse
            .process(&mut self.freq_scratch, output)
            .map_err(|e| ProcessError::Component {
                component: "FftWrapper".to_string(),
                detail: format!("inverse transform failed: {e}"),
            })?;
        let scale = T::ONE / <T as Scalar>::from_usize(self.fft_size);
        for value in output.iter_mut() {
            *value *= scale;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(FftWrapper::<f32>::new("fftw", 128).is_err());
        assert!(FftWrapper::<f32>::new("default", 128).is_ok());
        assert!(FftWrapper::<f32>::new("realfft", 128).is_ok());
    }

    #[test]
    fn forward_inverse_round_trip() {
        let mut fft = FftWrapper::<f64>::new("default", 64).unwrap();
        let input: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut spectrum = vec![Complex::new(0.0, 0.0); fft.num_bins()];
        let mut output = vec![0.0; 64];
        fft.forward(&input, &mut spectrum).unwrap();
        fft.inverse(&spectrum, &mut output).unwrap();
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn zero_padding_is_applied() {
        let mut fft = FftWrapper::<f64>::new("default", 32).unwrap();
        let mut spectrum = vec![Complex::new(0.0, 0.0); fft.num_bins()];
        // A single unit impulse gives a flat spectrum.
        fft.forward(&[1.0], &mut spectrum).unwrap();
        for bin in &spectrum {
            assert!((bin.re - 1.0).abs() < 1e-12);
            assert!(bin.im.abs() < 1e-12);
        }
    }
}
