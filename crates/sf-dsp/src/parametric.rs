//! Parametric IIR descriptor to biquad derivation.
//!
//! Maps a `{kind, frequency, quality, gain}` specification to a normalised
//! second-order section via the bilinear transform with frequency prewarp
//! (RBJ audio EQ cookbook forms).

use sf_core::{ConfigError, ConfigResult};
use sf_num::Scalar;

use crate::biquad::BiquadCoeff;

/// Supported parametric filter characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParametricIirKind {
    Lowpass,
    Highpass,
    /// Constant 0 dB peak gain bandpass.
    Bandpass,
    Bandstop,
    Peak,
    Lowshelf,
    Highshelf,
    Allpass,
}

impl ParametricIirKind {
    /// Does the characteristic use the gain parameter?
    pub fn uses_gain(&self) -> bool {
        matches!(
            self,
            ParametricIirKind::Peak | ParametricIirKind::Lowshelf | ParametricIirKind::Highshelf
        )
    }
}

/// A single parametric EQ stage.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParametricIirSpec<T> {
    pub kind: ParametricIirKind,
    /// Center (or corner) frequency in Hz.
    pub center_frequency: T,
    /// Quality factor; must be positive.
    pub quality: T,
    /// Gain in dB; ignored by characteristics without a gain parameter.
    pub gain_db: T,
}

impl<T: Scalar> ParametricIirSpec<T> {
    pub fn new(kind: ParametricIirKind, center_frequency: T, quality: T, gain_db: T) -> Self {
        Self {
            kind,
            center_frequency,
            quality,
            gain_db,
        }
    }

    /// Derive the normalised biquad for a sampling frequency.
    pub fn to_biquad(&self, sampling_frequency: T) -> ConfigResult<BiquadCoeff<T>> {
        let fs = sampling_frequency;
        let fc = self.center_frequency;
        let q = self.quality;
        if !fc.is_finite() || fc <= T::ZERO || fc.to_f64() >= fs.to_f64() / 2.0 {
            return Err(ConfigError::OutOfRange {
                parameter: "center_frequency",
                detail: format!("{} Hz at fs {}", fc.to_f64(), fs.to_f64()),
            });
        }
        if !q.is_finite() || q <= T::ZERO {
            return Err(ConfigError::OutOfRange {
                parameter: "quality",
                detail: format!("{}", q.to_f64()),
            });
        }
        if !self.gain_db.is_finite() {
            return Err(ConfigError::OutOfRange {
                parameter: "gain_db",
                detail: "must be finite".to_string(),
            });
        }

        let two = T::from_usize(2);
        let omega = two * T::from_f64(core::f64::consts::PI) * fc / fs;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (two * q);
        // 10^(gain/40): shelving and peak forms use the square root of the
        // linear amplitude gain.
        let a = T::from_usize(10).powf(self.gain_db / T::from_usize(40));

        let coeff = match self.kind {
            ParametricIirKind::Lowpass => {
                let b1 = T::ONE - cos_omega;
                let b0 = b1 / two;
                BiquadCoeff::normalised(
                    b0,
                    b1,
                    b0,
                    T::ONE + alpha,
                    -two * cos_omega,
                    T::ONE - alpha,
                )
            }
            ParametricIirKind::Highpass => {
                let b1 = -(T::ONE + cos_omega);
                let b0 = (T::ONE + cos_omega) / two;
                BiquadCoeff::normalised(
                    b0,
                    b1,
                    b0,
                    T::ONE + alpha,
                    -two * cos_omega,
                    T::ONE - alpha,
                )
            }
            ParametricIirKind::Bandpass => BiquadCoeff::normalised(
                alpha,
                T::ZERO,
                T::ZERO - alpha,
                T::ONE + alpha,
                -two * cos_omega,
                T::ONE - alpha,
            ),
            ParametricIirKind::Bandstop => BiquadCoeff::normalised(
                T::ONE,
                -two * cos_omega,
                T::ONE,
                T::ONE + alpha,
                -two * cos_omega,
                T::ONE - alpha,
            ),
            ParametricIirKind::Allpass => BiquadCoeff::normalised(
                T::ONE - alpha,
                -two * cos_omega,
                T::ONE + alpha,
                T::ONE + alpha,
                -two * cos_omega,
                T::ONE - alpha,
            ),
            ParametricIirKind::Peak => BiquadCoeff::normalised(
                T::ONE + alpha * a,
                -two * cos_omega,
                T::ONE - alpha * a,
                T::ONE + alpha / a,
                -two * cos_omega,
                T::ONE - alpha / a,
            ),
            ParametricIirKind::Lowshelf => {
                let two_sqrt_a_alpha = two * a.sqrt() * alpha;
                let ap1 = a + T::ONE;
                let am1 = a - T::ONE;
                BiquadCoeff::normalised(
                    a * (ap1 - am1 * cos_omega + two_sqrt_a_alpha),
                    two * a * (am1 - ap1 * cos_omega),
                    a * (ap1 - am1 * cos_omega - two_sqrt_a_alpha),
                    ap1 + am1 * cos_omega + two_sqrt_a_alpha,
                    -two * (am1 + ap1 * cos_omega),
                    ap1 + am1 * cos_omega - two_sqrt_a_alpha,
                )
            }
            ParametricIirKind::Highshelf => {
                let two_sqrt_a_alpha = two * a.sqrt() * alpha;
                let ap1 = a + T::ONE;
                let am1 = a - T::ONE;
                BiquadCoeff::normalised(
                    a * (ap1 + am1 * cos_omega + two_sqrt_a_alpha),
                    -two * a * (am1 + ap1 * cos_omega),
                    a * (ap1 + am1 * cos_omega - two_sqrt_a_alpha),
                    ap1 - am1 * cos_omega + two_sqrt_a_alpha,
                    two * (am1 - ap1 * cos_omega),
                    ap1 - am1 * cos_omega - two_sqrt_a_alpha,
                )
            }
        };
        Ok(coeff)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::biquad::process_section;

    /// Magnitude response of a section at a normalised frequency.
    fn magnitude(coeff: &BiquadCoeff<f64>, freq: f64, fs: f64) -> f64 {
        use core::f64::consts::PI;
        let omega = 2.0 * PI * freq / fs;
        let (re_z, im_z) = ((-omega).cos(), (-omega).sin());
        // z^-1 and z^-2 on the unit circle
        let (re_z2, im_z2) = (
            re_z * re_z - im_z * im_z,
            2.0 * re_z * im_z,
        );
        let num_re = coeff.b0 + coeff.b1 * re_z + coeff.b2 * re_z2;
        let num_im = coeff.b1 * im_z + coeff.b2 * im_z2;
        let den_re = 1.0 + coeff.a1 * re_z + coeff.a2 * re_z2;
        let den_im = coeff.a1 * im_z + coeff.a2 * im_z2;
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }

    #[test]
    fn lowpass_magnitude_sanity() {
        let fs = 48000.0;
        let spec = ParametricIirSpec::new(
            ParametricIirKind::Lowpass,
            fs / 4.0,
            core::f64::consts::FRAC_1_SQRT_2,
            0.0,
        );
        let coeff = spec.to_biquad(fs).unwrap();
        assert_abs_diff_eq!(magnitude(&coeff, 1.0, fs), 1.0, epsilon = 1e-3);
        // Butterworth corner: -3 dB at fc.
        assert_abs_diff_eq!(
            magnitude(&coeff, fs / 4.0, fs),
            core::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-3
        );
        // Well into the stopband the response keeps falling.
        assert!(magnitude(&coeff, fs * 0.45, fs) < 0.2);
    }

    #[test]
    fn bandpass_peaks_at_unity() {
        let fs = 48000.0;
        let spec = ParametricIirSpec::new(ParametricIirKind::Bandpass, 1000.0, 4.0, 0.0);
        let coeff = spec.to_biquad(fs).unwrap();
        assert!((magnitude(&coeff, 1000.0, fs) - 1.0).abs() < 1e-3);
        assert!(magnitude(&coeff, 100.0, fs) < 0.1);
        assert!(magnitude(&coeff, 10000.0, fs) < 0.1);
    }

    #[test]
    fn allpass_is_unity_magnitude() {
        let fs = 48000.0;
        let spec = ParametricIirSpec::new(ParametricIirKind::Allpass, 2000.0, 1.0, 0.0);
        let coeff = spec.to_biquad(fs).unwrap();
        for freq in [50.0, 500.0, 2000.0, 8000.0, 20000.0] {
            assert!((magnitude(&coeff, freq, fs) - 1.0).abs() < 1e-6, "f={freq}");
        }
    }

    #[test]
    fn peak_gain_at_center() {
        let fs = 48000.0;
        let spec = ParametricIirSpec::new(ParametricIirKind::Peak, 1000.0, 2.0, 6.0);
        let coeff = spec.to_biquad(fs).unwrap();
        let expected = 10.0f64.powf(6.0 / 20.0);
        assert!((magnitude(&coeff, 1000.0, fs) - expected).abs() < 1e-2);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let fs = 48000.0;
        assert!(
            ParametricIirSpec::new(ParametricIirKind::Lowpass, -1.0, 0.7, 0.0)
                .to_biquad(fs)
                .is_err()
        );
        assert!(
            ParametricIirSpec::new(ParametricIirKind::Lowpass, 30000.0, 0.7, 0.0)
                .to_biquad(fs)
                .is_err()
        );
        assert!(
            ParametricIirSpec::new(ParametricIirKind::Lowpass, 1000.0, 0.0, 0.0)
                .to_biquad(fs)
                .is_err()
        );
        assert!(
            ParametricIirSpec::new(ParametricIirKind::Peak, 1000.0, 1.0, f64::NAN)
                .to_biquad(fs)
                .is_err()
        );
    }

    #[test]
    fn dc_passes_through_lowpass_filtering() {
        let fs = 48000.0;
        let spec = ParametricIirSpec::new(ParametricIirKind::Lowpass, 1000.0, 0.707, 0.0);
        let coeff = spec.to_biquad(fs).unwrap();
        let mut state = [0.0f64; 2];
        let mut data = vec![1.0f64; 4000];
        process_section(&coeff, &mut state, &mut data);
        assert!((data.last().unwrap() - 1.0).abs() < 0.01);
    }
}
