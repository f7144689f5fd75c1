//! Default decorrelation filter synthesis.
//!
//! When the host provides no measured decorrelation filters, the renderer
//! falls back to random-phase allpass FIRs: unit magnitude in every bin,
//! independently seeded phase per output channel. Deterministic across runs.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

use sf_core::{ConfigError, ConfigResult, Sample};
use sf_num::AlignedMatrix;

/// Default filter length in taps.
pub const DEFAULT_LENGTH: usize = 512;

/// Synthesise `channels` random-phase allpass FIRs of `length` taps, scaled
/// by `gain`.
pub fn default_filters(
    channels: usize,
    length: usize,
    gain: Sample,
    alignment: usize,
) -> ConfigResult<AlignedMatrix<Sample>> {
    if channels == 0 || length == 0 || length % 2 != 0 {
        return Err(ConfigError::InvalidFilterLength {
            length,
            detail: "decorrelation filters need a nonzero even length".to_string(),
        });
    }
    let mut planner = RealFftPlanner::<Sample>::new();
    let inverse = planner.plan_fft_inverse(length);
    let bins = length / 2 + 1;
    let mut filters = AlignedMatrix::new(channels, length, alignment);
    let scale = gain / length as Sample;
    for channel in 0..channels {
        let mut rng = ChaCha8Rng::seed_from_u64(0xdec0_7700 ^ channel as u64);
        let mut spectrum: Vec<Complex<Sample>> = (0..bins)
            .map(|bin| {
                // DC and Nyquist must stay real for a real time response.
                if bin == 0 || bin == bins - 1 {
                    Complex::new(1.0, 0.0)
                } else {
                    let phase: Sample =
                        rng.random_range(0.0..(2.0 * core::f64::consts::PI) as Sample);
                    Complex::new(phase.cos(), phase.sin())
                }
            })
            .collect();
        let row = filters.row_mut(channel);
        inverse
            .process(&mut spectrum, row)
            .map_err(|e| ConfigError::InvalidFilterLength {
                length,
                detail: format!("allpass synthesis failed: {e}"),
            })?;
        for value in row.iter_mut() {
            *value *= scale;
        }
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_deterministic_and_near_unit_energy() {
        let a = default_filters(4, 128, 1.0, 1).unwrap();
        let b = default_filters(4, 128, 1.0, 1).unwrap();
        for ch in 0..4 {
            assert_eq!(a.row(ch), b.row(ch));
            // Allpass: energy equals 1 by Parseval.
            let energy: f64 = a.row(ch).iter().map(|&v| (v as f64) * (v as f64)).sum();
            assert!((energy - 1.0).abs() < 1e-3, "channel {ch}: {energy}");
        }
        // Channels differ from each other.
        assert_ne!(a.row(0), a.row(1));
    }

    #[test]
    fn odd_length_is_rejected() {
        assert!(default_filters(2, 511, 1.0, 1).is_err());
    }
}
