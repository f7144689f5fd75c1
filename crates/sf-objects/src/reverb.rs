//! Reverb extension data carried by `PointSourceWithReverb` objects.

use serde::{Deserialize, Serialize};

use sf_core::Sample;
use sf_dsp::BiquadCoeff;

use crate::object::CartesianPosition;

/// Number of biquad sections of a discrete-reflection wall filter.
pub const NUM_DISCRETE_REFLECTION_BIQUADS: usize = 2;

/// Number of subbands of the late-reverb envelope model.
pub const NUM_SUBBANDS: usize = 9;

/// A single deterministic early reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteReflection {
    /// Apparent position of the reflected image source.
    pub position: CartesianPosition,
    /// Arrival delay relative to the object signal, in seconds.
    pub delay_seconds: Sample,
    /// Linear level factor of the reflection.
    pub level: Sample,
    /// Wall filter as a fixed cascade of biquad sections.
    pub biquads: [BiquadCoeff<Sample>; NUM_DISCRETE_REFLECTION_BIQUADS],
}

impl DiscreteReflection {
    pub fn new(position: CartesianPosition, delay_seconds: Sample, level: Sample) -> Self {
        Self {
            position,
            delay_seconds,
            level,
            biquads: [BiquadCoeff::default(); NUM_DISCRETE_REFLECTION_BIQUADS],
        }
    }
}

/// Subband envelope description of a late reverberation tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateReverb {
    /// Initial silent portion before the tail builds up, in seconds.
    pub onset_delay_seconds: Sample,
    /// Peak level per subband, linear.
    pub levels: [Sample; NUM_SUBBANDS],
    /// Exponential decay coefficient per subband (per second).
    pub decay_coeffs: [Sample; NUM_SUBBANDS],
    /// Attack time from onset to peak per subband, in seconds.
    pub attack_times: [Sample; NUM_SUBBANDS],
}

impl LateReverb {
    pub fn new(
        onset_delay_seconds: Sample,
        levels: [Sample; NUM_SUBBANDS],
        decay_coeffs: [Sample; NUM_SUBBANDS],
        attack_times: [Sample; NUM_SUBBANDS],
    ) -> Self {
        Self {
            onset_delay_seconds,
            levels,
            decay_coeffs,
            attack_times,
        }
    }

    /// A tail that renders to silence; used to clear released slots.
    pub fn silent() -> Self {
        Self {
            onset_delay_seconds: 0.0,
            levels: [0.0; NUM_SUBBANDS],
            decay_coeffs: [0.0; NUM_SUBBANDS],
            attack_times: [0.0; NUM_SUBBANDS],
        }
    }

    /// Largest absolute difference over all components of two descriptors.
    pub fn max_difference(&self, other: &Self) -> Sample {
        let mut max = (self.onset_delay_seconds - other.onset_delay_seconds).abs();
        for (a, b) in self
            .levels
            .iter()
            .zip(&other.levels)
            .chain(self.decay_coeffs.iter().zip(&other.decay_coeffs))
            .chain(self.attack_times.iter().zip(&other.attack_times))
        {
            let d = (a - b).abs();
            if d > max {
                max = d;
            }
        }
        max
    }

    pub fn is_finite(&self) -> bool {
        self.onset_delay_seconds.is_finite()
            && self.levels.iter().all(|v| v.is_finite())
            && self.decay_coeffs.iter().all(|v| v.is_finite())
            && self.attack_times.iter().all(|v| v.is_finite())
    }
}

impl Default for LateReverb {
    fn default() -> Self {
        Self::silent()
    }
}
