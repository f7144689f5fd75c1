//! Fractional-delay interpolators.
//!
//! All interpolators share one contract: given a delay line, produce one
//! output block whose per-sample delay and gain are linearly interpolated
//! from start to end values across the block. The achievable minimum delay of
//! a method is its `method_delay()`; callers add it to the requested delay
//! budget.

use std::str::FromStr;

use sf_core::{ConfigError, ConfigResult};
use sf_num::Scalar;

use crate::circular_buffer::CircularBuffer;

/// Maximum supported Lagrange order.
pub const MAX_LAGRANGE_ORDER: usize = 9;

/// Selection tag for the fractional-delay method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    /// Round to the nearest integer sample.
    NearestSample,
    /// Two-point linear interpolation.
    Linear,
    /// Lagrange polynomial interpolation of the given order (0..=9).
    Lagrange(usize),
}

impl InterpolationMethod {
    /// Number of delay-line taps the method reads per output sample.
    pub fn taps(&self) -> usize {
        match self {
            InterpolationMethod::NearestSample => 1,
            InterpolationMethod::Linear => 2,
            InterpolationMethod::Lagrange(order) => order + 1,
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, ConfigError> {
        if name == "nearestSample" {
            return Ok(InterpolationMethod::NearestSample);
        }
        if name == "linear" {
            return Ok(InterpolationMethod::Linear);
        }
        if let Some(suffix) = name.strip_prefix("lagrangeOrder") {
            if let Ok(order) = suffix.parse::<usize>() {
                if order <= MAX_LAGRANGE_ORDER {
                    return Ok(InterpolationMethod::Lagrange(order));
                }
            }
        }
        Err(ConfigError::UnsupportedInterpolationMethod(name.to_string()))
    }
}

/// One fractional-delay algorithm operating on a [`CircularBuffer`].
pub trait FractionalDelay<T: Scalar> {
    /// Inherent implementation delay of the method, in samples.
    fn method_delay(&self) -> T;

    /// Produce one block for a single channel.
    ///
    /// `start_delay`/`end_delay` are in samples relative to the first output
    /// sample of the block; the most recent sample in the ring is the last
    /// sample of the block that was just written. Delays are interpolated
    /// linearly over `output.len()` samples, exclusive of the end value;
    /// gains likewise. Delays below the method delay (including negative
    /// values) are clamped up to it.
    #[allow(clippy::too_many_arguments)]
    fn interpolate(
        &self,
        ring: &CircularBuffer<T>,
        channel: usize,
        output: &mut [T],
        start_delay: T,
        end_delay: T,
        start_gain: T,
        end_gain: T,
    );
}

/// Create the interpolator for a method tag.
pub fn make_interpolator<T: Scalar>(
    method: InterpolationMethod,
) -> ConfigResult<Box<dyn FractionalDelay<T>>> {
    match method {
        InterpolationMethod::NearestSample => Ok(Box::new(NearestSampleInterpolator)),
        InterpolationMethod::Linear => Ok(Box::new(LinearInterpolator)),
        InterpolationMethod::Lagrange(order) if order <= MAX_LAGRANGE_ORDER => {
            Ok(Box::new(LagrangeInterpolator::new(order)))
        }
        InterpolationMethod::Lagrange(order) => Err(ConfigError::UnsupportedInterpolationMethod(
            format!("lagrangeOrder{order}"),
        )),
    }
}

/// Block-relative integer delay of output sample `index`: the newest ring
/// sample corresponds to the final sample of the current block.
#[inline]
fn block_offset(block_size: usize, index: usize) -> usize {
    block_size - 1 - index
}

// ============ Nearest sample ============

pub struct NearestSampleInterpolator;

impl<T: Scalar> FractionalDelay<T> for NearestSampleInterpolator {
    fn method_delay(&self) -> T {
        T::ZERO
    }

    fn interpolate(
        &self,
        ring: &CircularBuffer<T>,
        channel: usize,
        output: &mut [T],
        start_delay: T,
        end_delay: T,
        start_gain: T,
        end_gain: T,
    ) {
        let block = output.len();
        let scale = T::ONE / T::from_usize(block);
        for (index, out) in output.iter_mut().enumerate() {
            let ratio = T::from_usize(index) * scale;
            let gain = start_gain + ratio * (end_gain - start_gain);
            let delay = start_delay + ratio * (end_delay - start_delay);
            let delay = if delay > T::ZERO { delay } else { T::ZERO };
            let delay_samples = delay.round().to_f64() as usize;
            let sample = ring.sample(channel, block_offset(block, index) + delay_samples);
            *out = gain * sample;
        }
    }
}

// ============ Linear ============

pub struct LinearInterpolator;

impl<T: Scalar> FractionalDelay<T> for LinearInterpolator {
    fn method_delay(&self) -> T {
        T::ZERO
    }

    fn interpolate(
        &self,
        ring: &CircularBuffer<T>,
        channel: usize,
        output: &mut [T],
        start_delay: T,
        end_delay: T,
        start_gain: T,
        end_gain: T,
    ) {
        let block = output.len();
        let scale = T::ONE / T::from_usize(block);
        for (index, out) in output.iter_mut().enumerate() {
            let ratio = T::from_usize(index) * scale;
            let gain = start_gain + ratio * (end_gain - start_gain);
            let delay = start_delay + ratio * (end_delay - start_delay);
            let delay = if delay > T::ZERO { delay } else { T::ZERO };
            let integer = delay.floor();
            let frac = delay - integer;
            let base = block_offset(block, index) + integer.to_f64() as usize;
            let newer = ring.sample(channel, base);
            let older = ring.sample(channel, base + 1);
            *out = gain * (newer + frac * (older - newer));
        }
    }
}

// ============ Lagrange ============

/// Lagrange interpolation of a fixed order.
///
/// The polynomial operating point is kept in the well-conditioned interval
/// around `(order - 1) / 2`, which is also the method delay: the integer part
/// of the requested delay is shifted so the fractional evaluation stays
/// centred within the tap window.
pub struct LagrangeInterpolator {
    order: usize,
}

impl LagrangeInterpolator {
    pub fn new(order: usize) -> Self {
        Self { order }
    }

    /// Barycentric evaluation of the Lagrange basis at position `t` over the
    /// integer nodes `0..=order`.
    fn weights<T: Scalar>(&self, t: T, weights: &mut [T]) {
        let n = self.order;
        for (k, w) in weights.iter_mut().enumerate().take(n + 1) {
            let mut acc = T::ONE;
            for j in 0..=n {
                if j == k {
                    continue;
                }
                let tj = T::from_usize(j);
                let tk = T::from_usize(k);
                acc *= (t - tj) / (tk - tj);
            }
            *w = acc;
        }
    }
}

impl<T: Scalar> FractionalDelay<T> for LagrangeInterpolator {
    fn method_delay(&self) -> T {
        if self.order == 0 {
            T::ZERO
        } else {
            (T::from_usize(self.order) - T::ONE) / T::from_usize(2)
        }
    }

    fn interpolate(
        &self,
        ring: &CircularBuffer<T>,
        channel: usize,
        output: &mut [T],
        start_delay: T,
        end_delay: T,
        start_gain: T,
        end_gain: T,
    ) {
        let block = output.len();
        let order = self.order;
        let scale = T::ONE / T::from_usize(block);
        let centre: T = self.method_delay();
        let mut weights = [T::ZERO; MAX_LAGRANGE_ORDER + 1];
        for (index, out) in output.iter_mut().enumerate() {
            let ratio = T::from_usize(index) * scale;
            let gain = start_gain + ratio * (end_gain - start_gain);
            let delay = start_delay + ratio * (end_delay - start_delay);
            // The operating point cannot reach below the method delay;
            // clamping keeps the tap window causal.
            let delay = if delay > centre { delay } else { centre };
            // Integer shift such that the evaluation point stays within
            // [centre, centre + 1).
            let shift = (delay - centre).floor();
            let t = delay - shift;
            self.weights(t, &mut weights[..order + 1]);
            let base = block_offset(block, index) + shift.to_f64() as usize;
            let mut acc = T::ZERO;
            for (k, w) in weights.iter().enumerate().take(order + 1) {
                acc += *w * ring.sample(channel, base + k);
            }
            *out = gain * acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed_ring(values: &[f64], capacity: usize) -> CircularBuffer<f64> {
        let mut ring = CircularBuffer::new(1, capacity, 4).unwrap();
        let zeros = vec![0.0; capacity - 1];
        ring.write(&[&zeros]).unwrap();
        ring.write(&[values]).unwrap();
        ring
    }

    #[test]
    fn method_name_parsing() {
        assert_eq!(
            "nearestSample".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::NearestSample
        );
        assert_eq!(
            "lagrangeOrder3".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::Lagrange(3)
        );
        assert!("lagrangeOrder10".parse::<InterpolationMethod>().is_err());
        assert!("cubic".parse::<InterpolationMethod>().is_err());
    }

    #[test]
    fn nearest_constant_delay_shifts() {
        let input: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let ring = primed_ring(&input, 64);
        let interp = NearestSampleInterpolator;
        let mut out = vec![0.0; 8];
        interp.interpolate(&ring, 0, &mut out, 2.0, 2.0, 1.0, 1.0);
        // Delay of two samples: output n equals input n-2.
        assert_eq!(&out[2..], &input[..6]);
        assert_eq!(&out[..2], &[0.0, 0.0]);
    }

    #[test]
    fn linear_half_sample_delay_averages() {
        let input: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let ring = primed_ring(&input, 64);
        let interp = LinearInterpolator;
        let mut out = vec![0.0; 8];
        interp.interpolate(&ring, 0, &mut out, 0.5, 0.5, 1.0, 1.0);
        // Half-sample delay: average of neighbours.
        for n in 1..8 {
            let expected = 0.5 * (input[n] + input[n - 1]);
            assert!((out[n] - expected).abs() < 1e-12, "n={n}");
        }
    }

    #[test]
    fn lagrange_order1_matches_linear() {
        let input: Vec<f64> = (0..16).map(|x| (x as f64 * 0.37).sin()).collect();
        let ring = primed_ring(&input, 64);
        let linear = LinearInterpolator;
        let lagrange = LagrangeInterpolator::new(1);
        let mut out_lin = vec![0.0; 16];
        let mut out_lag = vec![0.0; 16];
        linear.interpolate(&ring, 0, &mut out_lin, 1.3, 1.3, 1.0, 1.0);
        lagrange.interpolate(&ring, 0, &mut out_lag, 1.3, 1.3, 1.0, 1.0);
        for (a, b) in out_lin.iter().zip(&out_lag) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn lagrange_weights_sum_to_one() {
        let interp = LagrangeInterpolator::new(5);
        let mut w = [0.0f64; 6];
        interp.weights(2.37, &mut w);
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lagrange_integer_delay_is_exact() {
        let input: Vec<f64> = (0..16).map(|x| (x as f64 * 0.71).cos()).collect();
        let ring = primed_ring(&input, 64);
        let interp = LagrangeInterpolator::new(3);
        let mut out = vec![0.0; 16];
        // Delay 3 >= method delay 1; integer delays reproduce shifted input.
        interp.interpolate(&ring, 0, &mut out, 3.0, 3.0, 1.0, 1.0);
        for n in 3..16 {
            assert!((out[n] - input[n - 3]).abs() < 1e-9, "n={n}");
        }
    }

    #[test]
    fn method_delays() {
        assert_eq!(
            <NearestSampleInterpolator as FractionalDelay<f64>>::method_delay(
                &NearestSampleInterpolator
            ),
            0.0
        );
        let l3 = LagrangeInterpolator::new(3);
        assert_eq!(FractionalDelay::<f64>::method_delay(&l3), 1.0);
        let l4 = LagrangeInterpolator::new(4);
        assert_eq!(FractionalDelay::<f64>::method_delay(&l4), 1.5);
    }
}
