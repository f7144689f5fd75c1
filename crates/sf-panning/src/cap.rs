//! Compensated amplitude panning.
//!
//! Head-orientation aware panning law valid in the ITD frequency range: the
//! image direction is maintained along the listener's aural axis while the
//! total energy is minimised. Arrays of three or more loudspeakers use the
//! closed-form energy minimisation; two-loudspeaker arrays use the linear
//! formula, whose singularity is handled by a denominator floor and gain
//! capping.

use nalgebra::Vector3;

use sf_core::{ConfigError, ConfigResult, Sample};
use sf_objects::CartesianPosition;

use crate::array::LoudspeakerArray;

/// Denominator floor of the two-loudspeaker formula.
const SINGULARITY_FLOOR: Sample = 0.001;

pub struct Cap {
    positions: Vec<Vector3<Sample>>,
    listener: Vector3<Sample>,
    /// Unit vector along the listener's interaural axis.
    aural_axis: Vector3<Sample>,
    is_infinite: bool,
    /// Cap applied after distance compensation.
    max_gain: Sample,
    /// Cap applied before distance compensation (2-speaker case), keeping
    /// the transition through the singularity smooth.
    max_gain_pre_comp: Sample,
    scratch: Vec<Sample>,
}

fn to_vector(p: CartesianPosition) -> Vector3<Sample> {
    Vector3::new(p.x, p.y, p.z)
}

impl Cap {
    pub fn new(array: &LoudspeakerArray, max_gain: Sample) -> ConfigResult<Self> {
        if array.num_regular_speakers() < 2 {
            return Err(ConfigError::LoudspeakerArray(
                "CAP requires at least two loudspeakers".to_string(),
            ));
        }
        if !(max_gain > 0.0) || !max_gain.is_finite() {
            return Err(ConfigError::OutOfRange {
                parameter: "max_gain",
                detail: format!("{max_gain}"),
            });
        }
        Ok(Self {
            positions: array
                .speakers()
                .iter()
                .map(|s| to_vector(s.position))
                .collect(),
            listener: Vector3::zeros(),
            // Default aural axis: listener facing +x, ears along +/-y.
            aural_axis: Vector3::new(0.0, 1.0, 0.0),
            is_infinite: array.is_infinite(),
            max_gain,
            max_gain_pre_comp: 2.0 * max_gain,
            scratch: vec![0.0; array.num_regular_speakers()],
        })
    }

    pub fn set_listener(&mut self, position: CartesianPosition, aural_axis: CartesianPosition) {
        self.listener = to_vector(position);
        let axis = to_vector(aural_axis);
        let norm = axis.norm();
        if norm > 0.0 && norm.is_finite() {
            self.aural_axis = axis / norm;
        }
    }

    #[inline]
    pub fn num_speakers(&self) -> usize {
        self.positions.len()
    }

    /// Calculate gains for one source into `gains` (one per loudspeaker).
    pub fn calculate_gains(
        &mut self,
        source: CartesianPosition,
        plane_wave: bool,
        gains: &mut [Sample],
    ) {
        debug_assert_eq!(gains.len(), self.num_speakers());
        gains.fill(0.0);

        let n = self.num_speakers();
        let image = to_vector(source);
        let image_origin_distance = image.norm();
        if image_origin_distance == 0.0 || !image_origin_distance.is_finite() {
            return;
        }
        let mut image_rel = image;
        if !plane_wave && !self.is_infinite {
            image_rel -= self.listener;
        }
        let image_distance = image_rel.norm();
        if image_distance == 0.0 {
            return;
        }
        let image_dir = image_rel / image_distance;

        if n >= 3 {
            // Minimum-energy solution of the aural-axis projection
            // constraint.
            let mut b = 0.0;
            let mut c = 0.0;
            for (idx, position) in self.positions.iter().enumerate() {
                let r = (position - self.listener).normalize();
                let a = self.aural_axis.dot(&(r - image_dir));
                self.scratch[idx] = a;
                b += a;
                c += a * a;
            }
            let d = (c * n as Sample - b * b) * (image_distance + 0.01) / image_origin_distance;
            if d.abs() < Sample::EPSILON {
                return;
            }
            let mut g_max: Sample = 0.0;
            for (idx, gain) in gains.iter_mut().enumerate() {
                let g = (-b * self.scratch[idx] + c) / d;
                if g > g_max {
                    g_max = g;
                }
                *gain = g;
            }
            if g_max > self.max_gain {
                let f = self.max_gain / g_max;
                for gain in gains.iter_mut() {
                    *gain *= f;
                }
            }
        } else {
            // Two loudspeakers: linear formula.
            let r0 = (self.positions[0] - self.listener).normalize();
            let r1 = (self.positions[1] - self.listener).normalize();
            let mut g0 = self.aural_axis.dot(&(image_dir - r1));
            let mut g1 = -self.aural_axis.dot(&(image_dir - r0));
            let mut d = (g0 + g1).abs();
            if d < SINGULARITY_FLOOR {
                d = SINGULARITY_FLOOR;
            }
            g0 /= d;
            g1 /= d;

            // Pre-compensation cap smooths the singularity transition.
            let g_max = g0.abs().max(g1.abs());
            if g_max > self.max_gain_pre_comp {
                let f = self.max_gain_pre_comp / g_max;
                g0 *= f;
                g1 *= f;
            }

            // Image/speaker distance compensation: unity when the listener
            // is at the origin.
            let dist = image_distance.max(SINGULARITY_FLOOR);
            let comp = image_origin_distance / dist;
            g0 *= comp;
            g1 *= comp;

            let g_max = g0.abs().max(g1.abs());
            if g_max > self.max_gain {
                let f = self.max_gain / g_max;
                g0 *= f;
                g1 *= f;
            }
            gains[0] = g0;
            gains[1] = g1;
        }
    }
}
