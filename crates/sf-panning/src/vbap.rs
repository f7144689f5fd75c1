//! Vector-base amplitude panning.
//!
//! Per-triplet inverse matrices are precomputed at configure time and
//! whenever the listener moves. Gain calculation projects the (listener
//! compensated) source direction through each inverse in declaration order
//! and takes the first triplet with all-non-negative projection gains.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use sf_core::{ConfigError, ConfigResult, Sample};
use sf_objects::CartesianPosition;

use crate::array::{LoudspeakerArray, PAIR_SENTINEL, TripletIndex};

/// Tolerance for slightly negative projection gains near triplet boundaries
/// (the source direction is normalised before projection).
const BOUNDARY_TOLERANCE: Sample = 1e-6;

enum TripletInverse {
    /// 3-D triplet: inverse of the 3x3 loudspeaker position matrix.
    Full([TripletIndex; 3], Matrix3<Sample>),
    /// 2-D pair: inverse of the 2x2 matrix over the horizontal plane.
    Pair([TripletIndex; 2], Matrix2<Sample>),
}

pub struct Vbap {
    /// Loudspeaker positions as configured (not listener compensated).
    positions: Vec<Vector3<Sample>>,
    triplets: Vec<[TripletIndex; 3]>,
    inverses: Vec<TripletInverse>,
    listener: Vector3<Sample>,
    is_2d: bool,
    is_infinite: bool,
}

fn to_vector(p: CartesianPosition) -> Vector3<Sample> {
    Vector3::new(p.x, p.y, p.z)
}

impl Vbap {
    pub fn new(array: &LoudspeakerArray) -> ConfigResult<Self> {
        let mut vbap = Self {
            positions: array
                .speakers()
                .iter()
                .map(|s| to_vector(s.position))
                .collect(),
            triplets: array.triplets().to_vec(),
            inverses: Vec::new(),
            listener: Vector3::zeros(),
            is_2d: array.is_2d(),
            is_infinite: array.is_infinite(),
        };
        if vbap.triplets.is_empty() {
            return Err(ConfigError::LoudspeakerArray(
                "array declares no VBAP triplets".to_string(),
            ));
        }
        vbap.recompute_inverses()?;
        Ok(vbap)
    }

    #[inline]
    pub fn num_speakers(&self) -> usize {
        self.positions.len()
    }

    /// Loudspeaker position compensated for the current listener, unless the
    /// array is infinite.
    fn compensated_position(&self, index: usize) -> Vector3<Sample> {
        if self.is_infinite {
            self.positions[index]
        } else {
            self.positions[index] - self.listener
        }
    }

    /// Move the listener; recomputes the inverse matrices.
    pub fn set_listener_position(&mut self, position: CartesianPosition) -> ConfigResult<()> {
        self.listener = to_vector(position);
        self.recompute_inverses()
    }

    fn recompute_inverses(&mut self) -> ConfigResult<()> {
        let mut inverses = Vec::with_capacity(self.triplets.len());
        for (idx, triplet) in self.triplets.iter().enumerate() {
            if self.is_2d || triplet[2] == PAIR_SENTINEL {
                let a = self.compensated_position(triplet[0]);
                let b = self.compensated_position(triplet[1]);
                let m = Matrix2::new(a.x, b.x, a.y, b.y);
                let inverse = m.try_inverse().ok_or_else(|| {
                    ConfigError::LoudspeakerArray(format!(
                        "pair {idx} is singular (collinear loudspeakers)"
                    ))
                })?;
                inverses.push(TripletInverse::Pair([triplet[0], triplet[1]], inverse));
            } else {
                let a = self.compensated_position(triplet[0]);
                let b = self.compensated_position(triplet[1]);
                let c = self.compensated_position(triplet[2]);
                let m = Matrix3::from_columns(&[a, b, c]);
                let inverse = m.try_inverse().ok_or_else(|| {
                    ConfigError::LoudspeakerArray(format!(
                        "triplet {idx} is singular (coplanar loudspeakers)"
                    ))
                })?;
                inverses.push(TripletInverse::Full(*triplet, inverse));
            }
        }
        log::debug!("recomputed {} panning inverse matrices", inverses.len());
        self.inverses = inverses;
        Ok(())
    }

    /// Compute panning gains for one source.
    ///
    /// `plane_wave` marks at-infinity sources whose direction is not
    /// compensated for the listener position. `gains` must hold one value per
    /// regular loudspeaker; a source outside the array yields all zeros.
    pub fn calculate_gains(
        &self,
        source: CartesianPosition,
        plane_wave: bool,
        gains: &mut [Sample],
    ) {
        debug_assert_eq!(gains.len(), self.num_speakers());
        gains.fill(0.0);

        let mut direction = to_vector(source);
        if !plane_wave && !self.is_infinite {
            direction -= self.listener;
        }
        let norm = direction.norm();
        if !norm.is_finite() || norm == 0.0 {
            return;
        }
        direction /= norm;

        for inverse in &self.inverses {
            match inverse {
                TripletInverse::Pair(indices, m) => {
                    let projected = m * Vector2::new(direction.x, direction.y);
                    if projected.x >= -BOUNDARY_TOLERANCE && projected.y >= -BOUNDARY_TOLERANCE {
                        let g = projected.norm();
                        if g <= 0.0 {
                            continue;
                        }
                        gains[indices[0]] = (projected.x / g).max(0.0);
                        gains[indices[1]] = (projected.y / g).max(0.0);
                        return;
                    }
                }
                TripletInverse::Full(indices, m) => {
                    let projected = m * direction;
                    if projected.x >= -BOUNDARY_TOLERANCE
                        && projected.y >= -BOUNDARY_TOLERANCE
                        && projected.z >= -BOUNDARY_TOLERANCE
                    {
                        let g = projected.norm();
                        if g <= 0.0 {
                            continue;
                        }
                        gains[indices[0]] = (projected.x / g).max(0.0);
                        gains[indices[1]] = (projected.y / g).max(0.0);
                        gains[indices[2]] = (projected.z / g).max(0.0);
                        return;
                    }
                }
            }
        }
        // No containing triplet: the source fell outside the array.
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::array::Loudspeaker;

    fn tetra_array() -> LoudspeakerArray {
        // Four unit-distance speakers spanning the upper hemisphere.
        let z = (1.0f32 - 0.25 - 0.64).sqrt();
        let speakers = vec![
            Loudspeaker::new(1, CartesianPosition::new(1.0, 0.0, 0.0), 0),
            Loudspeaker::new(2, CartesianPosition::new(-0.5, 0.8, z), 1),
            Loudspeaker::new(3, CartesianPosition::new(-0.5, -0.8, z), 2),
            Loudspeaker::new(4, CartesianPosition::new(0.0, 0.0, 1.0), 3),
        ];
        let triplets = vec![[0, 1, 3], [0, 2, 3], [1, 2, 3], [0, 1, 2]];
        LoudspeakerArray::new(speakers, triplets, false, false).unwrap()
    }

    #[test]
    fn source_on_speaker_gets_unit_gain() {
        let vbap = Vbap::new(&tetra_array()).unwrap();
        let mut gains = vec![0.0; 4];
        vbap.calculate_gains(CartesianPosition::new(2.0, 0.0, 0.0), false, &mut gains);
        assert!((gains[0] - 1.0).abs() < 1e-6);
        for &g in &gains[1..] {
            assert!(g.abs() < 1e-6);
        }
    }

    #[test]
    fn triplet_centroid_gets_equal_gains() {
        let vbap = Vbap::new(&tetra_array()).unwrap();
        // Centroid direction of triplet [0, 1, 3].
        let z = (1.0f32 - 0.25 - 0.64).sqrt();
        let a = Vector3::new(1.0f32, 0.0, 0.0);
        let b = Vector3::new(-0.5f32, 0.8, z);
        let c = Vector3::new(0.0f32, 0.0, 1.0);
        let centroid = (a + b + c) / 3.0;
        let mut gains = vec![0.0; 4];
        vbap.calculate_gains(
            CartesianPosition::new(centroid.x, centroid.y, centroid.z),
            false,
            &mut gains,
        );
        assert!((gains[0] - gains[1]).abs() < 1e-5);
        assert!((gains[0] - gains[3]).abs() < 1e-5);
        assert!(gains[2].abs() < 1e-6);
        // L2-normalised.
        let norm: f32 = gains.iter().map(|g| g * g).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn stereo_center_pans_equally() {
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let vbap = Vbap::new(&array).unwrap();
        let mut gains = vec![0.0; 2];
        vbap.calculate_gains(CartesianPosition::new(1.0, 0.0, 0.0), false, &mut gains);
        let expected = (0.5f32).sqrt();
        assert_abs_diff_eq!(gains[0], expected, epsilon = 1e-6);
        assert_abs_diff_eq!(gains[1], expected, epsilon = 1e-6);
    }

    #[test]
    fn source_outside_array_is_silent() {
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let vbap = Vbap::new(&array).unwrap();
        let mut gains = vec![0.0; 2];
        // Behind the listener, outside the frontal pair.
        vbap.calculate_gains(CartesianPosition::new(-1.0, 0.0, 0.0), false, &mut gains);
        assert_eq!(gains, vec![0.0, 0.0]);
    }

    #[test]
    fn listener_shift_changes_panning() {
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let mut vbap = Vbap::new(&array).unwrap();
        let mut centered = vec![0.0; 2];
        vbap.calculate_gains(CartesianPosition::new(1.0, 0.0, 0.0), false, &mut centered);
        // Move the listener towards the left speaker.
        vbap.set_listener_position(CartesianPosition::new(0.0, 0.2, 0.0))
            .unwrap();
        let mut shifted = vec![0.0; 2];
        vbap.calculate_gains(CartesianPosition::new(1.0, 0.0, 0.0), false, &mut shifted);
        // The source now appears to the listener's right.
        assert!(shifted[1] > shifted[0]);
        assert!((centered[0] - centered[1]).abs() < 1e-6);
    }

    #[test]
    fn plane_wave_skips_listener_compensation() {
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let mut vbap = Vbap::new(&array).unwrap();
        vbap.set_listener_position(CartesianPosition::new(0.0, 0.2, 0.0))
            .unwrap();
        let mut gains = vec![0.0; 2];
        vbap.calculate_gains(CartesianPosition::new(1.0, 0.0, 0.0), true, &mut gains);
        // Plane-wave direction ignores the listener offset, but the
        // loudspeaker geometry is still compensated, so the result differs
        // from the centred case yet stays inside the pair.
        assert!(gains[0] > 0.0 && gains[1] > 0.0);
    }
}
