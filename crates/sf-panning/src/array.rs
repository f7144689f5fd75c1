//! Loudspeaker array description.
//!
//! This is the configuration interface the renderer consumes; file parsing
//! lives outside the core. Construction validates the geometry so every
//! downstream component can rely on indices being in range.

use serde::{Deserialize, Serialize};

use sf_core::{ConfigError, ConfigResult, Sample, db_to_linear};
use sf_dsp::ParametricIirSpec;
use sf_objects::CartesianPosition;

/// Index into the regular-loudspeaker list of an array.
pub type TripletIndex = usize;

/// Sentinel for the unused third vertex of a pair (2-D arrays).
pub const PAIR_SENTINEL: TripletIndex = usize::MAX;

/// One regular loudspeaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loudspeaker {
    /// Host-assigned identifier, used in diagnostics only.
    pub id: u32,
    pub position: CartesianPosition,
    /// Physical output channel (zero-offset).
    pub channel: usize,
    /// Output gain trim in dB.
    #[serde(default)]
    pub gain_db: Sample,
    /// Output delay trim in seconds.
    #[serde(default)]
    pub delay_seconds: Sample,
    /// Optional per-output equalisation stages.
    #[serde(default)]
    pub eq: Vec<ParametricIirSpec<Sample>>,
}

impl Loudspeaker {
    pub fn new(id: u32, position: CartesianPosition, channel: usize) -> Self {
        Self {
            id,
            position,
            channel,
            gain_db: 0.0,
            delay_seconds: 0.0,
            eq: Vec::new(),
        }
    }
}

/// One subwoofer: a physical channel fed by a weighted sum of the regular
/// loudspeaker signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubwooferConfig {
    pub channel: usize,
    /// Weight per regular loudspeaker.
    pub weights: Vec<Sample>,
    #[serde(default)]
    pub gain_db: Sample,
    #[serde(default)]
    pub delay_seconds: Sample,
}

/// Full array description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudspeakerArray {
    speakers: Vec<Loudspeaker>,
    /// VBAP triplets (or pairs with [`PAIR_SENTINEL`] third vertex for 2-D
    /// arrays), referencing speaker list indices.
    triplets: Vec<[TripletIndex; 3]>,
    #[serde(default)]
    subwoofers: Vec<SubwooferConfig>,
    /// Optional re-routing matrix `real x virtual` mapping virtual
    /// loudspeakers onto real ones.
    #[serde(default)]
    rerouting: Option<Vec<Vec<Sample>>>,
    #[serde(default)]
    is_2d: bool,
    /// Infinite (plane-wave) arrays skip listener-position compensation.
    #[serde(default)]
    is_infinite: bool,
}

impl LoudspeakerArray {
    pub fn new(
        speakers: Vec<Loudspeaker>,
        triplets: Vec<[TripletIndex; 3]>,
        is_2d: bool,
        is_infinite: bool,
    ) -> ConfigResult<Self> {
        let array = Self {
            speakers,
            triplets,
            subwoofers: Vec::new(),
            rerouting: None,
            is_2d,
            is_infinite,
        };
        array.validate()?;
        Ok(array)
    }

    pub fn with_subwoofers(mut self, subwoofers: Vec<SubwooferConfig>) -> ConfigResult<Self> {
        self.subwoofers = subwoofers;
        self.validate()?;
        Ok(self)
    }

    pub fn with_rerouting(mut self, rerouting: Vec<Vec<Sample>>) -> ConfigResult<Self> {
        self.rerouting = Some(rerouting);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.speakers.is_empty() {
            return Err(ConfigError::LoudspeakerArray(
                "array has no loudspeakers".to_string(),
            ));
        }
        for speaker in &self.speakers {
            if !speaker.position.is_finite() {
                return Err(ConfigError::LoudspeakerArray(format!(
                    "loudspeaker {} has a non-finite position",
                    speaker.id
                )));
            }
            if speaker.position.norm() == 0.0 {
                return Err(ConfigError::LoudspeakerArray(format!(
                    "loudspeaker {} sits at the origin",
                    speaker.id
                )));
            }
        }
        let mut channels: Vec<usize> = self
            .speakers
            .iter()
            .map(|s| s.channel)
            .chain(self.subwoofers.iter().map(|s| s.channel))
            .collect();
        channels.sort_unstable();
        channels.dedup();
        if channels.len() != self.speakers.len() + self.subwoofers.len() {
            return Err(ConfigError::LoudspeakerArray(
                "duplicate output channel assignment".to_string(),
            ));
        }
        for (idx, triplet) in self.triplets.iter().enumerate() {
            let vertices = if self.is_2d { 2 } else { 3 };
            for &vertex in triplet.iter().take(vertices) {
                if vertex >= self.speakers.len() {
                    return Err(ConfigError::LoudspeakerArray(format!(
                        "triplet {idx} references loudspeaker index {vertex} out of range"
                    )));
                }
            }
            if self.is_2d && triplet[2] != PAIR_SENTINEL {
                return Err(ConfigError::LoudspeakerArray(format!(
                    "triplet {idx}: 2-D arrays use pairs with a sentinel third vertex"
                )));
            }
        }
        for (idx, sub) in self.subwoofers.iter().enumerate() {
            if sub.weights.len() != self.speakers.len() {
                return Err(ConfigError::LoudspeakerArray(format!(
                    "subwoofer {idx} has {} weights for {} loudspeakers",
                    sub.weights.len(),
                    self.speakers.len()
                )));
            }
        }
        if let Some(rerouting) = &self.rerouting {
            for (row_idx, row) in rerouting.iter().enumerate() {
                if row_idx >= self.speakers.len() {
                    return Err(ConfigError::LoudspeakerArray(
                        "re-routing matrix has more rows than loudspeakers".to_string(),
                    ));
                }
                if row.is_empty() {
                    return Err(ConfigError::LoudspeakerArray(format!(
                        "re-routing row {row_idx} is empty"
                    )));
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn num_regular_speakers(&self) -> usize {
        self.speakers.len()
    }

    #[inline]
    pub fn num_subwoofers(&self) -> usize {
        self.subwoofers.len()
    }

    /// Regular loudspeakers plus subwoofers.
    #[inline]
    pub fn num_output_signals(&self) -> usize {
        self.speakers.len() + self.subwoofers.len()
    }

    #[inline]
    pub fn speakers(&self) -> &[Loudspeaker] {
        &self.speakers
    }

    #[inline]
    pub fn speaker(&self, index: usize) -> &Loudspeaker {
        &self.speakers[index]
    }

    #[inline]
    pub fn triplets(&self) -> &[[TripletIndex; 3]] {
        &self.triplets
    }

    #[inline]
    pub fn subwoofers(&self) -> &[SubwooferConfig] {
        &self.subwoofers
    }

    #[inline]
    pub fn rerouting(&self) -> Option<&Vec<Vec<Sample>>> {
        self.rerouting.as_ref()
    }

    #[inline]
    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.is_infinite
    }

    /// Linear gain trims for all output signals (speakers then subwoofers).
    pub fn gain_adjustments(&self) -> Vec<Sample> {
        self.speakers
            .iter()
            .map(|s| db_to_linear(s.gain_db))
            .chain(self.subwoofers.iter().map(|s| db_to_linear(s.gain_db)))
            .collect()
    }

    /// Delay trims in seconds for all output signals.
    pub fn delay_adjustments(&self) -> Vec<Sample> {
        self.speakers
            .iter()
            .map(|s| s.delay_seconds)
            .chain(self.subwoofers.iter().map(|s| s.delay_seconds))
            .collect()
    }

    /// Physical output channel per output signal.
    pub fn output_channels(&self) -> Vec<usize> {
        self.speakers
            .iter()
            .map(|s| s.channel)
            .chain(self.subwoofers.iter().map(|s| s.channel))
            .collect()
    }

    /// Does any output declare equalisation stages?
    pub fn output_eq_present(&self) -> bool {
        self.speakers.iter().any(|s| !s.eq.is_empty())
    }

    /// Largest number of EQ stages declared on any output.
    pub fn output_eq_sections(&self) -> usize {
        self.speakers.iter().map(|s| s.eq.len()).max().unwrap_or(0)
    }

    /// Subwoofer mix weights as a `subwoofers x speakers` row list.
    pub fn subwoofer_gains(&self) -> Vec<Vec<Sample>> {
        self.subwoofers.iter().map(|s| s.weights.clone()).collect()
    }

    // ============ Canonical layouts ============

    /// Horizontal stereo pair at +/- `half_angle_deg` degrees azimuth.
    pub fn stereo(half_angle_deg: Sample) -> ConfigResult<Self> {
        let left = CartesianPosition::from_spherical_deg(half_angle_deg, 0.0, 1.0);
        let right = CartesianPosition::from_spherical_deg(-half_angle_deg, 0.0, 1.0);
        Self::new(
            vec![
                Loudspeaker::new(1, left, 0),
                Loudspeaker::new(2, right, 1),
            ],
            vec![[0, 1, PAIR_SENTINEL]],
            true,
            false,
        )
    }

    /// Horizontal 5.0 layout (L, R, C, Ls, Rs) at ITU angles, channel order
    /// L R C Ls Rs.
    pub fn itu_50() -> ConfigResult<Self> {
        let angles: [Sample; 5] = [30.0, -30.0, 0.0, 110.0, -110.0];
        let speakers = angles
            .iter()
            .enumerate()
            .map(|(idx, &az)| {
                Loudspeaker::new(
                    idx as u32 + 1,
                    CartesianPosition::from_spherical_deg(az, 0.0, 1.0),
                    idx,
                )
            })
            .collect();
        // Adjacent pairs around the circle: C-L, L-Ls, Ls-Rs, Rs-R, R-C.
        let pairs = vec![
            [2, 0, PAIR_SENTINEL],
            [0, 3, PAIR_SENTINEL],
            [3, 4, PAIR_SENTINEL],
            [4, 1, PAIR_SENTINEL],
            [1, 2, PAIR_SENTINEL],
        ];
        Self::new(speakers, pairs, true, false)
    }
}
