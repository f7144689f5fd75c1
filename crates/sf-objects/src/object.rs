//! Scene object types.

use serde::{Deserialize, Serialize};

use sf_core::Sample;

use crate::reverb::{DiscreteReflection, LateReverb};

/// Identifier of a logical scene object; stable across blocks.
pub type ObjectId = u32;

/// Cartesian position in metres, listener-centric coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartesianPosition {
    pub x: Sample,
    pub y: Sample,
    pub z: Sample,
}

impl CartesianPosition {
    pub fn new(x: Sample, y: Sample, z: Sample) -> Self {
        Self { x, y, z }
    }

    /// Convert spherical coordinates (degrees, radius) to Cartesian.
    ///
    /// Azimuth 0 points along +x (front), positive azimuth turns left
    /// (towards +y); elevation is positive upwards.
    pub fn from_spherical_deg(azimuth_deg: Sample, elevation_deg: Sample, radius: Sample) -> Self {
        let az = azimuth_deg.to_radians();
        let el = elevation_deg.to_radians();
        Self {
            x: radius * el.cos() * az.cos(),
            y: radius * el.cos() * az.sin(),
            z: radius * el.sin(),
        }
    }

    pub fn norm(&self) -> Sample {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Variant-specific payload of a scene object.
///
/// The set is closed; calculators dispatch on the tag and ignore variants
/// they do not handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectPayload {
    PointSource {
        position: CartesianPosition,
    },
    PointSourceWithDiffuseness {
        position: CartesianPosition,
        /// Fraction of the object's energy routed through the decorrelated
        /// diffuse path, in `[0, 1]`.
        diffuseness: Sample,
    },
    PlaneWave {
        azimuth_deg: Sample,
        elevation_deg: Sample,
        /// Distance used for delay compensation of the wavefront; does not
        /// affect panning.
        reference_distance: Sample,
    },
    ChannelObject {
        /// Direct output loudspeaker indices, one per object channel.
        output_channels: Vec<usize>,
        diffuseness: Sample,
    },
    HoaSource {
        order: usize,
        /// Signal channels holding the harmonic coefficients, ACN order.
        harmonic_channels: Vec<usize>,
    },
    DiffuseSource,
    PointSourceWithReverb {
        position: CartesianPosition,
        discrete_reflections: Vec<DiscreteReflection>,
        late_reverb: LateReverb,
    },
}

impl ObjectPayload {
    /// Position of the object if the variant carries one.
    pub fn position(&self) -> Option<CartesianPosition> {
        match self {
            ObjectPayload::PointSource { position }
            | ObjectPayload::PointSourceWithDiffuseness { position, .. }
            | ObjectPayload::PointSourceWithReverb { position, .. } => Some(*position),
            ObjectPayload::PlaneWave {
                azimuth_deg,
                elevation_deg,
                ..
            } => Some(CartesianPosition::from_spherical_deg(
                *azimuth_deg,
                *elevation_deg,
                1.0,
            )),
            _ => None,
        }
    }
}

/// One scene object as delivered by the scene decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioObject {
    pub id: ObjectId,
    /// Zero-offset index of the object's signal in the renderer input.
    pub channel_index: usize,
    /// Linear level factor, applied by the rendering paths (panning,
    /// reverb).
    pub level: Sample,
    /// Linear input trim, applied once at the object-gain stage ahead of
    /// all paths.
    #[serde(default = "unity_gain")]
    pub gain: Sample,
    pub group_id: u32,
    pub priority: u8,
    /// Optional per-object EQ applied ahead of all rendering paths.
    #[serde(default)]
    pub eq: Vec<sf_dsp::ParametricIirSpec<Sample>>,
    pub payload: ObjectPayload,
}

fn unity_gain() -> Sample {
    1.0
}

impl AudioObject {
    /// Minimal constructor for the common single-channel case.
    pub fn new(id: ObjectId, channel_index: usize, level: Sample, payload: ObjectPayload) -> Self {
        Self {
            id,
            channel_index,
            level,
            gain: 1.0,
            group_id: 0,
            priority: 0,
            eq: Vec::new(),
            payload,
        }
    }
}
