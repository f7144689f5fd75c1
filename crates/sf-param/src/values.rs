//! Parameter value types.

use rustfft::num_complex::Complex;

use sf_core::Sample;
use sf_dsp::BiquadCoeffMatrix;
use sf_num::{AlignedMatrix, AlignedVec};
use sf_objects::{CartesianPosition, LateReverb, ObjectVector};

/// Tag identifying the payload type of a parameter port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Vector,
    Matrix,
    BiquadMatrix,
    ObjectVector,
    SignalRouting,
    IndexedVector,
    ListenerPosition,
    LateReverb,
    TimeFrequency,
}

/// Tag identifying the delivery protocol of a parameter port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Shared,
    DoubleBuffered,
    MessageQueue,
}

/// Structural configuration of a parameter value; connection endpoints must
/// agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterConfig {
    Empty,
    Vector { size: usize },
    Matrix { rows: usize, cols: usize },
    BiquadMatrix { channels: usize, sections: usize },
    TimeFrequency { channels: usize, bins: usize },
}

/// Implemented by every type usable as a parameter payload.
pub trait ParameterValue: 'static {
    const KIND: ParameterKind;

    fn config(&self) -> ParameterConfig;
}

// ============ Vector / matrix ============

/// Aligned vector of samples (gains, delays, levels).
#[derive(Debug, Clone)]
pub struct VectorParameter(pub AlignedVec<Sample>);

impl VectorParameter {
    pub fn zeros(size: usize, alignment: usize) -> Self {
        Self(AlignedVec::new(size, alignment))
    }

    pub fn filled(value: Sample, size: usize, alignment: usize) -> Self {
        let mut v = AlignedVec::new(size, alignment);
        v.as_mut_slice().fill(value);
        Self(v)
    }
}

impl core::ops::Deref for VectorParameter {
    type Target = AlignedVec<Sample>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for VectorParameter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ParameterValue for VectorParameter {
    const KIND: ParameterKind = ParameterKind::Vector;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Vector { size: self.0.len() }
    }
}

/// Aligned matrix of samples (gain matrices, panning rows).
#[derive(Debug, Clone)]
pub struct MatrixParameter(pub AlignedMatrix<Sample>);

impl MatrixParameter {
    pub fn zeros(rows: usize, cols: usize, alignment: usize) -> Self {
        Self(AlignedMatrix::new(rows, cols, alignment))
    }
}

impl core::ops::Deref for MatrixParameter {
    type Target = AlignedMatrix<Sample>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for MatrixParameter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ParameterValue for MatrixParameter {
    const KIND: ParameterKind = ParameterKind::Matrix;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Matrix {
            rows: self.0.rows(),
            cols: self.0.cols(),
        }
    }
}

// ============ Biquads ============

/// Matrix of biquad sections, `channels x sections`.
#[derive(Debug, Clone)]
pub struct BiquadMatrixParameter(pub BiquadCoeffMatrix<Sample>);

impl BiquadMatrixParameter {
    pub fn identity(channels: usize, sections: usize) -> Self {
        Self(BiquadCoeffMatrix::identity(channels, sections))
    }
}

impl core::ops::Deref for BiquadMatrixParameter {
    type Target = BiquadCoeffMatrix<Sample>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for BiquadMatrixParameter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ParameterValue for BiquadMatrixParameter {
    const KIND: ParameterKind = ParameterKind::BiquadMatrix;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::BiquadMatrix {
            channels: self.0.channels(),
            sections: self.0.sections_per_channel(),
        }
    }
}

// ============ Scene ============

/// The per-block scene snapshot.
#[derive(Debug, Clone, Default)]
pub struct ObjectVectorParameter(pub ObjectVector);

impl core::ops::Deref for ObjectVectorParameter {
    type Target = ObjectVector;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for ObjectVectorParameter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ParameterValue for ObjectVectorParameter {
    const KIND: ParameterKind = ParameterKind::ObjectVector;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Empty
    }
}

/// Tracked listener pose.
#[derive(Debug, Clone, Copy)]
pub struct ListenerPositionParameter {
    pub position: CartesianPosition,
    /// Unit vector along the interaural axis.
    pub aural_axis: CartesianPosition,
}

impl Default for ListenerPositionParameter {
    fn default() -> Self {
        Self {
            position: CartesianPosition::default(),
            aural_axis: CartesianPosition::new(0.0, 1.0, 0.0),
        }
    }
}

impl ParameterValue for ListenerPositionParameter {
    const KIND: ParameterKind = ParameterKind::ListenerPosition;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Empty
    }
}

// ============ Routing ============

/// One signal-routing point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRoutingEntry {
    pub input: usize,
    pub output: usize,
}

/// Set of routing points; each output is fed by at most one input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalRoutingParameter {
    entries: Vec<SignalRoutingEntry>,
}

impl SignalRoutingParameter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `input` to `output`, replacing any previous routing to that
    /// output.
    pub fn add_routing(&mut self, input: usize, output: usize) {
        self.remove_output(output);
        self.entries.push(SignalRoutingEntry { input, output });
    }

    /// Remove the routing feeding `output`, if any.
    pub fn remove_output(&mut self, output: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.output != output);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn input_for_output(&self, output: usize) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.output == output)
            .map(|e| e.input)
    }

    pub fn entries(&self) -> &[SignalRoutingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ParameterValue for SignalRoutingParameter {
    const KIND: ParameterKind = ParameterKind::SignalRouting;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Empty
    }
}

// ============ Messages ============

/// A vector value addressed to an index (e.g. a filter slot).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVectorParameter {
    pub index: usize,
    pub values: Vec<Sample>,
}

impl ParameterValue for IndexedVectorParameter {
    const KIND: ParameterKind = ParameterKind::IndexedVector;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Empty
    }
}

/// Late-reverb descriptor addressed to a rendering slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LateReverbParameter {
    pub slot: usize,
    pub params: LateReverb,
}

impl ParameterValue for LateReverbParameter {
    const KIND: ParameterKind = ParameterKind::LateReverb;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::Empty
    }
}

// ============ Time-frequency ============

/// One block of per-channel DFT frames.
#[derive(Debug, Clone)]
pub struct TimeFrequencyParameter {
    channels: usize,
    bins: usize,
    data: Vec<Complex<Sample>>,
}

impl TimeFrequencyParameter {
    pub fn zeros(channels: usize, bins: usize) -> Self {
        Self {
            channels,
            bins,
            data: vec![Complex::new(0.0, 0.0); channels * bins],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[Complex<Sample>] {
        &self.data[channel * self.bins..(channel + 1) * self.bins]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Complex<Sample>] {
        &mut self.data[channel * self.bins..(channel + 1) * self.bins]
    }
}

impl ParameterValue for TimeFrequencyParameter {
    const KIND: ParameterKind = ParameterKind::TimeFrequency;

    fn config(&self) -> ParameterConfig {
        ParameterConfig::TimeFrequency {
            channels: self.channels,
            bins: self.bins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_replaces_per_output() {
        let mut routing = SignalRoutingParameter::new();
        routing.add_routing(0, 3);
        routing.add_routing(1, 3);
        assert_eq!(routing.len(), 1);
        assert_eq!(routing.input_for_output(3), Some(1));
        assert!(routing.remove_output(3));
        assert!(routing.is_empty());
    }

    #[test]
    fn configs_capture_shape() {
        let v = VectorParameter::zeros(5, 4);
        assert_eq!(v.config(), ParameterConfig::Vector { size: 5 });
        let m = MatrixParameter::zeros(2, 3, 4);
        assert_eq!(m.config(), ParameterConfig::Matrix { rows: 2, cols: 3 });
        let b = BiquadMatrixParameter::identity(4, 2);
        assert_eq!(
            b.config(),
            ParameterConfig::BiquadMatrix {
                channels: 4,
                sections: 2
            }
        );
    }
}
