//! sf-dsp: Real-time DSP building blocks
//!
//! The sample-rate primitives the atomic components are assembled from:
//! - `circular_buffer` - multichannel ring with a shadow copy for contiguous
//!   delayed reads
//! - `interpolation` - fractional-delay interpolator family (nearest, linear,
//!   Lagrange orders 0-9)
//! - `biquad` - coefficient containers and the TDF2 section kernel
//! - `parametric` - parametric EQ descriptor to biquad derivation
//! - `gain_interp` - ramp-based time-varying gain matrix core
//! - `fft` - named-provider real FFT wrapper
//! - `convolver` - uniformly partitioned frequency-domain FIR matrix with
//!   routing, plus a crossfading variant
//! - `channel_allocator` - stable object-to-channel slot allocation

pub mod biquad;
pub mod channel_allocator;
pub mod circular_buffer;
pub mod convolver;
pub mod fft;
pub mod gain_interp;
pub mod interpolation;
pub mod parametric;

pub use biquad::{BiquadCoeff, BiquadCoeffList, BiquadCoeffMatrix};
pub use channel_allocator::ObjectChannelAllocator;
pub use circular_buffer::CircularBuffer;
pub use convolver::{CrossfadingConvolver, FilterRouting, FilterRoutingList, PartitionedConvolver};
pub use fft::FftWrapper;
pub use gain_interp::GainMatrixCore;
pub use interpolation::{FractionalDelay, InterpolationMethod, make_interpolator};
pub use parametric::{ParametricIirKind, ParametricIirSpec};
