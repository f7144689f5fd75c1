//! sf-reverb: Object-based reverberation
//!
//! `PointSourceWithReverb` objects are allocated to persistent rendering
//! slots. Per slot the pipeline renders a set of deterministic early
//! reflections (delay, wall filter, panning) and a late tail synthesised
//! from subband envelopes into an FIR filter:
//!
//! - [`ReverbParameterCalculator`] walks the scene and drives every atom of
//!   the slot pipeline, sending `(slot, LateReverb)` messages whenever a
//!   tail descriptor changes beyond the comparison tolerance.
//! - [`LateReverbFilterCalculator`] turns those messages into impulse
//!   responses (seeded noise, subband filter bank, envelope) and forwards
//!   them to the late FIR matrix.
//! - [`ReverbObjectRenderer`] is the composite wiring both calculators with
//!   the audio atoms into one bus feeding the main mix.

mod late_reverb_filter_calculator;
mod renderer;
mod reverb_parameter_calculator;

pub use late_reverb_filter_calculator::LateReverbFilterCalculator;
pub use renderer::{ReverbObjectRenderer, ReverbRendererConfig};
pub use reverb_parameter_calculator::ReverbParameterCalculator;
