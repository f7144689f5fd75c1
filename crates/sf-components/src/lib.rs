//! sf-components: Atomic DSP components and parameter calculators
//!
//! The leaves of the rendering graph. Audio atoms transform sample blocks
//! (gains, delays, filters, routing, diffusion); calculator atoms walk the
//! per-block scene and emit the parameters the audio atoms consume.

mod add;
mod biquad_iir;
mod cap_gain_calculator;
mod channel_object_routing_calculator;
mod delay_vector;
mod diffusion;
mod diffusion_gain_calculator;
mod fir_filter_matrix;
mod gain_matrix;
mod gain_vector;
mod hoa_allrad_gain_calculator;
mod listener_compensation;
mod null_source;
mod object_gain_eq_calculator;
mod panning_calculator;
mod signal_routing;
mod time_frequency;

pub use add::Add;
pub use biquad_iir::BiquadIirFilter;
pub use cap_gain_calculator::CapGainCalculator;
pub use channel_object_routing_calculator::ChannelObjectRoutingCalculator;
pub use delay_vector::DelayVector;
pub use diffusion::SingleToMultichannelDiffusion;
pub use diffusion_gain_calculator::DiffusionGainCalculator;
pub use fir_filter_matrix::FirFilterMatrix;
pub use gain_matrix::GainMatrix;
pub use gain_vector::GainVector;
pub use hoa_allrad_gain_calculator::HoaAllRadGainCalculator;
pub use listener_compensation::ListenerCompensation;
pub use null_source::NullSource;
pub use object_gain_eq_calculator::ObjectGainEqCalculator;
pub use panning_calculator::PanningCalculator;
pub use signal_routing::SignalRouting;
pub use time_frequency::{InverseTimeFrequencyTransform, TimeFrequencyTransform};
