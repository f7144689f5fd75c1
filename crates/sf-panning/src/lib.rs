//! sf-panning: Loudspeaker geometry and amplitude-panning gain laws
//!
//! Consumes the loudspeaker-array description provided by the host and
//! implements the three panning laws of the renderer:
//! - `Vbap` - triplet/pair search with listener tracking
//! - `AllRad` - HOA decoding through a virtual regular array
//! - `Cap` - listener-axis compensated, energy-minimising panning

mod allrad;
mod array;
mod cap;
mod vbap;

pub use allrad::AllRad;
pub use array::{Loudspeaker, LoudspeakerArray, SubwooferConfig, TripletIndex, PAIR_SENTINEL};
pub use cap::Cap;
pub use vbap::Vbap;
