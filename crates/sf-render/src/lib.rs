//! sf-render: Top-level renderer signal flows
//!
//! Composes the component library into the complete object-based rendering
//! graph:
//! - [`CoreRenderer`] builds the composite wiring object gain and EQ, the
//!   channel/VBAP/diffuse/reverb paths, listener compensation, subwoofer
//!   mixing, output equalisation and trims, and the physical channel map.
//! - [`BaselineRenderer`] owns the runnable [`sf_graph::SignalFlow`] plus
//!   the lock-free ingress for scene and listener updates arriving from
//!   other threads.
//! - `decorrelation` synthesises the default random-phase allpass filter
//!   bank used when the host supplies none.

mod baseline;
mod core_renderer;
pub mod decorrelation;

pub use baseline::{BaselineRenderer, ListenerSender, SceneSender};
pub use core_renderer::{CoreRenderer, CoreRendererConfig, HoaDecodeConfig};
