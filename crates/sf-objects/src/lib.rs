//! sf-objects: Audio object scene model
//!
//! The typed scene entities the renderer consumes: a closed set of object
//! variants dispatched by tag, the id-keyed object vector delivered to the
//! graph once per block, and the reverb extension data (discrete reflections
//! and late-reverb envelopes).

mod object;
mod reverb;
mod vector;

pub use object::*;
pub use reverb::*;
pub use vector::*;
