//! sf-graph: Component model, flattening and block scheduling
//!
//! The rendering graph is a tree of components: atomic leaves implementing
//! `process()`, composite interior nodes declaring children and connections.
//! At initialise time the tree is flattened into a fixed execution order over
//! one shared, SIMD-aligned buffer pool; composite-level connections become
//! pure row aliasing, so audio moves through the graph without copies.
//!
//! Per block, [`SignalFlow::process`] dispatches the frozen schedule. Atoms
//! may not allocate, block or fail the whole graph: an erroring atom is
//! reported through the status sink, its outputs are zeroed, and the block
//! continues.

mod comm;
mod component;
mod flatten;
mod flow;
mod ports;

pub use comm::{CommunicationArea, ProcessIo};
pub use component::{
    AtomicComponent, AudioConnection, Child, ComponentInfo, CompositeComponent,
    ParameterConnection, PortRef,
};
pub use flow::SignalFlow;
pub use ports::{AudioInputHandle, AudioOutputHandle, AudioPortDecl};

/// Component path referring to the enclosing composite's own ports in
/// connection declarations.
pub const SELF: &str = "";
