//! sf-param: Typed parameters and their delivery protocols
//!
//! Control-rate data travels between components as typed parameter values
//! over one of three protocols:
//! - **Shared**: producer and consumer reference the same storage cell;
//!   writes are visible within the block, ordering comes from the schedule.
//! - **DoubleBuffered**: front/back cells with an explicit publish and a
//!   once-per-publish `changed()` flag; enables one-block-delayed loops.
//! - **MessageQueue**: bounded FIFO with drop-newest overflow, for side-band
//!   updates such as freshly synthesised impulse responses.
//!
//! Ports are typed handles owning a protocol core behind `Rc<RefCell<_>>`;
//! connecting two ports unifies their cores and is checked for parameter
//! kind, protocol and configuration agreement. Cross-thread ingress uses a
//! lock-free SPSC ring (`rtrb`).

mod bridge;
mod endpoint;
mod protocol;
mod values;

pub use bridge::{AsyncParameterBridge, AsyncReceiver, AsyncSender};
pub use endpoint::{
    AnyParameterEndpoint, ParameterPortDesc, PortCell, PortDirection,
};
pub use protocol::{
    DEFAULT_QUEUE_CAPACITY, DoubleBufferedCore, DoubleBufferedInput, DoubleBufferedOutput,
    MessageQueueCore, MessageQueueInput, MessageQueueOutput, SharedCore, SharedInput, SharedOutput,
};
pub use values::{
    BiquadMatrixParameter, IndexedVectorParameter, LateReverbParameter, ListenerPositionParameter,
    MatrixParameter, ObjectVectorParameter, ParameterConfig, ParameterKind, ParameterValue,
    ProtocolKind, SignalRoutingEntry, SignalRoutingParameter, TimeFrequencyParameter,
    VectorParameter,
};
