//! Error types for the soundfield renderer

use thiserror::Error;

/// Errors raised while constructing or initialising a signal flow.
///
/// All of these are fatal: a graph that produced one must not be started.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate component name '{name}' in '{parent}'")]
    DuplicateComponentName { parent: String, name: String },

    #[error("duplicate port name '{port}' on component '{component}'")]
    DuplicatePortName { component: String, port: String },

    #[error("port '{0}' not found")]
    PortNotFound(String),

    #[error("component '{0}' not found")]
    ComponentNotFound(String),

    #[error("width mismatch on connection {connection}: producer {producer} vs consumer {consumer}")]
    WidthMismatch {
        connection: String,
        producer: usize,
        consumer: usize,
    },

    #[error("channel range {range} exceeds width {width} of port '{port}'")]
    ChannelRangeOutOfBounds {
        port: String,
        range: String,
        width: usize,
    },

    #[error("audio input '{0}' is not connected")]
    UnconnectedInput(String),

    #[error("invalid connection {connection}: {detail}")]
    InvalidConnection { connection: String, detail: String },

    #[error("audio input channel {channel} of '{port}' has {count} producers, expected exactly one")]
    ChannelFanIn {
        port: String,
        channel: usize,
        count: usize,
    },

    #[error("cycle in the audio connection graph involving '{0}'")]
    AudioCycle(String),

    #[error("parameter cycle through shared-protocol edges involving '{0}'")]
    SharedParameterCycle(String),

    #[error("parameter connection {connection}: {detail}")]
    ParameterMismatch { connection: String, detail: String },

    #[error("invalid interpolation period {period}: must be a nonzero multiple of the block size {block_size}")]
    InvalidInterpolationPeriod { period: usize, block_size: usize },

    #[error("unsupported interpolation method '{0}'")]
    UnsupportedInterpolationMethod(String),

    #[error("unknown FFT provider '{0}'")]
    UnknownFftProvider(String),

    #[error("invalid filter length {length}: {detail}")]
    InvalidFilterLength { length: usize, detail: String },

    #[error("parameter '{parameter}' out of range: {detail}")]
    OutOfRange {
        parameter: &'static str,
        detail: String,
    },

    #[error("loudspeaker array: {0}")]
    LoudspeakerArray(String),
}

/// Errors raised inside `process()` and surfaced to the host.
///
/// The failing atom's outputs are zero-filled for the current block; the
/// graph remains usable for the next block.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("component '{component}': {detail}")]
    Component { component: String, detail: String },

    #[error("numeric kernel failure in '{component}': {detail}")]
    Kernel { component: String, detail: String },

    #[error("capacity exceeded in '{component}': {detail}")]
    CapacityExceeded { component: String, detail: String },
}

/// Result alias for configuration-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result alias for per-block operations.
pub type ProcessResult<T> = Result<T, ProcessError>;
