//! Type-erased parameter port endpoints.
//!
//! The graph connects parameter ports by name without knowing their payload
//! type. Every typed handle registers a [`PortCell`] behind the object-safe
//! [`AnyParameterEndpoint`]; connecting re-points the consumer's core `Rc` at
//! the producer's after checking kind, protocol and configuration agreement.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::values::{ParameterConfig, ParameterKind, ProtocolKind};

/// Direction of a port relative to its owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Shared cell behind one typed parameter port handle.
///
/// `C` is the protocol core type (e.g. `DoubleBufferedCore<VectorParameter>`).
pub struct PortCell<C: 'static> {
    name: String,
    direction: PortDirection,
    kind: ParameterKind,
    protocol: ProtocolKind,
    config: ParameterConfig,
    core: RefCell<Rc<RefCell<C>>>,
}

impl<C: 'static> PortCell<C> {
    pub fn new(
        name: &str,
        direction: PortDirection,
        kind: ParameterKind,
        protocol: ProtocolKind,
        config: ParameterConfig,
        core: C,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            direction,
            kind,
            protocol,
            config,
            core: RefCell::new(Rc::new(RefCell::new(core))),
        })
    }

    /// Current protocol core. Cheap `Rc` clone; borrow locally.
    #[inline]
    pub fn core(&self) -> Rc<RefCell<C>> {
        self.core.borrow().clone()
    }

    /// Create a detached producer-side endpoint sharing this cell's core.
    ///
    /// Used for external (host-facing) parameter inputs: the host writes
    /// through the counterpart while every resolved consumer shares the same
    /// core.
    pub fn make_external_producer(&self) -> Rc<Self> {
        Rc::new(Self {
            name: self.name.clone(),
            direction: PortDirection::Output,
            kind: self.kind,
            protocol: self.protocol,
            config: self.config,
            core: RefCell::new(self.core()),
        })
    }
}

/// Object-safe view of a [`PortCell`] used by the graph layer.
pub trait AnyParameterEndpoint {
    fn name(&self) -> &str;
    fn direction(&self) -> PortDirection;
    fn kind(&self) -> ParameterKind;
    fn protocol(&self) -> ProtocolKind;
    fn config(&self) -> ParameterConfig;
    fn as_any(&self) -> &dyn Any;
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;

    /// Create a detached producer-side endpoint sharing this cell's core.
    fn external_producer(self: Rc<Self>) -> Rc<dyn AnyParameterEndpoint>;

    /// Re-point this (consumer) endpoint at the producer's core.
    ///
    /// Fails when the two ends disagree on payload kind, protocol or
    /// configuration, or when the core types differ.
    fn adopt(&self, producer: &dyn AnyParameterEndpoint) -> Result<(), String>;
}

impl<C: 'static> AnyParameterEndpoint for PortCell<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> PortDirection {
        self.direction
    }

    fn kind(&self) -> ParameterKind {
        self.kind
    }

    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    fn config(&self) -> ParameterConfig {
        self.config
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn external_producer(self: Rc<Self>) -> Rc<dyn AnyParameterEndpoint> {
        self.make_external_producer()
    }

    fn adopt(&self, producer: &dyn AnyParameterEndpoint) -> Result<(), String> {
        if self.kind != producer.kind() {
            return Err(format!(
                "parameter kind mismatch: {:?} vs {:?}",
                self.kind,
                producer.kind()
            ));
        }
        if self.protocol != producer.protocol() {
            return Err(format!(
                "protocol mismatch: {:?} vs {:?}",
                self.protocol,
                producer.protocol()
            ));
        }
        if self.config != producer.config() {
            return Err(format!(
                "parameter configuration mismatch: {:?} vs {:?}",
                self.config,
                producer.config()
            ));
        }
        let producer_cell = producer
            .as_any()
            .downcast_ref::<PortCell<C>>()
            .ok_or_else(|| "parameter core type mismatch".to_string())?;
        *self.core.borrow_mut() = producer_cell.core();
        Ok(())
    }
}

/// Descriptor of one parameter port as registered with the graph.
#[derive(Clone)]
pub struct ParameterPortDesc {
    pub endpoint: Rc<dyn AnyParameterEndpoint>,
}

impl ParameterPortDesc {
    pub fn new(endpoint: Rc<dyn AnyParameterEndpoint>) -> Self {
        Self { endpoint }
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn direction(&self) -> PortDirection {
        self.endpoint.direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SharedInput, SharedOutput};
    use crate::values::{MatrixParameter, VectorParameter};

    #[test]
    fn kind_mismatch_is_rejected() {
        let output = SharedOutput::new("out", VectorParameter::zeros(4, 1));
        let input = SharedInput::new("in", MatrixParameter::zeros(2, 2, 1));
        let err = input.cell().adopt(&*output.cell()).unwrap_err();
        assert!(err.contains("kind mismatch"), "{err}");
    }

    #[test]
    fn external_producer_shares_core() {
        let input = SharedInput::new("in", VectorParameter::zeros(2, 1));
        let producer_cell = input.cell().make_external_producer();
        // Writing through the counterpart is visible at the input.
        producer_cell.core().borrow_mut().value.as_mut_slice()[1] = 7.0;
        assert_eq!(input.with(|v| v.as_slice()[1]), 7.0);
    }
}
