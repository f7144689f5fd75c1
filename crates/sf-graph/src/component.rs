//! Component model: atomic leaves and composite interior nodes.

use std::ops::Range;
use std::rc::Rc;

use sf_core::{ConfigError, ConfigResult, ProcessResult};
use sf_param::{AnyParameterEndpoint, ParameterPortDesc, PortDirection};

use crate::comm::ProcessIo;
use crate::ports::{AudioInputHandle, AudioOutputHandle, AudioPortBinding, AudioPortDecl};

/// Port registry of one component: its name plus the declared audio and
/// parameter ports.
pub struct ComponentInfo {
    name: String,
    audio_ports: Vec<AudioPortDecl>,
    parameter_ports: Vec<ParameterPortDesc>,
}

impl ComponentInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            audio_ports: Vec::new(),
            parameter_ports: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_unique(&self, port: &str) -> ConfigResult<()> {
        let clash = self.audio_ports.iter().any(|p| p.name == port)
            || self.parameter_ports.iter().any(|p| p.name() == port);
        if clash {
            return Err(ConfigError::DuplicatePortName {
                component: self.name.clone(),
                port: port.to_string(),
            });
        }
        Ok(())
    }

    /// Declare an audio input of fixed width.
    pub fn audio_input(&mut self, name: &str, width: usize) -> ConfigResult<AudioInputHandle> {
        self.check_unique(name)?;
        let binding = AudioPortBinding::new(width);
        self.audio_ports.push(AudioPortDecl {
            name: name.to_string(),
            direction: PortDirection::Input,
            binding: binding.clone(),
        });
        Ok(AudioInputHandle { binding })
    }

    /// Declare an audio output of fixed width.
    pub fn audio_output(&mut self, name: &str, width: usize) -> ConfigResult<AudioOutputHandle> {
        self.check_unique(name)?;
        let binding = AudioPortBinding::new(width);
        self.audio_ports.push(AudioPortDecl {
            name: name.to_string(),
            direction: PortDirection::Output,
            binding: binding.clone(),
        });
        Ok(AudioOutputHandle { binding })
    }

    /// Register a parameter port endpoint (name and typing come from the
    /// endpoint itself).
    pub fn parameter_port(&mut self, endpoint: Rc<dyn AnyParameterEndpoint>) -> ConfigResult<()> {
        self.check_unique(endpoint.name())?;
        self.parameter_ports.push(ParameterPortDesc::new(endpoint));
        Ok(())
    }

    #[inline]
    pub fn audio_ports(&self) -> &[AudioPortDecl] {
        &self.audio_ports
    }

    #[inline]
    pub fn parameter_ports(&self) -> &[ParameterPortDesc] {
        &self.parameter_ports
    }

    pub fn find_audio_port(&self, name: &str) -> Option<(usize, &AudioPortDecl)> {
        self.audio_ports
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }

    pub fn find_parameter_port(&self, name: &str) -> Option<&ParameterPortDesc> {
        self.parameter_ports.iter().find(|p| p.name() == name)
    }
}

/// A leaf component: the smallest unit the scheduler runs.
///
/// `process()` reads its input rows and writes its output rows within one
/// block; it must not allocate unboundedly, block, or perform I/O.
pub trait AtomicComponent {
    fn info(&self) -> &ComponentInfo;

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()>;
}

/// Reference to a port in a composite's connection declarations: either a
/// child's port or (with the empty component path, [`crate::SELF`]) one of
/// the composite's own external ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    pub component: String,
    pub port: String,
}

impl PortRef {
    pub fn new(component: &str, port: &str) -> Self {
        Self {
            component: component.to_string(),
            port: port.to_string(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.component.is_empty()
    }
}

/// Audio connection between contiguous channel ranges. `None` ranges mean
/// the full port width.
#[derive(Debug, Clone)]
pub struct AudioConnection {
    pub from: PortRef,
    pub from_range: Option<Range<usize>>,
    pub to: PortRef,
    pub to_range: Option<Range<usize>>,
}

/// Parameter connection between two ports.
#[derive(Debug, Clone)]
pub struct ParameterConnection {
    pub from: PortRef,
    pub to: PortRef,
}

/// A child of a composite.
pub enum Child {
    Atom(Box<dyn AtomicComponent>),
    Composite(CompositeComponent),
}

impl Child {
    pub fn name(&self) -> &str {
        match self {
            Child::Atom(atom) => atom.info().name(),
            Child::Composite(composite) => composite.name(),
        }
    }
}

/// External port declaration of a composite (pass-through).
#[derive(Debug, Clone)]
pub struct ExternalAudioPort {
    pub name: String,
    pub direction: PortDirection,
    pub width: usize,
}

/// A component whose behaviour is the sub-graph of its children.
pub struct CompositeComponent {
    name: String,
    external_audio: Vec<ExternalAudioPort>,
    /// External parameter ports; typing is resolved from the connected
    /// atomic endpoints during flattening.
    external_parameters: Vec<(String, PortDirection)>,
    children: Vec<Child>,
    audio_connections: Vec<AudioConnection>,
    parameter_connections: Vec<ParameterConnection>,
}

impl CompositeComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_audio: Vec::new(),
            external_parameters: Vec::new(),
            children: Vec::new(),
            audio_connections: Vec::new(),
            parameter_connections: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_external_unique(&self, name: &str) -> ConfigResult<()> {
        if self.external_audio.iter().any(|p| p.name == name)
            || self.external_parameters.iter().any(|(n, _)| n == name)
        {
            return Err(ConfigError::DuplicatePortName {
                component: self.name.clone(),
                port: name.to_string(),
            });
        }
        Ok(())
    }

    /// Declare an external audio input (pass-through into the sub-graph).
    pub fn audio_input(&mut self, name: &str, width: usize) -> ConfigResult<()> {
        self.check_external_unique(name)?;
        self.external_audio.push(ExternalAudioPort {
            name: name.to_string(),
            direction: PortDirection::Input,
            width,
        });
        Ok(())
    }

    /// Declare an external audio output.
    pub fn audio_output(&mut self, name: &str, width: usize) -> ConfigResult<()> {
        self.check_external_unique(name)?;
        self.external_audio.push(ExternalAudioPort {
            name: name.to_string(),
            direction: PortDirection::Output,
            width,
        });
        Ok(())
    }

    /// Declare an external parameter input.
    pub fn parameter_input(&mut self, name: &str) -> ConfigResult<()> {
        self.check_external_unique(name)?;
        self.external_parameters
            .push((name.to_string(), PortDirection::Input));
        Ok(())
    }

    /// Declare an external parameter output.
    pub fn parameter_output(&mut self, name: &str) -> ConfigResult<()> {
        self.check_external_unique(name)?;
        self.external_parameters
            .push((name.to_string(), PortDirection::Output));
        Ok(())
    }

    /// Add an atomic child; its component name must be unique here.
    pub fn add_component(&mut self, atom: Box<dyn AtomicComponent>) -> ConfigResult<()> {
        self.check_child_unique(atom.info().name())?;
        self.children.push(Child::Atom(atom));
        Ok(())
    }

    /// Add a composite child.
    pub fn add_composite(&mut self, composite: CompositeComponent) -> ConfigResult<()> {
        self.check_child_unique(composite.name())?;
        self.children.push(Child::Composite(composite));
        Ok(())
    }

    fn check_child_unique(&self, name: &str) -> ConfigResult<()> {
        if name.is_empty() {
            return Err(ConfigError::DuplicateComponentName {
                parent: self.name.clone(),
                name: "<empty>".to_string(),
            });
        }
        if self.children.iter().any(|c| c.name() == name) {
            return Err(ConfigError::DuplicateComponentName {
                parent: self.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Connect full port widths.
    pub fn audio_connection(&mut self, from: (&str, &str), to: (&str, &str)) {
        self.audio_connections.push(AudioConnection {
            from: PortRef::new(from.0, from.1),
            from_range: None,
            to: PortRef::new(to.0, to.1),
            to_range: None,
        });
    }

    /// Connect contiguous channel ranges; both ranges must have equal
    /// length.
    pub fn audio_connection_range(
        &mut self,
        from: (&str, &str),
        from_range: Range<usize>,
        to: (&str, &str),
        to_range: Range<usize>,
    ) {
        self.audio_connections.push(AudioConnection {
            from: PortRef::new(from.0, from.1),
            from_range: Some(from_range),
            to: PortRef::new(to.0, to.1),
            to_range: Some(to_range),
        });
    }

    /// Connect two parameter ports.
    pub fn parameter_connection(&mut self, from: (&str, &str), to: (&str, &str)) {
        self.parameter_connections.push(ParameterConnection {
            from: PortRef::new(from.0, from.1),
            to: PortRef::new(to.0, to.1),
        });
    }

    // Flattening accessors.

    pub(crate) fn external_audio_ports(&self) -> &[ExternalAudioPort] {
        &self.external_audio
    }

    pub(crate) fn external_parameter_ports(&self) -> &[(String, PortDirection)] {
        &self.external_parameters
    }

    pub(crate) fn children(&self) -> &[Child] {
        &self.children
    }

    pub(crate) fn take_children(&mut self) -> Vec<Child> {
        std::mem::take(&mut self.children)
    }

    pub(crate) fn audio_connection_decls(&self) -> &[AudioConnection] {
        &self.audio_connections
    }

    pub(crate) fn parameter_connection_decls(&self) -> &[ParameterConnection] {
        &self.parameter_connections
    }
}
