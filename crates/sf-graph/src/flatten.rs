//! Graph flattening: composite inlining, validation, scheduling and buffer
//! assignment.
//!
//! Composite ports are pass-throughs; resolving every connection chain
//! through them leaves edges with atomic ports (or the top-level external
//! ports) at both ends. Audio edges then become row aliases in the
//! communication area, parameter edges unify their endpoint cores, and the
//! atoms are ordered topologically with deterministic (insertion-order)
//! tie-breaking.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use sf_core::{ConfigError, ConfigResult};
use sf_param::{AnyParameterEndpoint, ParameterPortDesc, PortDirection, ProtocolKind};

use crate::component::{AtomicComponent, Child, CompositeComponent};
use crate::ports::AudioPortDecl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeId {
    Atom(usize),
    Comp(usize),
}

/// One audio channel endpoint during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChanRef {
    node: NodeId,
    port: usize,
    channel: usize,
}

/// One parameter port endpoint during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ParamRef {
    node: NodeId,
    port: usize,
}

struct CompAudioPort {
    name: String,
    direction: PortDirection,
    width: usize,
    path: String,
}

struct CompParamPort {
    name: String,
    direction: PortDirection,
    path: String,
}

struct Ctx {
    atoms: Vec<Box<dyn AtomicComponent>>,
    atom_paths: Vec<String>,
    atom_audio_ports: Vec<Vec<AudioPortDecl>>,
    atom_param_ports: Vec<Vec<ParameterPortDesc>>,
    comp_audio_ports: HashMap<(usize, usize), CompAudioPort>,
    comp_param_ports: HashMap<(usize, usize), CompParamPort>,
    next_comp_id: usize,
    /// (producer, consumer) per audio channel.
    audio_edges: Vec<(ChanRef, ChanRef)>,
    /// (producer, consumer) per parameter port.
    param_edges: Vec<(ParamRef, ParamRef)>,
}

impl Ctx {
    fn audio_port_path(&self, endpoint: ChanRef) -> String {
        match endpoint.node {
            NodeId::Atom(a) => format!(
                "{}.{}",
                self.atom_paths[a], self.atom_audio_ports[a][endpoint.port].name
            ),
            NodeId::Comp(c) => {
                let port = &self.comp_audio_ports[&(c, endpoint.port)];
                format!("{}.{}", port.path, port.name)
            }
        }
    }

    fn param_port_path(&self, endpoint: ParamRef) -> String {
        match endpoint.node {
            NodeId::Atom(a) => format!(
                "{}.{}",
                self.atom_paths[a],
                self.atom_param_ports[a][endpoint.port].name()
            ),
            NodeId::Comp(c) => {
                let port = &self.comp_param_ports[&(c, endpoint.port)];
                format!("{}.{}", port.path, port.name)
            }
        }
    }
}

/// Everything the runtime needs after flattening.
pub(crate) struct Flattened {
    pub atoms: Vec<Box<dyn AtomicComponent>>,
    pub atom_paths: Vec<String>,
    pub schedule: Vec<usize>,
    pub num_rows: usize,
    /// Rows of the top-level external input channels, in declaration order.
    pub top_input_rows: Vec<usize>,
    /// Rows backing the top-level external output channels.
    pub top_output_rows: Vec<usize>,
    /// Output rows per atom, for zero-filling after an atom failure.
    pub atom_output_rows: Vec<Vec<usize>>,
    /// Host-facing endpoints of the top-level external parameter ports.
    pub external_parameters: Vec<(String, Rc<dyn AnyParameterEndpoint>)>,
}

pub(crate) fn flatten(mut top: CompositeComponent) -> ConfigResult<Flattened> {
    let mut ctx = Ctx {
        atoms: Vec::new(),
        atom_paths: Vec::new(),
        atom_audio_ports: Vec::new(),
        atom_param_ports: Vec::new(),
        comp_audio_ports: HashMap::new(),
        comp_param_ports: HashMap::new(),
        next_comp_id: 1,
        audio_edges: Vec::new(),
        param_edges: Vec::new(),
    };

    // Register the top-level composite as id 0.
    register_composite_ports(&mut ctx, 0, &top, top.name().to_string());
    let top_path = top.name().to_string();
    walk(&mut top, 0, &top_path, &mut ctx)?;

    let resolution = resolve_audio(&ctx, &top)?;
    let schedule = build_schedule(&ctx, &resolution)?;
    let external_parameters = resolve_parameters(&ctx)?;

    Ok(Flattened {
        schedule,
        num_rows: resolution.num_rows,
        top_input_rows: resolution.top_input_rows,
        top_output_rows: resolution.top_output_rows,
        atom_output_rows: resolution.atom_output_rows,
        external_parameters,
        atoms: ctx.atoms,
        atom_paths: ctx.atom_paths,
    })
}

fn register_composite_ports(ctx: &mut Ctx, id: usize, composite: &CompositeComponent, path: String) {
    for (idx, port) in composite.external_audio_ports().iter().enumerate() {
        ctx.comp_audio_ports.insert(
            (id, idx),
            CompAudioPort {
                name: port.name.clone(),
                direction: port.direction,
                width: port.width,
                path: path.clone(),
            },
        );
    }
    for (idx, (name, direction)) in composite.external_parameter_ports().iter().enumerate() {
        ctx.comp_param_ports.insert(
            (id, idx),
            CompParamPort {
                name: name.clone(),
                direction: *direction,
                path: path.clone(),
            },
        );
    }
}

/// DFS over the component tree: collect atoms, register composite ports and
/// expand this composite's connections into channel-wise edges.
fn walk(
    composite: &mut CompositeComponent,
    comp_id: usize,
    path: &str,
    ctx: &mut Ctx,
) -> ConfigResult<()> {
    let mut child_map: HashMap<String, NodeId> = HashMap::new();
    let mut child_composites: Vec<(usize, CompositeComponent)> = Vec::new();

    for child in composite.take_children() {
        match child {
            Child::Atom(atom) => {
                let atom_idx = ctx.atoms.len();
                let child_path = format!("{path}.{}", atom.info().name());
                child_map.insert(atom.info().name().to_string(), NodeId::Atom(atom_idx));
                ctx.atom_audio_ports
                    .push(atom.info().audio_ports().to_vec());
                ctx.atom_param_ports
                    .push(atom.info().parameter_ports().to_vec());
                ctx.atom_paths.push(child_path);
                ctx.atoms.push(atom);
            }
            Child::Composite(child) => {
                let child_id = ctx.next_comp_id;
                ctx.next_comp_id += 1;
                let child_path = format!("{path}.{}", child.name());
                child_map.insert(child.name().to_string(), NodeId::Comp(child_id));
                register_composite_ports(ctx, child_id, &child, child_path);
                child_composites.push((child_id, child));
            }
        }
    }

    expand_connections(composite, comp_id, path, ctx, &child_map)?;

    for (child_id, mut child) in child_composites {
        let child_path = format!("{path}.{}", child.name());
        walk(&mut child, child_id, &child_path, ctx)?;
    }
    Ok(())
}

/// Look up an audio port referenced from inside `comp_id`'s scope.
fn lookup_audio(
    ctx: &Ctx,
    comp_id: usize,
    child_map: &HashMap<String, NodeId>,
    reference: &crate::component::PortRef,
) -> ConfigResult<(NodeId, usize, usize, PortDirection, bool)> {
    if reference.is_external() {
        let (idx, port) = ctx
            .comp_audio_ports
            .iter()
            .filter(|((c, _), _)| *c == comp_id)
            .map(|((_, p), port)| (*p, port))
            .find(|(_, port)| port.name == reference.port)
            .ok_or_else(|| ConfigError::PortNotFound(reference.port.clone()))?;
        Ok((
            NodeId::Comp(comp_id),
            idx,
            port.width,
            port.direction,
            true,
        ))
    } else {
        let node = *child_map
            .get(&reference.component)
            .ok_or_else(|| ConfigError::ComponentNotFound(reference.component.clone()))?;
        match node {
            NodeId::Atom(a) => {
                let (idx, decl) = ctx.atom_audio_ports[a]
                    .iter()
                    .enumerate()
                    .find(|(_, p)| p.name == reference.port)
                    .ok_or_else(|| {
                        ConfigError::PortNotFound(format!(
                            "{}.{}",
                            reference.component, reference.port
                        ))
                    })?;
                Ok((node, idx, decl.width(), decl.direction, false))
            }
            NodeId::Comp(c) => {
                let (idx, port) = ctx
                    .comp_audio_ports
                    .iter()
                    .filter(|((cc, _), _)| *cc == c)
                    .map(|((_, p), port)| (*p, port))
                    .find(|(_, port)| port.name == reference.port)
                    .ok_or_else(|| {
                        ConfigError::PortNotFound(format!(
                            "{}.{}",
                            reference.component, reference.port
                        ))
                    })?;
                Ok((node, idx, port.width, port.direction, false))
            }
        }
    }
}

fn expand_connections(
    composite: &CompositeComponent,
    comp_id: usize,
    path: &str,
    ctx: &mut Ctx,
    child_map: &HashMap<String, NodeId>,
) -> ConfigResult<()> {
    let mut new_audio_edges = Vec::new();
    for connection in composite.audio_connection_decls() {
        let (from_node, from_port, from_width, from_dir, from_ext) =
            lookup_audio(ctx, comp_id, child_map, &connection.from)?;
        let (to_node, to_port, to_width, to_dir, to_ext) =
            lookup_audio(ctx, comp_id, child_map, &connection.to)?;

        // Inside this scope a signal source is a child output or the
        // composite's own external input.
        let from_is_source = (from_ext && from_dir == PortDirection::Input)
            || (!from_ext && from_dir == PortDirection::Output);
        let to_is_sink = (to_ext && to_dir == PortDirection::Output)
            || (!to_ext && to_dir == PortDirection::Input);
        if !from_is_source || !to_is_sink {
            return Err(ConfigError::InvalidConnection {
                connection: format!(
                    "{path}: {}.{} -> {}.{}",
                    connection.from.component,
                    connection.from.port,
                    connection.to.component,
                    connection.to.port
                ),
                detail: "audio connection direction mismatch".to_string(),
            });
        }

        let from_range = connection.from_range.clone().unwrap_or(0..from_width);
        let to_range = connection.to_range.clone().unwrap_or(0..to_width);
        if from_range.end > from_width {
            return Err(ConfigError::ChannelRangeOutOfBounds {
                port: format!("{}.{}", connection.from.component, connection.from.port),
                range: format!("{from_range:?}"),
                width: from_width,
            });
        }
        if to_range.end > to_width {
            return Err(ConfigError::ChannelRangeOutOfBounds {
                port: format!("{}.{}", connection.to.component, connection.to.port),
                range: format!("{to_range:?}"),
                width: to_width,
            });
        }
        if from_range.len() != to_range.len() {
            return Err(ConfigError::WidthMismatch {
                connection: format!(
                    "{path}: {}.{} -> {}.{}",
                    connection.from.component,
                    connection.from.port,
                    connection.to.component,
                    connection.to.port
                ),
                producer: from_range.len(),
                consumer: to_range.len(),
            });
        }

        for (from_ch, to_ch) in from_range.zip(to_range) {
            new_audio_edges.push((
                ChanRef {
                    node: from_node,
                    port: from_port,
                    channel: from_ch,
                },
                ChanRef {
                    node: to_node,
                    port: to_port,
                    channel: to_ch,
                },
            ));
        }
    }
    ctx.audio_edges.extend(new_audio_edges);

    for connection in composite.parameter_connection_decls() {
        let from = lookup_param(ctx, comp_id, child_map, &connection.from)?;
        let to = lookup_param(ctx, comp_id, child_map, &connection.to)?;
        ctx.param_edges.push((from, to));
    }
    Ok(())
}

fn lookup_param(
    ctx: &Ctx,
    comp_id: usize,
    child_map: &HashMap<String, NodeId>,
    reference: &crate::component::PortRef,
) -> ConfigResult<ParamRef> {
    if reference.is_external() {
        let idx = ctx
            .comp_param_ports
            .iter()
            .filter(|((c, _), _)| *c == comp_id)
            .find(|(_, port)| port.name == reference.port)
            .map(|((_, p), _)| *p)
            .ok_or_else(|| ConfigError::PortNotFound(reference.port.clone()))?;
        Ok(ParamRef {
            node: NodeId::Comp(comp_id),
            port: idx,
        })
    } else {
        let node = *child_map
            .get(&reference.component)
            .ok_or_else(|| ConfigError::ComponentNotFound(reference.component.clone()))?;
        match node {
            NodeId::Atom(a) => {
                let idx = ctx.atom_param_ports[a]
                    .iter()
                    .position(|p| p.name() == reference.port)
                    .ok_or_else(|| {
                        ConfigError::PortNotFound(format!(
                            "{}.{}",
                            reference.component, reference.port
                        ))
                    })?;
                Ok(ParamRef {
                    node,
                    port: idx,
                })
            }
            NodeId::Comp(c) => {
                let idx = ctx
                    .comp_param_ports
                    .iter()
                    .filter(|((cc, _), _)| *cc == c)
                    .find(|(_, port)| port.name == reference.port)
                    .map(|((_, p), _)| *p)
                    .ok_or_else(|| {
                        ConfigError::PortNotFound(format!(
                            "{}.{}",
                            reference.component, reference.port
                        ))
                    })?;
                Ok(ParamRef { node, port: idx })
            }
        }
    }
}

struct AudioResolution {
    num_rows: usize,
    top_input_rows: Vec<usize>,
    top_output_rows: Vec<usize>,
    atom_output_rows: Vec<Vec<usize>>,
    /// Audio dependency edges between atoms.
    atom_edges: Vec<(usize, usize)>,
}

fn resolve_audio(ctx: &Ctx, top: &CompositeComponent) -> ConfigResult<AudioResolution> {
    // One producer per consumer endpoint.
    let mut producer_of: HashMap<ChanRef, ChanRef> = HashMap::new();
    let mut fan_in: HashMap<ChanRef, usize> = HashMap::new();
    for (producer, consumer) in &ctx.audio_edges {
        let count = fan_in.entry(*consumer).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Err(ConfigError::ChannelFanIn {
                port: ctx.audio_port_path(*consumer),
                channel: consumer.channel,
                count: *count,
            });
        }
        producer_of.insert(*consumer, *producer);
    }

    let is_source = |endpoint: &ChanRef, ctx: &Ctx| -> bool {
        match endpoint.node {
            NodeId::Atom(a) => {
                ctx.atom_audio_ports[a][endpoint.port].direction == PortDirection::Output
            }
            NodeId::Comp(0) => {
                ctx.comp_audio_ports[&(0, endpoint.port)].direction == PortDirection::Input
            }
            NodeId::Comp(_) => false,
        }
    };

    let resolve = |mut endpoint: ChanRef| -> ConfigResult<ChanRef> {
        // Pass-through chains are bounded by the composite nesting depth;
        // the step bound guards against malformed self-referential wiring.
        for _ in 0..producer_of.len() + 2 {
            if is_source(&endpoint, ctx) {
                return Ok(endpoint);
            }
            match producer_of.get(&endpoint) {
                Some(&next) => endpoint = next,
                None => {
                    return Err(ConfigError::UnconnectedInput(
                        ctx.audio_port_path(endpoint),
                    ));
                }
            }
        }
        Err(ConfigError::InvalidConnection {
            connection: ctx.audio_port_path(endpoint),
            detail: "cyclic pass-through chain".to_string(),
        })
    };

    // Row allocation: top-level inputs first, then every atom output port.
    let mut num_rows = 0usize;
    let mut top_input_rows = Vec::new();
    let mut source_rows: HashMap<ChanRef, usize> = HashMap::new();
    for (idx, port) in top.external_audio_ports().iter().enumerate() {
        if port.direction != PortDirection::Input {
            continue;
        }
        for channel in 0..port.width {
            let row = num_rows;
            num_rows += 1;
            top_input_rows.push(row);
            source_rows.insert(
                ChanRef {
                    node: NodeId::Comp(0),
                    port: idx,
                    channel,
                },
                row,
            );
        }
    }
    let mut atom_output_rows: Vec<Vec<usize>> = vec![Vec::new(); ctx.atoms.len()];
    for (atom_idx, ports) in ctx.atom_audio_ports.iter().enumerate() {
        for (port_idx, decl) in ports.iter().enumerate() {
            if decl.direction != PortDirection::Output {
                continue;
            }
            let mut rows = Vec::with_capacity(decl.width());
            for channel in 0..decl.width() {
                let row = num_rows;
                num_rows += 1;
                rows.push(row);
                source_rows.insert(
                    ChanRef {
                        node: NodeId::Atom(atom_idx),
                        port: port_idx,
                        channel,
                    },
                    row,
                );
            }
            decl.binding.0.borrow_mut().rows = rows.clone();
            atom_output_rows[atom_idx].extend(rows);
        }
    }

    // Bind every atom input channel to its producer's row and collect the
    // atom-level dependency edges.
    let mut atom_edges = Vec::new();
    for (atom_idx, ports) in ctx.atom_audio_ports.iter().enumerate() {
        for (port_idx, decl) in ports.iter().enumerate() {
            if decl.direction != PortDirection::Input {
                continue;
            }
            let mut rows = Vec::with_capacity(decl.width());
            for channel in 0..decl.width() {
                let endpoint = ChanRef {
                    node: NodeId::Atom(atom_idx),
                    port: port_idx,
                    channel,
                };
                let source = resolve(endpoint)?;
                rows.push(source_rows[&source]);
                if let NodeId::Atom(producer) = source.node {
                    if producer != atom_idx {
                        atom_edges.push((producer, atom_idx));
                    }
                }
            }
            decl.binding.0.borrow_mut().rows = rows;
        }
    }

    // Top-level outputs alias their producers' rows.
    let mut top_output_rows = Vec::new();
    for (idx, port) in top.external_audio_ports().iter().enumerate() {
        if port.direction != PortDirection::Output {
            continue;
        }
        for channel in 0..port.width {
            let endpoint = ChanRef {
                node: NodeId::Comp(0),
                port: idx,
                channel,
            };
            let source = resolve(endpoint)?;
            top_output_rows.push(source_rows[&source]);
        }
    }

    Ok(AudioResolution {
        num_rows,
        top_input_rows,
        top_output_rows,
        atom_output_rows,
        atom_edges,
    })
}

/// Resolve parameter chains: unify endpoint cores and expose the top-level
/// external parameter ports. Returns the host-facing endpoints.
fn resolve_parameters(ctx: &Ctx) -> ConfigResult<Vec<(String, Rc<dyn AnyParameterEndpoint>)>> {
    let mut producer_of: HashMap<ParamRef, ParamRef> = HashMap::new();
    for (producer, consumer) in &ctx.param_edges {
        if producer_of.insert(*consumer, *producer).is_some() {
            return Err(ConfigError::ParameterMismatch {
                connection: ctx.param_port_path(*consumer),
                detail: "parameter port has more than one producer".to_string(),
            });
        }
    }

    let is_source = |endpoint: &ParamRef| -> bool {
        match endpoint.node {
            NodeId::Atom(a) => {
                ctx.atom_param_ports[a][endpoint.port].direction() == PortDirection::Output
            }
            NodeId::Comp(0) => {
                ctx.comp_param_ports[&(0, endpoint.port)].direction == PortDirection::Input
            }
            NodeId::Comp(_) => false,
        }
    };

    let resolve = |mut endpoint: ParamRef| -> ConfigResult<ParamRef> {
        for _ in 0..producer_of.len() + 2 {
            if is_source(&endpoint) {
                return Ok(endpoint);
            }
            match producer_of.get(&endpoint) {
                Some(&next) => endpoint = next,
                None => {
                    return Err(ConfigError::UnconnectedInput(
                        ctx.param_port_path(endpoint),
                    ));
                }
            }
        }
        Err(ConfigError::InvalidConnection {
            connection: ctx.param_port_path(endpoint),
            detail: "cyclic pass-through chain".to_string(),
        })
    };

    // Consumers grouped per resolved source.
    let mut external_consumers: HashMap<usize, Vec<ParamRef>> = HashMap::new();
    for (_, consumer) in &ctx.param_edges {
        let ParamRef {
            node: NodeId::Atom(atom_idx),
            port,
        } = *consumer
        else {
            continue;
        };
        let consumer_desc = &ctx.atom_param_ports[atom_idx][port];
        if consumer_desc.direction() != PortDirection::Input {
            return Err(ConfigError::ParameterMismatch {
                connection: ctx.param_port_path(*consumer),
                detail: "connection target is not an input port".to_string(),
            });
        }
        let source = resolve(*consumer)?;
        match source.node {
            NodeId::Atom(producer_idx) => {
                let producer_desc = &ctx.atom_param_ports[producer_idx][source.port];
                consumer_desc
                    .endpoint
                    .adopt(&*producer_desc.endpoint)
                    .map_err(|detail| ConfigError::ParameterMismatch {
                        connection: format!(
                            "{} -> {}",
                            ctx.param_port_path(source),
                            ctx.param_port_path(*consumer)
                        ),
                        detail,
                    })?;
            }
            NodeId::Comp(0) => {
                external_consumers
                    .entry(source.port)
                    .or_default()
                    .push(*consumer);
            }
            NodeId::Comp(_) => unreachable!("resolve() only stops at sources"),
        }
    }

    // Build one host-facing producer per top-level parameter input and unify
    // all of its consumers onto a single core.
    let mut externals = Vec::new();
    let mut port_indices: Vec<usize> = external_consumers.keys().copied().collect();
    port_indices.sort_unstable();
    for port_idx in port_indices {
        let consumers = &external_consumers[&port_idx];
        let first = consumers[0];
        let NodeId::Atom(first_atom) = first.node else {
            unreachable!()
        };
        let first_endpoint = ctx.atom_param_ports[first_atom][first.port].endpoint.clone();
        let host_endpoint = first_endpoint.external_producer();
        for consumer in &consumers[1..] {
            let NodeId::Atom(atom_idx) = consumer.node else {
                unreachable!()
            };
            ctx.atom_param_ports[atom_idx][consumer.port]
                .endpoint
                .adopt(&*host_endpoint)
                .map_err(|detail| ConfigError::ParameterMismatch {
                    connection: format!(
                        "{} -> {}",
                        ctx.comp_param_ports[&(0, port_idx)].name,
                        ctx.param_port_path(*consumer)
                    ),
                    detail,
                })?;
        }
        externals.push((
            ctx.comp_param_ports[&(0, port_idx)].name.clone(),
            host_endpoint,
        ));
    }
    Ok(externals)
}

/// Dependency classification of a parameter edge for scheduling.
fn edge_is_hard(protocol: ProtocolKind) -> bool {
    matches!(protocol, ProtocolKind::Shared)
}

fn build_schedule(ctx: &Ctx, resolution: &AudioResolution) -> ConfigResult<Vec<usize>> {
    let n = ctx.atoms.len();
    let mut hard: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut soft: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut audio_only: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for &(producer, consumer) in &resolution.atom_edges {
        audio_only[producer].insert(consumer);
        hard[producer].insert(consumer);
    }

    // Atom-to-atom parameter dependencies. Resolution through composite
    // pass-throughs reuses the producer map.
    let mut producer_of: HashMap<ParamRef, ParamRef> = HashMap::new();
    for (producer, consumer) in &ctx.param_edges {
        producer_of.insert(*consumer, *producer);
    }
    for (_, consumer) in &ctx.param_edges {
        let ParamRef {
            node: NodeId::Atom(consumer_idx),
            port,
        } = *consumer
        else {
            continue;
        };
        // Follow the chain to an atomic producer, if any.
        let mut endpoint = *consumer;
        let producer_idx = loop {
            match endpoint.node {
                NodeId::Atom(a)
                    if ctx.atom_param_ports[a][endpoint.port].direction()
                        == PortDirection::Output =>
                {
                    break Some(a);
                }
                NodeId::Comp(0)
                    if ctx.comp_param_ports[&(0, endpoint.port)].direction
                        == PortDirection::Input =>
                {
                    break None;
                }
                _ => match producer_of.get(&endpoint) {
                    Some(&next) => endpoint = next,
                    None => break None,
                },
            }
        };
        let Some(producer_idx) = producer_idx else {
            continue;
        };
        if producer_idx == consumer_idx {
            continue;
        }
        let protocol = ctx.atom_param_ports[consumer_idx][port].endpoint.protocol();
        if edge_is_hard(protocol) {
            hard[producer_idx].insert(consumer_idx);
        } else {
            soft[producer_idx].insert(consumer_idx);
        }
    }

    // Audio cycles are always an error.
    if let Some(node) = find_cycle(&audio_only, n) {
        return Err(ConfigError::AudioCycle(ctx.atom_paths[node].clone()));
    }
    // So are cycles whose parameter edges are all shared-protocol.
    if let Some(node) = find_cycle(&hard, n) {
        return Err(ConfigError::SharedParameterCycle(
            ctx.atom_paths[node].clone(),
        ));
    }

    // Kahn over hard + soft edges; ties break on insertion order. When only
    // soft cycles remain, their edges are relaxed (the protocols provide the
    // one-block delay).
    let mut in_hard = vec![0usize; n];
    let mut in_soft = vec![0usize; n];
    for producer in 0..n {
        for &consumer in &hard[producer] {
            in_hard[consumer] += 1;
        }
        for &consumer in &soft[producer] {
            in_soft[consumer] += 1;
        }
    }
    let mut scheduled = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        // Prefer nodes with no pending dependency at all; when only soft
        // cycles remain, relax soft edges for one node at a time (the
        // delaying protocols provide the one-block latency).
        let next = (0..n)
            .find(|&i| !scheduled[i] && in_hard[i] == 0 && in_soft[i] == 0)
            .or_else(|| (0..n).find(|&i| !scheduled[i] && in_hard[i] == 0));
        let Some(node) = next else {
            // A hard cycle would have been caught above; guard regardless.
            let stuck = (0..n).find(|&i| !scheduled[i]).unwrap_or(0);
            return Err(ConfigError::SharedParameterCycle(
                ctx.atom_paths[stuck].clone(),
            ));
        };
        scheduled[node] = true;
        order.push(node);
        for &consumer in &hard[node] {
            in_hard[consumer] = in_hard[consumer].saturating_sub(1);
        }
        for &consumer in &soft[node] {
            in_soft[consumer] = in_soft[consumer].saturating_sub(1);
        }
    }
    Ok(order)
}

/// Return a node contained in a cycle, if one exists.
fn find_cycle(adjacency: &[BTreeSet<usize>], n: usize) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    fn visit(
        node: usize,
        adjacency: &[BTreeSet<usize>],
        marks: &mut [Mark],
    ) -> Option<usize> {
        marks[node] = Mark::InProgress;
        for &next in &adjacency[node] {
            match marks[next] {
                Mark::InProgress => return Some(next),
                Mark::Unvisited => {
                    if let Some(found) = visit(next, adjacency, marks) {
                        return Some(found);
                    }
                }
                Mark::Done => {}
            }
        }
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; n];
    for node in 0..n {
        if marks[node] == Mark::Unvisited {
            if let Some(found) = visit(node, adjacency, &mut marks) {
                return Some(found);
            }
        }
    }
    None
}
