//! Runtime-switchable channel routing.

use sf_core::{ConfigResult, ProcessResult, Severity, SignalFlowContext, StatusSink};
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};
use sf_param::{DoubleBufferedInput, SignalRoutingParameter};

/// Copies input channels to output channels according to a routing table.
///
/// Each output is fed by at most one input; unrouted outputs are silent.
/// Routing updates arrive block-granular over an optional double-buffered
/// input.
pub struct SignalRouting {
    info: ComponentInfo,
    input: AudioInputHandle,
    output: AudioOutputHandle,
    control_input: Option<DoubleBufferedInput<SignalRoutingParameter>>,
    routing: SignalRoutingParameter,
    status: StatusSink,
}

impl SignalRouting {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        _context: &SignalFlowContext,
        name: &str,
        num_inputs: usize,
        num_outputs: usize,
        initial: SignalRoutingParameter,
        control_input: bool,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let input = info.audio_input("in", num_inputs)?;
        let output = info.audio_output("out", num_outputs)?;
        let control_input = if control_input {
            let port = DoubleBufferedInput::new("controlInput", initial.clone());
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        Ok(Self {
            info,
            input,
            output,
            control_input,
            routing: initial,
            status,
        })
    }

    /// Replace the routing directly (without a control input).
    pub fn set_routing(&mut self, routing: SignalRoutingParameter) {
        self.routing = routing;
    }
}

impl AtomicComponent for SignalRouting {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        if let Some(port) = &self.control_input {
            if port.changed() {
                self.routing = port.with(|r| r.clone());
                port.reset_changed();
            }
        }
        let num_inputs = self.input.width();
        for channel in 0..self.output.width() {
            let output = io.output(&self.output, channel);
            match self.routing.input_for_output(channel) {
                Some(source) if source < num_inputs => {
                    output.copy_from_slice(io.input(&self.input, source));
                }
                Some(source) => {
                    self.status.report(
                        Severity::Warning,
                        self.info.name(),
                        format!("routing references input {source} outside width {num_inputs}"),
                    );
                    self.status.count_invalid_object();
                    output.fill(0.0);
                }
                None => output.fill(0.0),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::{Sample, StatusSink};
    use sf_graph::{CompositeComponent, SELF, SignalFlow};

    #[test]
    fn routes_and_silences() {
        let context = sf_core::SignalFlowContext::new(4, 48000).unwrap();
        let mut initial = SignalRoutingParameter::new();
        initial.add_routing(1, 0); // input 1 -> output 0; output 1 silent
        let atom = SignalRouting::new(
            &context,
            "Route",
            2,
            2,
            initial,
            false,
            StatusSink::new(),
        )
        .unwrap();
        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 2).unwrap();
        top.audio_output("out", 2).unwrap();
        top.add_component(Box::new(atom)).unwrap();
        top.audio_connection((SELF, "in"), ("Route", "in"));
        top.audio_connection(("Route", "out"), (SELF, "out"));
        let mut flow = SignalFlow::new(top, context, StatusSink::new()).unwrap();

        flow.input_mut(0).fill(0.25);
        flow.input_mut(1).fill(0.75);
        flow.process();
        assert!(flow.output(0).iter().all(|&s: &Sample| s == 0.75));
        assert!(flow.output(1).iter().all(|&s: &Sample| s == 0.0));
    }
}
