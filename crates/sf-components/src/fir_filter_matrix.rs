//! FIR filter matrix atom over the partitioned convolver.

use sf_core::{ConfigResult, ProcessResult, Sample, Severity, SignalFlowContext, StatusSink};
use sf_dsp::convolver::ConvolverConfig;
use sf_dsp::{CrossfadingConvolver, FilterRouting, PartitionedConvolver};
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};
use sf_param::{DEFAULT_QUEUE_CAPACITY, IndexedVectorParameter, MessageQueueInput};

enum Engine {
    Plain(PartitionedConvolver<Sample>),
    Crossfading(CrossfadingConvolver<Sample>),
}

/// Routed multichannel FIR convolution with runtime filter replacement.
///
/// New impulse responses arrive as `(filterIndex, coefficients)` messages;
/// installation happens at block boundaries. The crossfading variant blends
/// from the outgoing response over the configured transition length.
pub struct FirFilterMatrix {
    info: ComponentInfo,
    input: AudioInputHandle,
    output: AudioOutputHandle,
    filter_input: Option<MessageQueueInput<IndexedVectorParameter>>,
    engine: Engine,
    status: StatusSink,
}

impl FirFilterMatrix {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_inputs: usize,
        num_outputs: usize,
        max_filter_length: usize,
        max_routings: usize,
        max_filters: usize,
        routings: &[FilterRouting<Sample>],
        transition_samples: Option<usize>,
        control_input: bool,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let input = info.audio_input("in", num_inputs)?;
        let output = info.audio_output("out", num_outputs)?;
        let filter_input = if control_input {
            let template = IndexedVectorParameter {
                index: 0,
                values: Vec::new(),
            };
            let port = MessageQueueInput::new("filterInput", DEFAULT_QUEUE_CAPACITY, &template);
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        let config = ConvolverConfig {
            num_inputs,
            num_outputs,
            block_size: context.block_size(),
            max_filter_length,
            max_routings,
            max_filters,
        };
        log::debug!(
            "filter matrix '{name}': {num_inputs}x{num_outputs}, up to {max_filters} filters of {max_filter_length} taps"
        );
        let engine = match transition_samples {
            None => {
                let mut convolver = PartitionedConvolver::new("default", config)?;
                convolver.set_routings(routings)?;
                Engine::Plain(convolver)
            }
            Some(transition) => {
                let mut convolver = CrossfadingConvolver::new("default", config, transition)?;
                convolver.set_routings(routings)?;
                Engine::Crossfading(convolver)
            }
        };
        Ok(Self {
            info,
            input,
            output,
            filter_input,
            engine,
            status,
        })
    }

    /// Install a filter directly (initialisation-time population).
    pub fn set_filter(&mut self, index: usize, coefficients: &[Sample]) -> ConfigResult<()> {
        match &mut self.engine {
            Engine::Plain(c) => c.set_filter(index, coefficients),
            Engine::Crossfading(c) => c.set_filter(index, coefficients),
        }
    }

    /// Add a routing point at a block boundary.
    pub fn add_routing(&mut self, routing: FilterRouting<Sample>) -> ConfigResult<()> {
        match &mut self.engine {
            Engine::Plain(c) => c.add_routing(routing),
            Engine::Crossfading(c) => c.add_routing(routing),
        }
    }

    /// Remove a routing point.
    pub fn remove_routing(&mut self, input: usize, output: usize) -> bool {
        match &mut self.engine {
            Engine::Plain(c) => c.remove_routing(input, output),
            Engine::Crossfading(c) => c.remove_routing(input, output),
        }
    }
}

impl AtomicComponent for FirFilterMatrix {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        if let Some(port) = &self.filter_input {
            while let Some(message) = port.dequeue() {
                let result = match &mut self.engine {
                    Engine::Plain(c) => c.set_filter(message.index, &message.values),
                    Engine::Crossfading(c) => c.set_filter(message.index, &message.values),
                };
                if let Err(error) = result {
                    self.status.report(
                        Severity::Warning,
                        self.info.name(),
                        format!("filter update dropped: {error}"),
                    );
                    self.status.count_invalid_object();
                }
            }
        }
        let inputs = io.inputs(&self.input);
        let mut outputs = io.outputs(&self.output);
        match &mut self.engine {
            Engine::Plain(c) => c.process(&inputs, &mut outputs),
            Engine::Crossfading(c) => c.process(&inputs, &mut outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::StatusSink;
    use sf_graph::{CompositeComponent, SELF, SignalFlow};
    use sf_param::{MessageQueueCore, MessageQueueOutput};

    #[test]
    fn identity_filter_delays_nothing() {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let mut atom = FirFilterMatrix::new(
            &context,
            "Fir",
            1,
            1,
            16,
            2,
            2,
            &[FilterRouting {
                input: 0,
                output: 0,
                filter: 0,
                gain: 1.0,
            }],
            None,
            false,
            StatusSink::new(),
        )
        .unwrap();
        atom.set_filter(0, &[1.0]).unwrap();

        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 1).unwrap();
        top.audio_output("out", 1).unwrap();
        top.add_component(Box::new(atom)).unwrap();
        top.audio_connection((SELF, "in"), ("Fir", "in"));
        top.audio_connection(("Fir", "out"), (SELF, "out"));
        let mut flow = SignalFlow::new(top, context, StatusSink::new()).unwrap();

        let input: Vec<Sample> = (0..8).map(|i| (i as Sample * 0.5).sin()).collect();
        flow.input_mut(0).copy_from_slice(&input);
        flow.process();
        for (x, y) in input.iter().zip(flow.output(0)) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn filter_update_message_is_applied_at_block_boundary() {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let atom = FirFilterMatrix::new(
            &context,
            "Fir",
            1,
            1,
            8,
            1,
            1,
            &[FilterRouting {
                input: 0,
                output: 0,
                filter: 0,
                gain: 1.0,
            }],
            None,
            true,
            StatusSink::new(),
        )
        .unwrap();

        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 1).unwrap();
        top.audio_output("out", 1).unwrap();
        top.parameter_input("filters").unwrap();
        top.add_component(Box::new(atom)).unwrap();
        top.audio_connection((SELF, "in"), ("Fir", "in"));
        top.audio_connection(("Fir", "out"), (SELF, "out"));
        top.parameter_connection((SELF, "filters"), ("Fir", "filterInput"));
        let mut flow = SignalFlow::new(top, context, StatusSink::new()).unwrap();

        // Without a filter the output is silent.
        flow.input_mut(0).fill(1.0);
        flow.process();
        assert!(flow.output(0).iter().all(|&s| s.abs() < 1e-9));

        let cell = flow
            .external_parameter_cell::<MessageQueueCore<IndexedVectorParameter>>("filters")
            .unwrap();
        let sender = MessageQueueOutput::from_cell(cell);
        sender.enqueue(IndexedVectorParameter {
            index: 0,
            values: vec![0.5],
        });
        flow.input_mut(0).fill(1.0);
        flow.process();
        for &s in flow.output(0) {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }
}
