//! Routing derivation for channel-bed objects.

use sf_core::{ConfigResult, ProcessResult, Severity, SignalFlowContext, StatusSink};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::ObjectPayload;
use sf_panning::LoudspeakerArray;
use sf_param::{
    DoubleBufferedInput, DoubleBufferedOutput, ObjectVectorParameter, SignalRoutingParameter,
};

/// Maps `ChannelObject`s directly onto loudspeaker outputs.
///
/// Each object channel is routed to its declared output loudspeaker;
/// invalid outputs and conflicting claims are dropped with a diagnostic.
pub struct ChannelObjectRoutingCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    routing_output: DoubleBufferedOutput<SignalRoutingParameter>,
    num_objects: usize,
    num_speakers: usize,
    status: StatusSink,
}

impl ChannelObjectRoutingCalculator {
    pub fn new(
        _context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
        array: &LoudspeakerArray,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectIn", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let routing_output =
            DoubleBufferedOutput::new("routingOut", SignalRoutingParameter::new());
        info.parameter_port(routing_output.cell())?;
        Ok(Self {
            info,
            object_input,
            routing_output,
            num_objects,
            num_speakers: array.num_regular_speakers(),
            status,
        })
    }
}

impl AtomicComponent for ChannelObjectRoutingCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        // The scene input is shared between calculators; recompute every
        // block instead of relying on the (not per-consumer) changed flag.
        let object_input = &self.object_input;
        let num_objects = self.num_objects;
        let num_speakers = self.num_speakers;
        let status = &self.status;
        let name = self.info.name();
        self.routing_output.with_back_mut(|routing| {
            routing.clear();
            object_input.with(|objects| {
                for object in objects.iter() {
                    let ObjectPayload::ChannelObject {
                        output_channels, ..
                    } = &object.payload
                    else {
                        continue;
                    };
                    for (offset, &output) in output_channels.iter().enumerate() {
                        let input = object.channel_index + offset;
                        if input >= num_objects || output >= num_speakers {
                            status.report(
                                Severity::Warning,
                                name,
                                format!(
                                    "object {}: routing {input} -> {output} out of range",
                                    object.id
                                ),
                            );
                            status.count_invalid_object();
                            continue;
                        }
                        if routing.input_for_output(output).is_some() {
                            status.report(
                                Severity::Warning,
                                name,
                                format!(
                                    "object {}: output {output} already claimed; dropped",
                                    object.id
                                ),
                            );
                            status.count_invalid_object();
                            continue;
                        }
                        routing.add_routing(input, output);
                    }
                }
            });
        });
        self.routing_output.swap_buffers();
        Ok(())
    }
}
