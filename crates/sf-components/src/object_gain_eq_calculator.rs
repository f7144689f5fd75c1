//! Per-object input gain and EQ derivation.

use sf_core::{ConfigResult, ProcessResult, Severity, SignalFlowContext, StatusSink};
use sf_dsp::BiquadCoeffList;
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_param::{
    BiquadMatrixParameter, DoubleBufferedInput, DoubleBufferedOutput, ObjectVectorParameter,
    VectorParameter,
};

/// Walks the scene and emits, per object channel, the input trim gain and
/// the parametric-EQ biquad sections declared on the object's metadata.
pub struct ObjectGainEqCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    gain_output: DoubleBufferedOutput<VectorParameter>,
    eq_output: DoubleBufferedOutput<BiquadMatrixParameter>,
    num_objects: usize,
    eq_sections: usize,
    sampling_frequency: sf_core::Sample,
    status: StatusSink,
}

impl ObjectGainEqCalculator {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
        eq_sections: usize,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectIn", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let gain_output = DoubleBufferedOutput::new(
            "gainOut",
            VectorParameter::filled(1.0, num_objects, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        let eq_output = DoubleBufferedOutput::new(
            "eqOut",
            BiquadMatrixParameter::identity(num_objects, eq_sections),
        );
        info.parameter_port(eq_output.cell())?;
        Ok(Self {
            info,
            object_input,
            gain_output,
            eq_output,
            num_objects,
            eq_sections,
            sampling_frequency: context.sampling_frequency_hz(),
            status,
        })
    }
}

impl AtomicComponent for ObjectGainEqCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        // The scene input fans out to several calculators sharing one core;
        // the changed flag is not per-consumer, so recompute every block.
        let object_input = &self.object_input;
        let num_objects = self.num_objects;
        let eq_sections = self.eq_sections;
        let fs = self.sampling_frequency;
        let status = &self.status;
        let name = self.info.name();

        self.gain_output.with_back_mut(|gains| {
            gains.as_mut_slice().fill(1.0);
            object_input.with(|objects| {
                for object in objects.iter() {
                    if object.channel_index < num_objects {
                        gains.as_mut_slice()[object.channel_index] = object.gain;
                    }
                }
            });
        });
        self.eq_output.with_back_mut(|matrix| {
            object_input.with(|objects| {
                for channel in 0..num_objects {
                    matrix.0.set_channel(channel, &BiquadCoeffList::identity(eq_sections));
                }
                for object in objects.iter() {
                    if object.channel_index >= num_objects {
                        continue;
                    }
                    let mut sections = Vec::with_capacity(eq_sections);
                    for spec in object.eq.iter().take(eq_sections) {
                        match spec.to_biquad(fs) {
                            Ok(coeff) => sections.push(coeff),
                            Err(error) => {
                                status.report(
                                    Severity::Warning,
                                    name,
                                    format!("object {}: EQ stage dropped: {error}", object.id),
                                );
                                status.count_invalid_object();
                            }
                        }
                    }
                    if object.eq.len() > eq_sections {
                        status.report(
                            Severity::Warning,
                            name,
                            format!(
                                "object {}: {} EQ stages exceed capacity {eq_sections}",
                                object.id,
                                object.eq.len()
                            ),
                        );
                        status.count_clamped_value();
                    }
                    matrix
                        .0
                        .set_channel(object.channel_index, &BiquadCoeffList::from_sections(sections));
                }
            });
        });
        self.gain_output.swap_buffers();
        self.eq_output.swap_buffers();
        Ok(())
    }
}
