//! Diffuse-path gain calculation.

use sf_core::{ConfigResult, ProcessResult, Sample, SignalFlowContext};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::ObjectPayload;
use sf_param::{DoubleBufferedInput, MatrixParameter, ObjectVectorParameter, SharedOutput};

/// Emits the gain row feeding the mono diffuse bus: `sqrt(diffuseness)` per
/// partially diffuse object, unity for fully diffuse sources, zero for
/// everything else.
pub struct DiffusionGainCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    gain_output: SharedOutput<MatrixParameter>,
    num_objects: usize,
}

impl DiffusionGainCalculator {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectInput", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let gain_output = SharedOutput::new(
            "gainOutput",
            MatrixParameter::zeros(1, num_objects, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        Ok(Self {
            info,
            object_input,
            gain_output,
            num_objects,
        })
    }
}

impl AtomicComponent for DiffusionGainCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        let object_input = &self.object_input;
        let num_objects = self.num_objects;
        self.gain_output.with_mut(|matrix| {
            matrix.row_mut(0).fill(0.0);
            object_input.with(|objects| {
                for object in objects.iter() {
                    if object.channel_index >= num_objects {
                        continue;
                    }
                    let diffuse_gain: Sample = match &object.payload {
                        ObjectPayload::PointSourceWithDiffuseness { diffuseness, .. } => {
                            diffuseness.clamp(0.0, 1.0).sqrt()
                        }
                        ObjectPayload::ChannelObject { diffuseness, .. } => {
                            diffuseness.clamp(0.0, 1.0).sqrt()
                        }
                        ObjectPayload::DiffuseSource => 1.0,
                        _ => 0.0,
                    };
                    *matrix.at_mut(0, object.channel_index) = object.level * diffuse_gain;
                }
            });
        });
        Ok(())
    }
}
