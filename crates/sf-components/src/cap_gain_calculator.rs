//! Compensated-amplitude-panning gain calculation.

use sf_core::{ConfigResult, ProcessResult, Sample, SignalFlowContext, StatusSink};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::{CartesianPosition, ObjectPayload};
use sf_panning::{Cap, LoudspeakerArray};
use sf_param::{
    DoubleBufferedInput, ListenerPositionParameter, MatrixParameter, ObjectVectorParameter,
    SharedOutput,
};

/// Alternative to the VBAP calculator for low-frequency or head-tracked
/// rendering: panning gains from the energy-minimising CAP law, driven by
/// the listener's position and aural axis.
pub struct CapGainCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    listener_input: DoubleBufferedInput<ListenerPositionParameter>,
    gain_output: SharedOutput<MatrixParameter>,
    cap: Cap,
    num_objects: usize,
    num_speakers: usize,
    applied_listener: ListenerPositionParameter,
    scratch_gains: Vec<Sample>,
    status: StatusSink,
}

impl CapGainCalculator {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
        array: &LoudspeakerArray,
        max_gain: Sample,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectVectorInput", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let listener_input =
            DoubleBufferedInput::new("listenerPosition", ListenerPositionParameter::default());
        info.parameter_port(listener_input.cell())?;
        let num_speakers = array.num_regular_speakers();
        let gain_output = SharedOutput::new(
            "gainOutput",
            MatrixParameter::zeros(num_speakers, num_objects, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        Ok(Self {
            info,
            object_input,
            listener_input,
            gain_output,
            cap: Cap::new(array, max_gain)?,
            num_objects,
            num_speakers,
            applied_listener: ListenerPositionParameter::default(),
            scratch_gains: vec![0.0; num_speakers],
            status,
        })
    }
}

impl AtomicComponent for CapGainCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        let listener = self.listener_input.with(|l| *l);
        if listener.position != self.applied_listener.position
            || listener.aural_axis != self.applied_listener.aural_axis
        {
            self.applied_listener = listener;
            self.cap.set_listener(listener.position, listener.aural_axis);
        }

        let cap = &mut self.cap;
        let scratch = &mut self.scratch_gains;
        let num_objects = self.num_objects;
        let num_speakers = self.num_speakers;
        let status = &self.status;
        let object_input = &self.object_input;
        self.gain_output.with_mut(|matrix| {
            for row in 0..num_speakers {
                matrix.row_mut(row).fill(0.0);
            }
            object_input.with(|objects| {
                for object in objects.iter() {
                    if object.channel_index >= num_objects {
                        status.count_invalid_object();
                        continue;
                    }
                    let (position, plane_wave): (CartesianPosition, bool) = match &object.payload
                    {
                        ObjectPayload::PointSource { position } => (*position, false),
                        ObjectPayload::PointSourceWithDiffuseness { position, .. } => {
                            (*position, false)
                        }
                        ObjectPayload::PlaneWave {
                            azimuth_deg,
                            elevation_deg,
                            ..
                        } => (
                            CartesianPosition::from_spherical_deg(
                                *azimuth_deg,
                                *elevation_deg,
                                1.0,
                            ),
                            true,
                        ),
                        _ => continue,
                    };
                    if !position.is_finite() {
                        status.count_invalid_object();
                        continue;
                    }
                    cap.calculate_gains(position, plane_wave, scratch);
                    for (row, &gain) in scratch.iter().enumerate() {
                        *matrix.at_mut(row, object.channel_index) = object.level * gain;
                    }
                }
            });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::Time;
    use sf_graph::CommunicationArea;
    use sf_objects::AudioObject;
    use sf_param::DoubleBufferedOutput;

    #[test]
    fn centre_source_is_symmetric() {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let mut calc =
            CapGainCalculator::new(&context, "Cap", 1, &array, 2.0, StatusSink::new()).unwrap();
        let sender = DoubleBufferedOutput::<ObjectVectorParameter>::from_cell(
            calc.object_input.cell().make_external_producer(),
        );
        sender.with_back_mut(|scene| {
            scene.0.set(AudioObject::new(
                1,
                0,
                1.0,
                ObjectPayload::PointSource {
                    position: CartesianPosition::new(1.0, 0.0, 0.0),
                },
            ));
        });
        sender.swap_buffers();
        let comm = CommunicationArea::new(1, 8, 1);
        let io = ProcessIo::new(&comm, Time::ZERO);
        calc.process(&io).unwrap();
        calc.gain_output.with_mut(|matrix| {
            let left = *matrix.at(0, 0);
            let right = *matrix.at(1, 0);
            assert!((left - right).abs() < 1e-5);
            assert!((left + right - 1.0).abs() < 1e-5);
        });
    }
}
