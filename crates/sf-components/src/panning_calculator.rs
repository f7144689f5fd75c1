//! Scene-to-loudspeaker panning gain calculation.

use sf_core::{ConfigResult, ProcessResult, Sample, Severity, SignalFlowContext, StatusSink};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::{CartesianPosition, ObjectPayload};
use sf_panning::{LoudspeakerArray, Vbap};
use sf_param::{
    DoubleBufferedInput, ListenerPositionParameter, MatrixParameter, ObjectVectorParameter,
    SharedOutput,
};

/// Computes the loudspeaker gain matrix for every panned object per block.
///
/// Point sources (including the diffuseness and reverb variants' direct
/// paths) are panned with VBAP against the listener-compensated array; plane
/// waves are panned at infinity. Other object types contribute zero rows
/// here. With frequency-dependent panning enabled a second matrix is emitted
/// for the low band.
pub struct PanningCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    listener_input: Option<DoubleBufferedInput<ListenerPositionParameter>>,
    gain_output: SharedOutput<MatrixParameter>,
    low_frequency_output: Option<SharedOutput<MatrixParameter>>,
    vbap: Vbap,
    num_objects: usize,
    num_speakers: usize,
    scratch_gains: Vec<Sample>,
    /// Listener position applied to the VBAP state; the shared input's
    /// changed flag is not per-consumer, so changes are detected locally.
    applied_listener: CartesianPosition,
    status: StatusSink,
}

impl PanningCalculator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
        array: &LoudspeakerArray,
        listener_tracking: bool,
        frequency_dependent: bool,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectVectorInput", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let listener_input = if listener_tracking {
            let port =
                DoubleBufferedInput::new("listenerPosition", ListenerPositionParameter::default());
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        let num_speakers = array.num_regular_speakers();
        let gain_output = SharedOutput::new(
            "gainOutput",
            MatrixParameter::zeros(num_speakers, num_objects, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        let low_frequency_output = if frequency_dependent {
            let port = SharedOutput::new(
                "lowFrequencyGainOutput",
                MatrixParameter::zeros(num_speakers, num_objects, context.alignment()),
            );
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        Ok(Self {
            info,
            object_input,
            listener_input,
            gain_output,
            low_frequency_output,
            vbap: Vbap::new(array)?,
            num_objects,
            num_speakers,
            scratch_gains: vec![0.0; num_speakers],
            applied_listener: CartesianPosition::default(),
            status,
        })
    }
}

impl AtomicComponent for PanningCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        if let Some(port) = &self.listener_input {
            let position = port.with(|listener| listener.position);
            if position != self.applied_listener {
                self.applied_listener = position;
                if let Err(error) = self.vbap.set_listener_position(position) {
                    self.status.report(
                        Severity::Warning,
                        self.info.name(),
                        format!("listener update rejected: {error}"),
                    );
                }
            }
        }

        let vbap = &self.vbap;
        let scratch = &mut self.scratch_gains;
        let num_objects = self.num_objects;
        let num_speakers = self.num_speakers;
        let status = &self.status;
        let name = self.info.name();
        let object_input = &self.object_input;
        self.gain_output.with_mut(|matrix| {
            for row in 0..num_speakers {
                matrix.row_mut(row).fill(0.0);
            }
            object_input.with(|objects| {
                for object in objects.iter() {
                    if object.channel_index >= num_objects {
                        status.report(
                            Severity::Warning,
                            name,
                            format!(
                                "object {} references channel {} outside {num_objects}",
                                object.id, object.channel_index
                            ),
                        );
                        status.count_invalid_object();
                        continue;
                    }
                    let (position, plane_wave, direct_scale): (CartesianPosition, bool, Sample) =
                        match &object.payload {
                            ObjectPayload::PointSource { position } => (*position, false, 1.0),
                            ObjectPayload::PointSourceWithDiffuseness {
                                position,
                                diffuseness,
                            } => (*position, false, 1.0 - diffuseness.clamp(0.0, 1.0)),
                            ObjectPayload::PointSourceWithReverb { position, .. } => {
                                (*position, false, 1.0)
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
                                1.0,
                            ),
                            _ => continue,
                        };
                    if !position.is_finite() {
                        status.count_invalid_object();
                        continue;
                    }
                    vbap.calculate_gains(position, plane_wave, scratch);
                    let scale = object.level * direct_scale;
                    for (row, &gain) in scratch.iter().enumerate() {
                        *matrix.at_mut(row, object.channel_index) = scale * gain;
                    }
                }
            });
        });
        if let Some(low_output) = &self.low_frequency_output {
            // Until a dedicated low-frequency law is configured, the low
            // band uses the same gain set.
            let gain_output = &self.gain_output;
            low_output.with_mut(|low| {
                gain_output.with_mut(|high| low.0.copy_from(&high.0));
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::StatusSink;
    use sf_objects::AudioObject;

    fn make_calculator() -> PanningCalculator {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        PanningCalculator::new(&context, "Pan", 2, &array, false, false, StatusSink::new())
            .unwrap()
    }

    fn fake_io_process(calc: &mut PanningCalculator) {
        // The calculator never touches audio rows; a dummy area suffices.
        let comm = sf_graph::CommunicationArea::new(1, 8, 1);
        let io = sf_graph::ProcessIo::new(&comm, sf_core::Time::ZERO);
        calc.process(&io).unwrap();
    }

    #[test]
    fn centre_source_pans_equally() {
        let mut calc = make_calculator();
        let sender = sf_param::DoubleBufferedOutput::<ObjectVectorParameter>::from_cell(
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
        fake_io_process(&mut calc);
        let expected = (0.5f32).sqrt();
        calc.gain_output.with_mut(|matrix| {
            assert!((matrix.at(0, 0) - expected).abs() < 1e-6);
            assert!((matrix.at(1, 0) - expected).abs() < 1e-6);
            assert_eq!(*matrix.at(0, 1), 0.0);
        });
    }

    #[test]
    fn diffuseness_scales_direct_path() {
        let mut calc = make_calculator();
        let sender = sf_param::DoubleBufferedOutput::<ObjectVectorParameter>::from_cell(
            calc.object_input.cell().make_external_producer(),
        );
        sender.with_back_mut(|scene| {
            scene.0.set(AudioObject::new(
                1,
                1,
                1.0,
                ObjectPayload::PointSourceWithDiffuseness {
                    position: CartesianPosition::new(1.0, 0.0, 0.0),
                    diffuseness: 0.5,
                },
            ));
        });
        sender.swap_buffers();
        fake_io_process(&mut calc);
        let expected = 0.5 * (0.5f32).sqrt();
        calc.gain_output.with_mut(|matrix| {
            assert!((matrix.at(0, 1) - expected).abs() < 1e-6);
        });
    }
}
