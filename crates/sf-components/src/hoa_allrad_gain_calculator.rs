//! AllRAD decode-row merging for HOA scene objects.

use sf_core::{ConfigResult, ProcessResult, Severity, SignalFlowContext, StatusSink};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_num::AlignedMatrix;
use sf_objects::{CartesianPosition, ObjectPayload};
use sf_panning::{AllRad, LoudspeakerArray, Vbap};
use sf_param::{
    DoubleBufferedInput, ListenerPositionParameter, MatrixParameter, ObjectVectorParameter,
    SharedInput, SharedOutput,
};

/// Passes the panning gain matrix through and replaces the columns of HOA
/// harmonic channels with AllRAD decode gains.
pub struct HoaAllRadGainCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    listener_input: Option<DoubleBufferedInput<ListenerPositionParameter>>,
    gain_input: SharedInput<MatrixParameter>,
    gain_output: SharedOutput<MatrixParameter>,
    vbap: Vbap,
    allrad: AllRad,
    decode_dirty: bool,
    applied_listener: CartesianPosition,
    num_objects: usize,
    status: StatusSink,
}

impl HoaAllRadGainCalculator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_objects: usize,
        real_array: &LoudspeakerArray,
        virtual_positions: Vec<CartesianPosition>,
        decode_matrix: AlignedMatrix<sf_core::Sample>,
        listener_tracking: bool,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectInput", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;
        let listener_input = if listener_tracking {
            let port =
                DoubleBufferedInput::new("listenerPosition", ListenerPositionParameter::default());
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        let num_speakers = real_array.num_regular_speakers();
        let gain_input = SharedInput::new(
            "gainInput",
            MatrixParameter::zeros(num_speakers, num_objects, context.alignment()),
        );
        info.parameter_port(gain_input.cell())?;
        let gain_output = SharedOutput::new(
            "gainOutput",
            MatrixParameter::zeros(num_speakers, num_objects, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        let vbap = Vbap::new(real_array)?;
        let allrad = AllRad::new(virtual_positions, decode_matrix, num_speakers)?;
        Ok(Self {
            info,
            object_input,
            listener_input,
            gain_input,
            gain_output,
            vbap,
            allrad,
            decode_dirty: true,
            applied_listener: CartesianPosition::default(),
            num_objects,
            status,
        })
    }
}

impl AtomicComponent for HoaAllRadGainCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        if let Some(port) = &self.listener_input {
            let position = port.with(|listener| listener.position);
            if position != self.applied_listener {
                self.applied_listener = position;
                if self.vbap.set_listener_position(position).is_ok() {
                    self.decode_dirty = true;
                }
            }
        }
        if self.decode_dirty {
            self.allrad.calc_decode_gains(&self.vbap);
            self.decode_dirty = false;
        }

        let gain_input = &self.gain_input;
        let object_input = &self.object_input;
        let allrad = &self.allrad;
        let num_objects = self.num_objects;
        let status = &self.status;
        let name = self.info.name();
        self.gain_output.with_mut(|output| {
            gain_input.with(|input| output.0.copy_from(&input.0));
            object_input.with(|objects| {
                for object in objects.iter() {
                    let ObjectPayload::HoaSource {
                        order,
                        harmonic_channels,
                    } = &object.payload
                    else {
                        continue;
                    };
                    let harmonics = (order + 1) * (order + 1);
                    if *order > allrad.order() || harmonic_channels.len() < harmonics {
                        status.report(
                            Severity::Warning,
                            name,
                            format!(
                                "object {}: HOA order {order} not decodable; dropped",
                                object.id
                            ),
                        );
                        status.count_invalid_object();
                        continue;
                    }
                    let decode = allrad.decode_matrix();
                    for (harmonic, &channel) in
                        harmonic_channels.iter().enumerate().take(harmonics)
                    {
                        if channel >= num_objects {
                            status.count_invalid_object();
                            continue;
                        }
                        for speaker in 0..decode.cols() {
                            *output.at_mut(speaker, channel) =
                                object.level * decode.at(harmonic, speaker);
                        }
                    }
                }
            });
        });
        Ok(())
    }
}
