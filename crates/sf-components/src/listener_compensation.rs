//! Listener-position delay/gain compensation.

use sf_core::{ConfigResult, ProcessResult, Sample, SignalFlowContext};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::CartesianPosition;
use sf_panning::LoudspeakerArray;
use sf_param::{
    DoubleBufferedInput, DoubleBufferedOutput, ListenerPositionParameter, VectorParameter,
};

/// Speed of sound used for the distance-to-delay conversion, in m/s.
const SPEED_OF_SOUND: Sample = 340.0;

/// Derives per-loudspeaker delay and gain trims that re-centre the sweet
/// spot on the tracked listener: farther loudspeakers get less delay and
/// more gain so all wavefronts arrive aligned.
pub struct ListenerCompensation {
    info: ComponentInfo,
    position_input: DoubleBufferedInput<ListenerPositionParameter>,
    delay_output: DoubleBufferedOutput<VectorParameter>,
    gain_output: DoubleBufferedOutput<VectorParameter>,
    speaker_positions: Vec<CartesianPosition>,
    /// Last applied pose; the shared input's changed flag is not
    /// per-consumer.
    applied_listener: Option<CartesianPosition>,
}

impl ListenerCompensation {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        array: &LoudspeakerArray,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let position_input =
            DoubleBufferedInput::new("positionInput", ListenerPositionParameter::default());
        info.parameter_port(position_input.cell())?;
        let num = array.num_regular_speakers();
        let delay_output = DoubleBufferedOutput::new(
            "delayOutput",
            VectorParameter::zeros(num, context.alignment()),
        );
        info.parameter_port(delay_output.cell())?;
        let gain_output = DoubleBufferedOutput::new(
            "gainOutput",
            VectorParameter::filled(1.0, num, context.alignment()),
        );
        info.parameter_port(gain_output.cell())?;
        let speaker_positions: Vec<CartesianPosition> =
            array.speakers().iter().map(|s| s.position).collect();
        Ok(Self {
            info,
            position_input,
            delay_output,
            gain_output,
            speaker_positions,
            applied_listener: None,
        })
    }
}

impl AtomicComponent for ListenerCompensation {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        let listener = self.position_input.with(|p| p.position);
        if !listener.is_finite() || Some(listener) == self.applied_listener {
            return Ok(());
        }
        self.applied_listener = Some(listener);

        // The farthest loudspeaker (from the listener) sets the zero-delay
        // reference.
        let distances: Vec<Sample> = self
            .speaker_positions
            .iter()
            .map(|p| {
                let dx = p.x - listener.x;
                let dy = p.y - listener.y;
                let dz = p.z - listener.z;
                (dx * dx + dy * dy + dz * dz).sqrt()
            })
            .collect();
        let reference = distances.iter().copied().fold(0.0, Sample::max);

        self.delay_output.with_back_mut(|delays| {
            for (delay, &distance) in delays.as_mut_slice().iter_mut().zip(&distances) {
                *delay = (reference - distance) / SPEED_OF_SOUND;
            }
        });
        self.gain_output.with_back_mut(|gains| {
            for (gain, &distance) in gains.as_mut_slice().iter_mut().zip(&distances) {
                // Distance-law level alignment: nearer loudspeakers are
                // attenuated towards the farthest one.
                if reference > 0.0 {
                    *gain = (distance / reference).clamp(0.0, 1.0);
                } else {
                    *gain = 1.0;
                }
            }
        });
        self.delay_output.swap_buffers();
        self.gain_output.swap_buffers();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::Time;
    use sf_graph::CommunicationArea;
    use sf_param::{DoubleBufferedInput as Input, DoubleBufferedOutput as Output};

    fn run(listener: CartesianPosition) -> (Vec<Sample>, Vec<Sample>) {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let mut comp = ListenerCompensation::new(&context, "Comp", &array).unwrap();
        let sender = Output::<ListenerPositionParameter>::from_cell(
            comp.position_input.cell().make_external_producer(),
        );
        sender.with_back_mut(|p| p.position = listener);
        sender.swap_buffers();
        let comm = CommunicationArea::new(1, 8, 1);
        let io = sf_graph::ProcessIo::new(&comm, Time::ZERO);
        comp.process(&io).unwrap();
        let delays = Input::<VectorParameter>::from_cell(comp.delay_output.cell());
        let gains = Input::<VectorParameter>::from_cell(comp.gain_output.cell());
        (
            delays.with(|v| v.as_slice().to_vec()),
            gains.with(|v| v.as_slice().to_vec()),
        )
    }

    #[test]
    fn centred_listener_gives_uniform_compensation() {
        let (delays, gains) = run(CartesianPosition::new(0.0, 0.0, 0.0));
        for &d in &delays {
            assert!(d.abs() < 1e-9);
        }
        for &g in &gains {
            assert!((g - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn off_centre_listener_delays_the_nearer_speaker() {
        // Towards the left speaker (positive y).
        let (delays, gains) = run(CartesianPosition::new(0.0, 0.3, 0.0));
        // Left (index 0) is nearer: it gets more delay and less gain.
        assert!(delays[0] > delays[1]);
        assert!(gains[0] < gains[1]);
        assert!((delays[1]).abs() < 1e-9);
    }
}
