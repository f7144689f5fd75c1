//! Per-channel gain with click-free transitions.

use sf_core::{ConfigResult, ProcessResult, Sample, SignalFlowContext};
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};
use sf_param::{DoubleBufferedInput, VectorParameter};

/// Applies one gain per channel, linearly interpolated from its previous
/// value across the interpolation period. New targets arrive over an
/// optional double-buffered parameter input.
pub struct GainVector {
    info: ComponentInfo,
    input: AudioInputHandle,
    output: AudioOutputHandle,
    gain_input: Option<DoubleBufferedInput<VectorParameter>>,
    current_gains: Vec<Sample>,
    target_gains: Vec<Sample>,
    interpolation_periods: usize,
    interpolation_counter: usize,
}

impl GainVector {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        width: usize,
        interpolation_steps: usize,
        control_input: bool,
        initial_gain: Sample,
    ) -> ConfigResult<Self> {
        context.check_interpolation_period(interpolation_steps)?;
        let mut info = ComponentInfo::new(name);
        let input = info.audio_input("in", width)?;
        let output = info.audio_output("out", width)?;
        let gain_input = if control_input {
            let port = DoubleBufferedInput::new(
                "gainInput",
                VectorParameter::filled(initial_gain, width, context.alignment()),
            );
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        Ok(Self {
            info,
            input,
            output,
            gain_input,
            current_gains: vec![initial_gain; width],
            target_gains: vec![initial_gain; width],
            interpolation_periods: interpolation_steps / context.block_size(),
            interpolation_counter: interpolation_steps / context.block_size(),
        })
    }

    /// Install new target gains directly (used without a control input).
    pub fn set_gains(&mut self, gains: &[Sample]) {
        self.begin_transition();
        self.target_gains.copy_from_slice(gains);
    }

    fn begin_transition(&mut self) {
        if self.interpolation_counter < self.interpolation_periods {
            // Freeze the currently reached value as the new start.
            let ratio =
                self.interpolation_counter as Sample / self.interpolation_periods as Sample;
            for (current, target) in self.current_gains.iter_mut().zip(&self.target_gains) {
                *current += ratio * (target - *current);
            }
        } else {
            self.current_gains.copy_from_slice(&self.target_gains);
        }
        self.interpolation_counter = 0;
    }
}

impl AtomicComponent for GainVector {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        let new_gains: Option<Vec<Sample>> = match &self.gain_input {
            Some(port) if port.changed() => {
                let gains = port.with(|v| v.as_slice().to_vec());
                port.reset_changed();
                Some(gains)
            }
            _ => None,
        };
        if let Some(gains) = new_gains {
            self.begin_transition();
            self.target_gains.copy_from_slice(&gains);
        }
        let block = io.block_size();
        let periods = self.interpolation_periods.max(1) as Sample;
        let start_ratio = (self.interpolation_counter as Sample / periods).min(1.0);
        let end_ratio = ((self.interpolation_counter + 1) as Sample / periods).min(1.0);

        for channel in 0..self.input.width() {
            let input = io.input(&self.input, channel);
            let output = io.output(&self.output, channel);
            let start =
                self.current_gains[channel]
                    + start_ratio * (self.target_gains[channel] - self.current_gains[channel]);
            let end = self.current_gains[channel]
                + end_ratio * (self.target_gains[channel] - self.current_gains[channel]);
            if (start - end).abs() == 0.0 {
                for (o, x) in output.iter_mut().zip(input) {
                    *o = start * x;
                }
            } else {
                let step = (end - start) / block as Sample;
                for (idx, (o, x)) in output.iter_mut().zip(input).enumerate() {
                    *o = (start + step * idx as Sample) * x;
                }
            }
        }
        if self.interpolation_counter < self.interpolation_periods {
            self.interpolation_counter += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::StatusSink;
    use sf_graph::{CompositeComponent, SELF, SignalFlow};
    use sf_param::{DoubleBufferedCore, DoubleBufferedOutput};

    fn flow_with_gain(interpolation_steps: usize) -> SignalFlow {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 1).unwrap();
        top.audio_output("out", 1).unwrap();
        top.parameter_input("gain").unwrap();
        let gain = GainVector::new(&context, "Gain", 1, interpolation_steps, true, 1.0).unwrap();
        top.add_component(Box::new(gain)).unwrap();
        top.audio_connection((SELF, "in"), ("Gain", "in"));
        top.audio_connection(("Gain", "out"), (SELF, "out"));
        top.parameter_connection((SELF, "gain"), ("Gain", "gainInput"));
        SignalFlow::new(top, context, StatusSink::new()).unwrap()
    }

    #[test]
    fn unity_gain_is_identity() {
        let mut flow = flow_with_gain(8);
        let input: Vec<Sample> = (0..8).map(|i| (i as Sample * 0.4).sin()).collect();
        flow.input_mut(0).copy_from_slice(&input);
        flow.process();
        assert_eq!(flow.output(0), input.as_slice());
    }

    #[test]
    fn gain_change_ramps_within_block() {
        let mut flow = flow_with_gain(8);
        let cell = flow
            .external_parameter_cell::<DoubleBufferedCore<VectorParameter>>("gain")
            .unwrap();
        let sender = DoubleBufferedOutput::from_cell(cell);
        sender.with_back_mut(|v| v.as_mut_slice()[0] = 0.0);
        sender.swap_buffers();

        flow.input_mut(0).fill(1.0);
        flow.process();
        let out: Vec<Sample> = flow.output(0).to_vec();
        // Monotone decay from 1 towards 0 within the block.
        for pair in out.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-7);
        }
        assert!(out[0] <= 1.0 && *out.last().unwrap() >= 0.0);

        flow.input_mut(0).fill(1.0);
        flow.process();
        assert!(flow.output(0).iter().all(|&s| s.abs() < 1e-6));
    }
}
