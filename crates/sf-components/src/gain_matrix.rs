//! Time-varying gain matrix atom.

use sf_core::{ConfigResult, ProcessResult, Sample, SignalFlowContext};
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};
use sf_num::AlignedMatrix;
use sf_param::{MatrixParameter, SharedInput};

use sf_dsp::GainMatrixCore;

/// Dense N x M matrix mix with per-sample gain interpolation.
///
/// New target matrices arrive over a shared-protocol input written by a
/// calculator earlier in the same block; a transition only restarts when the
/// published matrix actually differs from the current target.
pub struct GainMatrix {
    info: ComponentInfo,
    input: AudioInputHandle,
    output: AudioOutputHandle,
    gain_input: Option<SharedInput<MatrixParameter>>,
    core: GainMatrixCore<Sample>,
    last_target: AlignedMatrix<Sample>,
}

impl GainMatrix {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_inputs: usize,
        num_outputs: usize,
        interpolation_steps: usize,
        initial_gain: Sample,
        control_input: bool,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let input = info.audio_input("in", num_inputs)?;
        let output = info.audio_output("out", num_outputs)?;
        let gain_input = if control_input {
            let port = SharedInput::new(
                "gainInput",
                MatrixParameter::zeros(num_outputs, num_inputs, context.alignment()),
            );
            info.parameter_port(port.cell())?;
            Some(port)
        } else {
            None
        };
        let core = GainMatrixCore::new(
            num_inputs,
            num_outputs,
            context.block_size(),
            interpolation_steps,
            initial_gain,
            context.alignment(),
        )?;
        let mut last_target = AlignedMatrix::new(num_outputs, num_inputs, context.alignment());
        last_target.fill(initial_gain);
        Ok(Self {
            info,
            input,
            output,
            gain_input,
            core,
            last_target,
        })
    }

    /// Construct with a fixed initial matrix (e.g. the subwoofer mix).
    #[allow(clippy::too_many_arguments)]
    pub fn with_initial_matrix(
        context: &SignalFlowContext,
        name: &str,
        num_inputs: usize,
        num_outputs: usize,
        interpolation_steps: usize,
        initial: &AlignedMatrix<Sample>,
        control_input: bool,
    ) -> ConfigResult<Self> {
        let mut atom = Self::new(
            context,
            name,
            num_inputs,
            num_outputs,
            interpolation_steps,
            0.0,
            control_input,
        )?;
        atom.core = GainMatrixCore::with_initial_matrix(
            num_inputs,
            num_outputs,
            context.block_size(),
            interpolation_steps,
            initial,
            context.alignment(),
        )?;
        atom.last_target.copy_from(initial);
        Ok(atom)
    }

    /// Install a new target matrix directly (without a control input).
    pub fn set_gains(&mut self, gains: &AlignedMatrix<Sample>) -> ConfigResult<()> {
        self.core.set_new_gains(gains)?;
        self.last_target.copy_from(gains);
        Ok(())
    }

    fn matrix_changed(last: &AlignedMatrix<Sample>, new: &AlignedMatrix<Sample>) -> bool {
        for row in 0..last.rows() {
            if last.row(row) != new.row(row) {
                return true;
            }
        }
        false
    }
}

impl AtomicComponent for GainMatrix {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        if let Some(port) = &self.gain_input {
            let core = &mut self.core;
            let last_target = &mut self.last_target;
            port.with(|matrix| {
                if Self::matrix_changed(last_target, &matrix.0) {
                    last_target.copy_from(&matrix.0);
                    core.set_new_gains(&matrix.0).ok();
                }
            });
        }
        let inputs = io.inputs(&self.input);
        let mut outputs = io.outputs(&self.output);
        self.core.process(&inputs, &mut outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::StatusSink;
    use sf_graph::{CompositeComponent, SELF, SignalFlow};
    use sf_param::{SharedCore, SharedOutput};

    #[test]
    fn matrix_mix_applies_after_transition() {
        let context = SignalFlowContext::new(4, 48000).unwrap();
        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 2).unwrap();
        top.audio_output("out", 1).unwrap();
        top.parameter_input("gains").unwrap();
        let matrix = GainMatrix::new(&context, "Mix", 2, 1, 4, 0.0, true).unwrap();
        top.add_component(Box::new(matrix)).unwrap();
        top.audio_connection((SELF, "in"), ("Mix", "in"));
        top.audio_connection(("Mix", "out"), (SELF, "out"));
        top.parameter_connection((SELF, "gains"), ("Mix", "gainInput"));
        let mut flow = SignalFlow::new(top, context, StatusSink::new()).unwrap();

        let cell = flow
            .external_parameter_cell::<SharedCore<MatrixParameter>>("gains")
            .unwrap();
        let sender = SharedOutput::from_cell(cell);
        sender.with_mut(|m| {
            *m.at_mut(0, 0) = 0.25;
            *m.at_mut(0, 1) = 0.75;
        });

        flow.input_mut(0).fill(1.0);
        flow.input_mut(1).fill(1.0);
        flow.process();
        // Second block completes the one-period transition.
        flow.input_mut(0).fill(1.0);
        flow.input_mut(1).fill(1.0);
        flow.process();
        for &s in flow.output(0) {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }
}
