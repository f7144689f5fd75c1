//! Single-input decorrelation bank.

use sf_core::{ConfigError, ConfigResult, ProcessResult, Sample, SignalFlowContext, StatusSink};
use sf_dsp::FilterRouting;
use sf_dsp::convolver::ConvolverConfig;
use sf_dsp::PartitionedConvolver;
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};
use sf_num::AlignedMatrix;

/// Spreads one input over M outputs through fixed short decorrelation FIRs,
/// scaled so the summed output power approximates the input power (default
/// gain `1/sqrt(M)`).
pub struct SingleToMultichannelDiffusion {
    info: ComponentInfo,
    input: AudioInputHandle,
    output: AudioOutputHandle,
    convolver: PartitionedConvolver<Sample>,
}

impl SingleToMultichannelDiffusion {
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_outputs: usize,
        filters: &AlignedMatrix<Sample>,
        gain: Sample,
        _status: StatusSink,
    ) -> ConfigResult<Self> {
        if filters.rows() < num_outputs {
            return Err(ConfigError::OutOfRange {
                parameter: "diffusion_filters",
                detail: format!(
                    "{} filter rows for {num_outputs} outputs",
                    filters.rows()
                ),
            });
        }
        let mut info = ComponentInfo::new(name);
        let input = info.audio_input("in", 1)?;
        let output = info.audio_output("out", num_outputs)?;
        let config = ConvolverConfig {
            num_inputs: 1,
            num_outputs,
            block_size: context.block_size(),
            max_filter_length: filters.cols(),
            max_routings: num_outputs,
            max_filters: num_outputs,
        };
        let mut convolver = PartitionedConvolver::new("default", config)?;
        for out_idx in 0..num_outputs {
            convolver.set_filter(out_idx, filters.row(out_idx))?;
            convolver.add_routing(FilterRouting {
                input: 0,
                output: out_idx,
                filter: out_idx,
                gain,
            })?;
        }
        Ok(Self {
            info,
            input,
            output,
            convolver,
        })
    }

    /// The default energy-normalising gain for `num_outputs` channels.
    pub fn default_gain(num_outputs: usize) -> Sample {
        1.0 / (num_outputs as Sample).sqrt()
    }
}

impl AtomicComponent for SingleToMultichannelDiffusion {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        let inputs = io.inputs(&self.input);
        let mut outputs = io.outputs(&self.output);
        self.convolver.process(&inputs, &mut outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::StatusSink;
    use sf_graph::{CompositeComponent, SELF, SignalFlow};

    #[test]
    fn impulse_filters_spread_input_with_gain() {
        let context = SignalFlowContext::new(8, 48000).unwrap();
        // Unit impulse filters: each output is a scaled copy.
        let mut filters = AlignedMatrix::new(2, 4, 1);
        filters.row_mut(0)[0] = 1.0;
        filters.row_mut(1)[0] = 1.0;
        let gain = SingleToMultichannelDiffusion::default_gain(2);
        let atom = SingleToMultichannelDiffusion::new(
            &context,
            "Diffuse",
            2,
            &filters,
            gain,
            StatusSink::new(),
        )
        .unwrap();
        let mut top = CompositeComponent::new("top");
        top.audio_input("in", 1).unwrap();
        top.audio_output("out", 2).unwrap();
        top.add_component(Box::new(atom)).unwrap();
        top.audio_connection((SELF, "in"), ("Diffuse", "in"));
        top.audio_connection(("Diffuse", "out"), (SELF, "out"));
        let mut flow = SignalFlow::new(top, context, StatusSink::new()).unwrap();

        flow.input_mut(0).fill(1.0);
        flow.process();
        let expected = 1.0 / (2.0f32).sqrt();
        for ch in 0..2 {
            for &s in flow.output(ch) {
                assert!((s - expected).abs() < 1e-5);
            }
        }
    }
}
