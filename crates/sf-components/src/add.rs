//! Multi-input adder.
//!
//! Fan-in in the graph is explicit: channels mix only through this atom.

use sf_core::{ConfigResult, ProcessResult, SignalFlowContext};
use sf_graph::{AtomicComponent, AudioInputHandle, AudioOutputHandle, ComponentInfo, ProcessIo};

/// Sums N equally wide input ports (`in0`, `in1`, ...) into one output.
pub struct Add {
    info: ComponentInfo,
    inputs: Vec<AudioInputHandle>,
    output: AudioOutputHandle,
}

impl Add {
    pub fn new(
        _context: &SignalFlowContext,
        name: &str,
        width: usize,
        num_inputs: usize,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let mut inputs = Vec::with_capacity(num_inputs);
        for idx in 0..num_inputs {
            inputs.push(info.audio_input(&format!("in{idx}"), width)?);
        }
        let output = info.audio_output("out", width)?;
        Ok(Self {
            info,
            inputs,
            output,
        })
    }
}

impl AtomicComponent for Add {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        for channel in 0..self.output.width() {
            let output = io.output(&self.output, channel);
            output.fill(0.0);
            for input in &self.inputs {
                let data = io.input(input, channel);
                for (o, x) in output.iter_mut().zip(data) {
                    *o += x;
                }
            }
        }
        Ok(())
    }
}
