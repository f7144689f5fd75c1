//! Silence source for unmapped output channels.

use sf_core::{ConfigResult, ProcessResult, SignalFlowContext};
use sf_graph::{AtomicComponent, AudioOutputHandle, ComponentInfo, ProcessIo};

pub struct NullSource {
    info: ComponentInfo,
    output: AudioOutputHandle,
}

impl NullSource {
    pub fn new(_context: &SignalFlowContext, name: &str, width: usize) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let output = info.audio_output("out", width)?;
        Ok(Self { info, output })
    }
}

impl AtomicComponent for NullSource {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, io: &ProcessIo<'_>) -> ProcessResult<()> {
        for channel in 0..self.output.width() {
            io.output(&self.output, channel).fill(0.0);
        }
        Ok(())
    }
}
