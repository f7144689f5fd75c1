//! Process-wide execution constants shared by every component of a graph.

use crate::{ConfigError, ConfigResult, Sample};

/// Immutable per-graph execution parameters.
///
/// Created once by the host and handed to every component at construction
/// time. The block size is the number of samples consumed and produced by one
/// `process()` call; the alignment is the element granularity guaranteed for
/// every per-channel audio pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFlowContext {
    block_size: usize,
    sampling_frequency: u32,
    alignment: usize,
}

impl SignalFlowContext {
    /// Create a context with the default alignment granularity.
    pub fn new(block_size: usize, sampling_frequency: u32) -> ConfigResult<Self> {
        Self::with_alignment(block_size, sampling_frequency, crate::DEFAULT_ALIGNMENT)
    }

    /// Create a context with an explicit alignment granularity (in elements).
    pub fn with_alignment(
        block_size: usize,
        sampling_frequency: u32,
        alignment: usize,
    ) -> ConfigResult<Self> {
        if block_size == 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "block_size",
                detail: "must be at least 1".to_string(),
            });
        }
        if sampling_frequency == 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "sampling_frequency",
                detail: "must be nonzero".to_string(),
            });
        }
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(ConfigError::OutOfRange {
                parameter: "alignment",
                detail: format!("{alignment} is not a power of two"),
            });
        }
        Ok(Self {
            block_size,
            sampling_frequency,
            alignment,
        })
    }

    /// Samples per channel processed in one block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Sampling frequency in Hz.
    #[inline]
    pub fn sampling_frequency(&self) -> u32 {
        self.sampling_frequency
    }

    /// Sampling frequency as the sample scalar type.
    #[inline]
    pub fn sampling_frequency_hz(&self) -> Sample {
        self.sampling_frequency as Sample
    }

    /// Alignment granularity in elements.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Duration of one block in seconds.
    #[inline]
    pub fn block_duration(&self) -> Sample {
        self.block_size as Sample / self.sampling_frequency as Sample
    }

    /// Check that an interpolation period is a whole number of blocks.
    pub fn check_interpolation_period(&self, period: usize) -> ConfigResult<()> {
        if period == 0 || period % self.block_size != 0 {
            return Err(ConfigError::InvalidInterpolationPeriod {
                period,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_block_size() {
        assert!(SignalFlowContext::new(0, 48000).is_err());
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        assert!(SignalFlowContext::with_alignment(64, 48000, 3).is_err());
    }

    #[test]
    fn interpolation_period_must_divide() {
        let ctx = SignalFlowContext::new(64, 48000).unwrap();
        assert!(ctx.check_interpolation_period(128).is_ok());
        assert!(ctx.check_interpolation_period(96).is_err());
        assert!(ctx.check_interpolation_period(0).is_err());
    }
}
