//! Uniformly partitioned frequency-domain FIR matrix.
//!
//! Overlap-save convolution with all partitions equal to the block size. Up
//! to F distinct filters are stored as per-partition spectra; a routing table
//! of at most R points `{input, output, filter, gain}` selects which filter
//! applies between which channels. Per block the cost is one forward FFT per
//! input, a complex multiply-accumulate per routing point and partition, and
//! one inverse FFT per output.

use rustfft::num_complex::Complex;

use sf_core::{ConfigError, ConfigResult, ProcessError, ProcessResult};
use sf_num::Scalar;

use crate::fft::FftWrapper;

/// One routing point of the filter matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterRouting<T> {
    pub input: usize,
    pub output: usize,
    pub filter: usize,
    pub gain: T,
}

/// Routing table; mutated at block boundaries only.
pub type FilterRoutingList<T> = Vec<FilterRouting<T>>;

/// Static geometry of a convolver instance.
#[derive(Debug, Clone, Copy)]
pub struct ConvolverConfig {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub block_size: usize,
    pub max_filter_length: usize,
    pub max_routings: usize,
    pub max_filters: usize,
}

pub struct PartitionedConvolver<T: realfft::FftNum + Scalar> {
    config: ConvolverConfig,
    fft: FftWrapper<T>,
    num_partitions: usize,
    bins: usize,
    /// Per-input sliding window of the last `2 * block` samples.
    input_history: Vec<T>,
    /// Frequency-domain delay line: `inputs x partitions x bins`, ring over
    /// the partition axis.
    fdl: Vec<Complex<T>>,
    fdl_head: usize,
    /// Filter spectra: `filters x partitions x bins`.
    filter_spectra: Vec<Complex<T>>,
    routings: FilterRoutingList<T>,
    /// Frequency accumulator and time scratch reused every block.
    freq_acc: Vec<Complex<T>>,
    time_scratch: Vec<T>,
}

impl<T: realfft::FftNum + Scalar> PartitionedConvolver<T> {
    pub fn new(fft_provider: &str, config: ConvolverConfig) -> ConfigResult<Self> {
        if config.num_inputs == 0 || config.num_outputs == 0 {
            return Err(ConfigError::OutOfRange {
                parameter: "convolver_channels",
                detail: "inputs and outputs must be nonzero".to_string(),
            });
        }
        if config.max_filter_length == 0 {
            return Err(ConfigError::InvalidFilterLength {
                length: 0,
                detail: "maximum filter length must be nonzero".to_string(),
            });
        }
        let block = config.block_size;
        let fft = FftWrapper::new(fft_provider, 2 * block)?;
        let bins = fft.num_bins();
        let num_partitions = config.max_filter_length.div_ceil(block);
        log::debug!(
            "partitioned convolver: {}x{} channels, {num_partitions} partitions of {block} samples",
            config.num_inputs,
            config.num_outputs
        );
        Ok(Self {
            config,
            fft,
            num_partitions,
            bins,
            input_history: vec![T::ZERO; config.num_inputs * 2 * block],
            fdl: vec![Complex::new(T::ZERO, T::ZERO); config.num_inputs * num_partitions * bins],
            fdl_head: 0,
            filter_spectra: vec![
                Complex::new(T::ZERO, T::ZERO);
                config.max_filters * num_partitions * bins
            ],
            routings: Vec::with_capacity(config.max_routings),
            freq_acc: vec![Complex::new(T::ZERO, T::ZERO); bins],
            time_scratch: vec![T::ZERO; 2 * block],
        })
    }

    #[inline]
    pub fn config(&self) -> &ConvolverConfig {
        &self.config
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn filter_partition(&self, filter: usize, partition: usize) -> &[Complex<T>] {
        let base = (filter * self.num_partitions + partition) * self.bins;
        &self.filter_spectra[base..base + self.bins]
    }

    fn fdl_partition(&self, input: usize, partition: usize) -> &[Complex<T>] {
        let base = (input * self.num_partitions + partition) * self.bins;
        &self.fdl[base..base + self.bins]
    }

    /// Install or replace a filter impulse response.
    pub fn set_filter(&mut self, index: usize, coefficients: &[T]) -> ConfigResult<()> {
        if index >= self.config.max_filters {
            return Err(ConfigError::OutOfRange {
                parameter: "filter_index",
                detail: format!("{index} >= capacity {}", self.config.max_filters),
            });
        }
        if coefficients.len() > self.config.max_filter_length {
            return Err(ConfigError::InvalidFilterLength {
                length: coefficients.len(),
                detail: format!("exceeds maximum {}", self.config.max_filter_length),
            });
        }
        let block = self.config.block_size;
        for partition in 0..self.num_partitions {
            let start = (partition * block).min(coefficients.len());
            let end = ((partition + 1) * block).min(coefficients.len());
            let segment = &coefficients[start..end];
            let base = (index * self.num_partitions + partition) * self.bins;
            // Split borrow: the spectra buffer is disjoint from the FFT.
            let mut spectrum = vec![Complex::new(T::ZERO, T::ZERO); self.bins];
            self.fft
                .forward(segment, &mut spectrum)
                .map_err(|e| ConfigError::OutOfRange {
                    parameter: "filter_coefficients",
                    detail: e.to_string(),
                })?;
            self.filter_spectra[base..base + self.bins].copy_from_slice(&spectrum);
        }
        Ok(())
    }

    /// Remove a stored filter (reset to zero response).
    pub fn clear_filter(&mut self, index: usize) -> ConfigResult<()> {
        if index >= self.config.max_filters {
            return Err(ConfigError::OutOfRange {
                parameter: "filter_index",
                detail: format!("{index} >= capacity {}", self.config.max_filters),
            });
        }
        let base = index * self.num_partitions * self.bins;
        self.filter_spectra[base..base + self.num_partitions * self.bins]
            .fill(Complex::new(T::ZERO, T::ZERO));
        Ok(())
    }

    fn check_routing(&self, routing: &FilterRouting<T>) -> ConfigResult<()> {
        if routing.input >= self.config.num_inputs
            || routing.output >= self.config.num_outputs
            || routing.filter >= self.config.max_filters
        {
            return Err(ConfigError::OutOfRange {
                parameter: "filter_routing",
                detail: format!(
                    "({}, {}, {}) outside ({}, {}, {})",
                    routing.input,
                    routing.output,
                    routing.filter,
                    self.config.num_inputs,
                    self.config.num_outputs,
                    self.config.max_filters
                ),
            });
        }
        Ok(())
    }

    /// Add a routing point; replaces an existing (input, output) entry.
    pub fn add_routing(&mut self, routing: FilterRouting<T>) -> ConfigResult<()> {
        self.check_routing(&routing)?;
        if let Some(existing) = self
            .routings
            .iter_mut()
            .find(|r| r.input == routing.input && r.output == routing.output)
        {
            *existing = routing;
            return Ok(());
        }
        if self.routings.len() >= self.config.max_routings {
            return Err(ConfigError::OutOfRange {
                parameter: "filter_routing",
                detail: format!("routing capacity {} exceeded", self.config.max_routings),
            });
        }
        self.routings.push(routing);
        Ok(())
    }

    /// Remove the routing for an (input, output) pair, if present.
    pub fn remove_routing(&mut self, input: usize, output: usize) -> bool {
        let before = self.routings.len();
        self.routings
            .retain(|r| r.input != input || r.output != output);
        self.routings.len() != before
    }

    /// Replace the whole routing table.
    pub fn set_routings(&mut self, routings: &[FilterRouting<T>]) -> ConfigResult<()> {
        if routings.len() > self.config.max_routings {
            return Err(ConfigError::OutOfRange {
                parameter: "filter_routing",
                detail: format!("routing capacity {} exceeded", self.config.max_routings),
            });
        }
        for routing in routings {
            self.check_routing(routing)?;
        }
        self.routings.clear();
        self.routings.extend_from_slice(routings);
        Ok(())
    }

    #[inline]
    pub fn routings(&self) -> &[FilterRouting<T>] {
        &self.routings
    }

    /// Push one block per input into the frequency-domain delay lines.
    fn ingest_inputs(&mut self, inputs: &[&[T]]) -> ProcessResult<()> {
        let block = self.config.block_size;
        // Ring advances backwards so that partition distance equals age.
        self.fdl_head = (self.fdl_head + self.num_partitions - 1) % self.num_partitions;
        for (idx, input) in inputs.iter().enumerate() {
            let history = &mut self.input_history[idx * 2 * block..(idx + 1) * 2 * block];
            history.copy_within(block.., 0);
            history[block..].copy_from_slice(input);
            let base = (idx * self.num_partitions + self.fdl_head) * self.bins;
            let mut spectrum = std::mem::take(&mut self.freq_acc);
            let history = &self.input_history[idx * 2 * block..(idx + 1) * 2 * block];
            self.fft.forward(history, &mut spectrum)?;
            self.fdl[base..base + self.bins].copy_from_slice(&spectrum);
            self.freq_acc = spectrum;
        }
        Ok(())
    }

    /// Accumulate all routings that feed `output` into `freq_acc`, excluding
    /// or selecting by a filter predicate.
    fn accumulate_output(&mut self, output: usize) {
        self.freq_acc.fill(Complex::new(T::ZERO, T::ZERO));
        for r_idx in 0..self.routings.len() {
            let routing = self.routings[r_idx];
            if routing.output != output {
                continue;
            }
            for partition in 0..self.num_partitions {
                let age_slot = (self.fdl_head + partition) % self.num_partitions;
                let input_spec_base =
                    (routing.input * self.num_partitions + age_slot) * self.bins;
                let filter_base =
                    (routing.filter * self.num_partitions + partition) * self.bins;
                for bin in 0..self.bins {
                    let x = self.fdl[input_spec_base + bin];
                    let h = self.filter_spectra[filter_base + bin];
                    let scaled = Complex::new(x.re * routing.gain, x.im * routing.gain);
                    self.freq_acc[bin] = self.freq_acc[bin] + scaled * h;
                }
            }
        }
    }

    /// Process one block. Outputs without any routing are zero-filled.
    pub fn process(&mut self, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> ProcessResult<()> {
        let block = self.config.block_size;
        if inputs.len() != self.config.num_inputs || outputs.len() != self.config.num_outputs {
            return Err(ProcessError::Component {
                component: "PartitionedConvolver".to_string(),
                detail: "channel count mismatch".to_string(),
            });
        }
        self.ingest_inputs(inputs)?;
        for out_idx in 0..outputs.len() {
            self.accumulate_output(out_idx);
            let mut time = std::mem::take(&mut self.time_scratch);
            let mut acc = std::mem::take(&mut self.freq_acc);
            self.fft.inverse(&acc, &mut time)?;
            // Overlap-save: the first half is circular wrap-around, discard.
            outputs[out_idx].copy_from_slice(&time[block..]);
            acc.fill(Complex::new(T::ZERO, T::ZERO));
            self.freq_acc = acc;
            self.time_scratch = time;
        }
        Ok(())
    }

    /// Zero all signal state (input histories and delay lines), keeping the
    /// filters and routings.
    pub fn reset(&mut self) {
        self.input_history.fill(T::ZERO);
        self.fdl.fill(Complex::new(T::ZERO, T::ZERO));
        self.fdl_head = 0;
    }
}

// ============ Crossfading variant ============

/// Convolver that fades between the old and new response when a filter is
/// replaced at run time.
///
/// Replacement keeps the previous spectra alive; while a transition runs, the
/// engine renders both responses and blends them with a linear per-sample
/// ramp over the configured transition length.
pub struct CrossfadingConvolver<T: realfft::FftNum + Scalar> {
    current: PartitionedConvolver<T>,
    previous: PartitionedConvolver<T>,
    /// Remaining crossfade samples per filter slot; 0 = no fade active.
    fade_remaining: Vec<usize>,
    transition_samples: usize,
    fade_scratch: Vec<T>,
}

impl<T: realfft::FftNum + Scalar> CrossfadingConvolver<T> {
    pub fn new(
        fft_provider: &str,
        config: ConvolverConfig,
        transition_samples: usize,
    ) -> ConfigResult<Self> {
        if transition_samples == 0 || transition_samples % config.block_size != 0 {
            return Err(ConfigError::InvalidInterpolationPeriod {
                period: transition_samples,
                block_size: config.block_size,
            });
        }
        Ok(Self {
            current: PartitionedConvolver::new(fft_provider, config)?,
            previous: PartitionedConvolver::new(fft_provider, config)?,
            fade_remaining: vec![0; config.max_filters],
            transition_samples,
            fade_scratch: vec![T::ZERO; config.block_size],
        })
    }

    #[inline]
    pub fn config(&self) -> &ConvolverConfig {
        self.current.config()
    }

    /// Install a new response for `index`, fading from the previous one.
    pub fn set_filter(&mut self, index: usize, coefficients: &[T]) -> ConfigResult<()> {
        // Keep the outgoing spectra in the shadow engine.
        let partitions = self.current.num_partitions;
        let bins = self.current.bins;
        let base = index * partitions * bins;
        if index < self.fade_remaining.len() {
            let src = &self.current.filter_spectra[base..base + partitions * bins];
            self.previous.filter_spectra[base..base + partitions * bins].copy_from_slice(src);
        }
        self.current.set_filter(index, coefficients)?;
        self.fade_remaining[index] = self.transition_samples;
        Ok(())
    }

    pub fn add_routing(&mut self, routing: FilterRouting<T>) -> ConfigResult<()> {
        self.current.add_routing(routing)?;
        self.previous.add_routing(routing)
    }

    pub fn set_routings(&mut self, routings: &[FilterRouting<T>]) -> ConfigResult<()> {
        self.current.set_routings(routings)?;
        self.previous.set_routings(routings)
    }

    pub fn remove_routing(&mut self, input: usize, output: usize) -> bool {
        let removed = self.current.remove_routing(input, output);
        self.previous.remove_routing(input, output);
        removed
    }

    /// Process one block; both engines see every input so their delay lines
    /// stay coherent, and faded filters blend in the time domain.
    pub fn process(&mut self, inputs: &[&[T]], outputs: &mut [&mut [T]]) -> ProcessResult<()> {
        let block = self.config().block_size;
        let any_fade = self.fade_remaining.iter().any(|&r| r > 0);
        if !any_fade {
            // Shadow engine still tracks the input history.
            self.previous.ingest_inputs(inputs)?;
            return self.current.process(inputs, outputs);
        }

        self.current.process(inputs, outputs)?;
        // Render the outgoing responses and blend.
        let total = self.transition_samples;
        // All active fades share the countdown granularity of one block;
        // track the most recent fade for the ramp position.
        let remaining = self.fade_remaining.iter().copied().max().unwrap_or(0);
        let done = total - remaining;
        self.previous.ingest_inputs(inputs)?;
        for out_idx in 0..outputs.len() {
            self.previous.accumulate_output(out_idx);
            let mut time = std::mem::take(&mut self.previous.time_scratch);
            let acc = std::mem::take(&mut self.previous.freq_acc);
            self.previous.fft.inverse(&acc, &mut time)?;
            self.fade_scratch.copy_from_slice(&time[block..]);
            self.previous.freq_acc = acc;
            self.previous.time_scratch = time;
            self.previous.freq_acc.fill(Complex::new(T::ZERO, T::ZERO));

            let output = &mut outputs[out_idx];
            for (sample_idx, sample) in output.iter_mut().enumerate() {
                let progress =
                    <T as Scalar>::from_usize(done + sample_idx) / <T as Scalar>::from_usize(total);
                let progress = if progress > T::ONE { T::ONE } else { progress };
                *sample = progress * *sample + (T::ONE - progress) * self.fade_scratch[sample_idx];
            }
        }
        for remaining in self.fade_remaining.iter_mut() {
            *remaining = remaining.saturating_sub(block);
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current.reset();
        self.previous.reset();
        self.fade_remaining.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(input: &[f64], filter: &[f64], length: usize) -> Vec<f64> {
        let mut out = vec![0.0; length];
        for (n, out_sample) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, h) in filter.iter().enumerate() {
                if n >= k && n - k < input.len() {
                    acc += h * input[n - k];
                }
            }
            *out_sample = acc;
        }
        out
    }

    fn config(block: usize, filter_len: usize) -> ConvolverConfig {
        ConvolverConfig {
            num_inputs: 1,
            num_outputs: 1,
            block_size: block,
            max_filter_length: filter_len,
            max_routings: 4,
            max_filters: 2,
        }
    }

    #[test]
    fn matches_direct_convolution() {
        let block = 16;
        let filter_len = 40;
        let mut conv = PartitionedConvolver::<f64>::new("default", config(block, filter_len))
            .unwrap();
        let filter: Vec<f64> = (0..filter_len)
            .map(|i| ((i as f64) * 0.61).sin() * (-(i as f64) / 17.0).exp())
            .collect();
        conv.set_filter(0, &filter).unwrap();
        conv.add_routing(FilterRouting {
            input: 0,
            output: 0,
            filter: 0,
            gain: 1.0,
        })
        .unwrap();

        let total = 4 * filter_len;
        let blocks = total.div_ceil(block);
        let input: Vec<f64> = (0..blocks * block)
            .map(|i| ((i as f64) * 0.13).cos())
            .collect();
        let expected = direct_convolution(&input, &filter, blocks * block);

        let mut produced = Vec::new();
        for b in 0..blocks {
            let in_block = &input[b * block..(b + 1) * block];
            let mut out_block = vec![0.0f64; block];
            let mut outs: [&mut [f64]; 1] = [&mut out_block];
            conv.process(&[in_block], &mut outs).unwrap();
            produced.extend_from_slice(&out_block);
        }

        let peak = expected.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        for (idx, (got, want)) in produced.iter().zip(&expected).enumerate() {
            assert!(
                (got - want).abs() <= 1e-6 * peak.max(1.0),
                "sample {idx}: {got} vs {want}"
            );
        }
    }

    #[test]
    fn gain_scales_output() {
        let block = 8;
        let mut conv = PartitionedConvolver::<f64>::new("default", config(block, 8)).unwrap();
        conv.set_filter(0, &[1.0]).unwrap();
        conv.add_routing(FilterRouting {
            input: 0,
            output: 0,
            filter: 0,
            gain: 0.5,
        })
        .unwrap();
        let input = vec![1.0f64; block];
        let mut out = vec![0.0f64; block];
        let mut outs: [&mut [f64]; 1] = [&mut out];
        conv.process(&[&input], &mut outs).unwrap();
        for s in &out {
            assert!((s - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn capacity_limits_are_enforced() {
        let mut conv = PartitionedConvolver::<f64>::new("default", config(8, 8)).unwrap();
        assert!(conv.set_filter(2, &[1.0]).is_err());
        assert!(conv.set_filter(0, &vec![0.0; 9]).is_err());
        assert!(
            conv.add_routing(FilterRouting {
                input: 1,
                output: 0,
                filter: 0,
                gain: 1.0
            })
            .is_err()
        );
        for output in 0..1 {
            conv.add_routing(FilterRouting {
                input: 0,
                output,
                filter: 0,
                gain: 1.0,
            })
            .unwrap();
        }
    }

    #[test]
    fn routing_replacement_keeps_single_entry() {
        let mut conv = PartitionedConvolver::<f64>::new("default", config(8, 8)).unwrap();
        conv.add_routing(FilterRouting {
            input: 0,
            output: 0,
            filter: 0,
            gain: 1.0,
        })
        .unwrap();
        conv.add_routing(FilterRouting {
            input: 0,
            output: 0,
            filter: 1,
            gain: 0.5,
        })
        .unwrap();
        assert_eq!(conv.routings().len(), 1);
        assert_eq!(conv.routings()[0].filter, 1);
        assert!(conv.remove_routing(0, 0));
        assert!(!conv.remove_routing(0, 0));
    }

    #[test]
    fn crossfade_blends_between_filters() {
        let block = 8;
        let mut conv =
            CrossfadingConvolver::<f64>::new("default", config(block, 8), block).unwrap();
        conv.add_routing(FilterRouting {
            input: 0,
            output: 0,
            filter: 0,
            gain: 1.0,
        })
        .unwrap();
        conv.set_filter(0, &[1.0]).unwrap();
        let input = vec![1.0f64; block];
        let mut out = vec![0.0f64; block];
        // First call fades from the zero response up to identity.
        let mut outs: [&mut [f64]; 1] = [&mut out];
        conv.process(&[&input], &mut outs).unwrap();
        assert!(out[0] < 0.2);
        assert!(out[block - 1] > 0.8);
        // Steady state afterwards.
        let mut outs: [&mut [f64]; 1] = [&mut out];
        conv.process(&[&input], &mut outs).unwrap();
        for s in &out {
            assert!((s - 1.0).abs() < 1e-9);
        }
    }
}
