//! Late-reverb impulse-response synthesis.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use sf_core::{ConfigResult, ProcessResult, Sample, Severity, SignalFlowContext, StatusSink};
use sf_dsp::{BiquadCoeff, ParametricIirKind, ParametricIirSpec, biquad::process_section};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_num::AlignedMatrix;
use sf_objects::{LateReverb, NUM_SUBBANDS};
use sf_param::{
    DEFAULT_QUEUE_CAPACITY, IndexedVectorParameter, LateReverbParameter, MessageQueueInput,
    MessageQueueOutput,
};

/// Lowest subband centre frequency in Hz; bands are octave spaced.
const LOWEST_BAND_HZ: Sample = 62.5;

/// Turns `(slot, LateReverb)` messages into time-domain impulse responses.
///
/// Per (slot, band) a white-noise sequence is generated once at initialise
/// time from a deterministic seed, filtered by the band's analysis biquad
/// and shaped by the envelope `(onset, attack, peak level, exponential
/// decay)`. The summed bands leave as `(slot, IR)` messages for the late FIR
/// matrix. At most `max_updates_per_period` responses are synthesised per
/// block; surplus messages wait in the queue.
pub struct LateReverbFilterCalculator {
    info: ComponentInfo,
    subband_input: MessageQueueInput<LateReverbParameter>,
    filter_output: MessageQueueOutput<IndexedVectorParameter>,
    /// Band-filtered noise per (slot, band), length `ir_length`.
    filtered_noise: AlignedMatrix<Sample>,
    ir_length: usize,
    num_slots: usize,
    max_updates_per_period: usize,
    sampling_frequency: Sample,
    envelope_scratch: Vec<Sample>,
    status: StatusSink,
}

impl LateReverbFilterCalculator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        num_slots: usize,
        late_length_seconds: Sample,
        max_updates_per_period: usize,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let template_in = LateReverbParameter {
            slot: 0,
            params: LateReverb::silent(),
        };
        let subband_input =
            MessageQueueInput::new("subbandInput", DEFAULT_QUEUE_CAPACITY, &template_in);
        info.parameter_port(subband_input.cell())?;
        let template_out = IndexedVectorParameter {
            index: 0,
            values: Vec::new(),
        };
        let filter_output =
            MessageQueueOutput::new("filterOutput", DEFAULT_QUEUE_CAPACITY, &template_out);
        info.parameter_port(filter_output.cell())?;

        let fs = context.sampling_frequency_hz();
        let ir_length = (late_length_seconds * fs).ceil() as usize;
        if ir_length == 0 {
            return Err(sf_core::ConfigError::OutOfRange {
                parameter: "late_length_seconds",
                detail: format!("{late_length_seconds}"),
            });
        }

        // Pre-generate and band-filter the noise sequences; from here on
        // synthesis is envelope shaping and summation only.
        let bank = Self::analysis_bank(fs)?;
        let mut filtered_noise =
            AlignedMatrix::new(num_slots * NUM_SUBBANDS, ir_length, context.alignment());
        for slot in 0..num_slots {
            for band in 0..NUM_SUBBANDS {
                let row = filtered_noise.row_mut(slot * NUM_SUBBANDS + band);
                let seed = 0x5f0d_0000_u64 ^ ((slot as u64) << 16) ^ band as u64;
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                for value in row.iter_mut() {
                    *value = rng.random_range(-1.0..1.0);
                }
                let mut state = [0.0; 2];
                process_section(&bank[band], &mut state, row);
            }
        }

        log::debug!(
            "late-reverb bank: {num_slots} slots x {NUM_SUBBANDS} bands, {ir_length}-tap responses"
        );
        Ok(Self {
            info,
            subband_input,
            filter_output,
            filtered_noise,
            ir_length,
            num_slots,
            max_updates_per_period: max_updates_per_period.max(1),
            sampling_frequency: fs,
            envelope_scratch: vec![0.0; ir_length],
            status,
        })
    }

    /// Fixed analysis filter bank: lowpass for the bottom band, highpass for
    /// the top, constant-peak bandpass in between, octave spaced.
    fn analysis_bank(fs: Sample) -> ConfigResult<Vec<BiquadCoeff<Sample>>> {
        let mut bank = Vec::with_capacity(NUM_SUBBANDS);
        for band in 0..NUM_SUBBANDS {
            let frequency = LOWEST_BAND_HZ * (2.0 as Sample).powf(band as Sample);
            let frequency = frequency.min(0.45 * fs);
            let kind = if band == 0 {
                ParametricIirKind::Lowpass
            } else if band == NUM_SUBBANDS - 1 {
                ParametricIirKind::Highpass
            } else {
                ParametricIirKind::Bandpass
            };
            let quality = if kind == ParametricIirKind::Bandpass {
                // Octave bands.
                1.414
            } else {
                core::f64::consts::FRAC_1_SQRT_2 as Sample
            };
            bank.push(ParametricIirSpec::new(kind, frequency, quality, 0.0).to_biquad(fs)?);
        }
        Ok(bank)
    }

    /// Build the envelope for one band into the scratch buffer.
    fn build_envelope(&mut self, params: &LateReverb, band: usize) {
        let fs = self.sampling_frequency;
        let onset = (params.onset_delay_seconds.max(0.0) * fs) as usize;
        let attack_samples = (params.attack_times[band].max(0.0) * fs) as usize;
        let peak = params.levels[band];
        let decay = params.decay_coeffs[band].abs();
        for (idx, value) in self.envelope_scratch.iter_mut().enumerate() {
            *value = if idx < onset {
                0.0
            } else if attack_samples > 0 && idx < onset + attack_samples {
                // Raised-cosine rise from the onset to the peak level.
                let x = (idx - onset) as Sample / attack_samples as Sample;
                peak * 0.5 * (1.0 - (core::f64::consts::PI as Sample * x).cos())
            } else {
                let elapsed = (idx - onset - attack_samples) as Sample / fs;
                peak * (-decay * elapsed).exp()
            };
        }
    }

    fn synthesise(&mut self, message: &LateReverbParameter) -> IndexedVectorParameter {
        let mut ir = vec![0.0 as Sample; self.ir_length];
        for band in 0..NUM_SUBBANDS {
            self.build_envelope(&message.params, band);
            let noise = self.filtered_noise.row(message.slot * NUM_SUBBANDS + band);
            for ((out, &envelope), &sample) in ir
                .iter_mut()
                .zip(&self.envelope_scratch)
                .zip(noise)
            {
                *out += envelope * sample;
            }
        }
        IndexedVectorParameter {
            index: message.slot,
            values: ir,
        }
    }
}

impl AtomicComponent for LateReverbFilterCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        for _ in 0..self.max_updates_per_period {
            let Some(message) = self.subband_input.dequeue() else {
                break;
            };
            if message.slot >= self.num_slots {
                self.status.report(
                    Severity::Warning,
                    self.info.name(),
                    format!("late-reverb message for slot {} out of range", message.slot),
                );
                self.status.count_invalid_object();
                continue;
            }
            if !message.params.is_finite() {
                self.status.report(
                    Severity::Warning,
                    self.info.name(),
                    format!("late-reverb message for slot {} is non-finite", message.slot),
                );
                self.status.count_invalid_object();
                continue;
            }
            let filter = self.synthesise(&message);
            if !self.filter_output.enqueue(filter) {
                self.status.count_dropped_message();
            }
        }
        Ok(())
    }
}
