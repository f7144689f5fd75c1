//! Scene-to-slot reverb parameter derivation.

use sf_core::{ConfigResult, ProcessResult, Sample, Severity, SignalFlowContext, StatusSink};
use sf_dsp::{BiquadCoeff, ObjectChannelAllocator};
use sf_graph::{AtomicComponent, ComponentInfo, ProcessIo};
use sf_objects::{
    AudioObject, LateReverb, NUM_DISCRETE_REFLECTION_BIQUADS, ObjectPayload,
};
use sf_panning::{LoudspeakerArray, Vbap};
use sf_param::{
    BiquadMatrixParameter, DEFAULT_QUEUE_CAPACITY, DoubleBufferedInput, DoubleBufferedOutput,
    LateReverbParameter, MatrixParameter, MessageQueueOutput, ObjectVectorParameter, SharedOutput,
    SignalRoutingParameter, VectorParameter,
};

/// Tolerance for late-reverb change detection: any component differing by
/// more than this triggers a resynthesis message.
const LATE_REVERB_COMPARISON_LIMIT: Sample = Sample::EPSILON;

/// Walks the per-block scene, keeps reverb objects on stable rendering
/// slots, and emits every control parameter of the reverb pipeline.
pub struct ReverbParameterCalculator {
    info: ComponentInfo,
    object_input: DoubleBufferedInput<ObjectVectorParameter>,
    routing_output: DoubleBufferedOutput<SignalRoutingParameter>,
    discrete_gain_output: DoubleBufferedOutput<VectorParameter>,
    discrete_delay_output: DoubleBufferedOutput<VectorParameter>,
    discrete_eq_output: DoubleBufferedOutput<BiquadMatrixParameter>,
    discrete_panning_output: SharedOutput<MatrixParameter>,
    late_gain_output: DoubleBufferedOutput<VectorParameter>,
    late_delay_output: DoubleBufferedOutput<VectorParameter>,
    late_subband_output: MessageQueueOutput<LateReverbParameter>,
    allocator: ObjectChannelAllocator,
    vbap: Vbap,
    max_objects: usize,
    reflections_per_object: usize,
    num_speakers: usize,
    /// Previous descriptor per slot; `None` forces an initial message.
    previous_late: Vec<Option<LateReverb>>,
    scratch_gains: Vec<Sample>,
    status: StatusSink,
}

impl ReverbParameterCalculator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &SignalFlowContext,
        name: &str,
        array: &LoudspeakerArray,
        max_objects: usize,
        reflections_per_object: usize,
        status: StatusSink,
    ) -> ConfigResult<Self> {
        let mut info = ComponentInfo::new(name);
        let object_input =
            DoubleBufferedInput::new("objectInput", ObjectVectorParameter::default());
        info.parameter_port(object_input.cell())?;

        let discrete = max_objects * reflections_per_object;
        let align = context.alignment();
        let routing_output =
            DoubleBufferedOutput::new("signalRoutingOut", SignalRoutingParameter::new());
        info.parameter_port(routing_output.cell())?;
        let discrete_gain_output =
            DoubleBufferedOutput::new("discreteGainOut", VectorParameter::zeros(discrete, align));
        info.parameter_port(discrete_gain_output.cell())?;
        let discrete_delay_output =
            DoubleBufferedOutput::new("discreteDelayOut", VectorParameter::zeros(discrete, align));
        info.parameter_port(discrete_delay_output.cell())?;
        let discrete_eq_output = DoubleBufferedOutput::new(
            "discreteEqOut",
            BiquadMatrixParameter::identity(discrete, NUM_DISCRETE_REFLECTION_BIQUADS),
        );
        info.parameter_port(discrete_eq_output.cell())?;
        let num_speakers = array.num_regular_speakers();
        let discrete_panning_output = SharedOutput::new(
            "discretePanningGainOut",
            MatrixParameter::zeros(num_speakers, discrete, align),
        );
        info.parameter_port(discrete_panning_output.cell())?;
        let late_gain_output =
            DoubleBufferedOutput::new("lateGainOut", VectorParameter::zeros(max_objects, align));
        info.parameter_port(late_gain_output.cell())?;
        let late_delay_output =
            DoubleBufferedOutput::new("lateDelayOut", VectorParameter::zeros(max_objects, align));
        info.parameter_port(late_delay_output.cell())?;
        let template = LateReverbParameter {
            slot: 0,
            params: LateReverb::silent(),
        };
        let late_subband_output =
            MessageQueueOutput::new("lateSubbandOut", DEFAULT_QUEUE_CAPACITY, &template);
        info.parameter_port(late_subband_output.cell())?;

        Ok(Self {
            info,
            object_input,
            routing_output,
            discrete_gain_output,
            discrete_delay_output,
            discrete_eq_output,
            discrete_panning_output,
            late_gain_output,
            late_delay_output,
            late_subband_output,
            allocator: ObjectChannelAllocator::new(max_objects),
            vbap: Vbap::new(array)?,
            max_objects,
            reflections_per_object,
            num_speakers,
            previous_late: vec![None; max_objects],
            scratch_gains: vec![0.0; num_speakers],
            status,
        })
    }

    fn select_reverb_objects(&self, objects: &ObjectVectorParameter) -> Vec<u32> {
        let mut found: Vec<u32> = Vec::new();
        let mut claimed_channels: Vec<usize> = Vec::new();
        for object in objects.iter() {
            let ObjectPayload::PointSourceWithReverb { late_reverb, .. } = &object.payload else {
                continue;
            };
            if !late_reverb.is_finite() {
                self.status.report(
                    Severity::Warning,
                    self.info.name(),
                    format!("reverb object {}: non-finite late-reverb data; dropped", object.id),
                );
                self.status.count_invalid_object();
                continue;
            }
            if claimed_channels.contains(&object.channel_index) {
                self.status.report(
                    Severity::Warning,
                    self.info.name(),
                    format!(
                        "reverb object {} shares channel {} with an earlier object; dropped",
                        object.id, object.channel_index
                    ),
                );
                self.status.count_invalid_object();
                continue;
            }
            if found.len() >= self.max_objects {
                self.status.report(
                    Severity::Warning,
                    self.info.name(),
                    format!(
                        "reverb object {} exceeds the {} available slots; dropped",
                        object.id, self.max_objects
                    ),
                );
                self.status.count_allocator_overflow();
                continue;
            }
            claimed_channels.push(object.channel_index);
            found.push(object.id);
        }
        found
    }

    fn process_slot(&mut self, slot: usize, object: &AudioObject) {
        let ObjectPayload::PointSourceWithReverb {
            discrete_reflections,
            late_reverb,
            ..
        } = &object.payload
        else {
            return;
        };
        let start = slot * self.reflections_per_object;
        let reflections = discrete_reflections
            .iter()
            .take(self.reflections_per_object);
        let used = reflections.len();
        if discrete_reflections.len() > self.reflections_per_object {
            self.status.report(
                Severity::Warning,
                self.info.name(),
                format!(
                    "reverb object {}: {} discrete reflections exceed capacity {}; surplus dropped",
                    object.id,
                    discrete_reflections.len(),
                    self.reflections_per_object
                ),
            );
            self.status.count_clamped_value();
        }

        let vbap = &self.vbap;
        let scratch = &mut self.scratch_gains;
        let num_speakers = self.num_speakers;
        self.discrete_panning_output.with_mut(|panning| {
            for (offset, reflection) in discrete_reflections
                .iter()
                .take(self.reflections_per_object)
                .enumerate()
            {
                let column = start + offset;
                vbap.calculate_gains(reflection.position, false, scratch);
                for speaker in 0..num_speakers {
                    *panning.at_mut(speaker, column) = scratch[speaker];
                }
            }
            for offset in used..self.reflections_per_object {
                let column = start + offset;
                for speaker in 0..num_speakers {
                    *panning.at_mut(speaker, column) = 0.0;
                }
            }
        });
        let level = object.level;
        self.discrete_gain_output.with_back_mut(|gains| {
            for (offset, reflection) in discrete_reflections
                .iter()
                .take(self.reflections_per_object)
                .enumerate()
            {
                gains.as_mut_slice()[start + offset] = level * reflection.level;
            }
            for offset in used..self.reflections_per_object {
                gains.as_mut_slice()[start + offset] = 0.0;
            }
        });
        self.discrete_delay_output.with_back_mut(|delays| {
            for (offset, reflection) in discrete_reflections
                .iter()
                .take(self.reflections_per_object)
                .enumerate()
            {
                delays.as_mut_slice()[start + offset] = reflection.delay_seconds;
            }
            for offset in used..self.reflections_per_object {
                delays.as_mut_slice()[start + offset] = 0.0;
            }
        });
        self.discrete_eq_output.with_back_mut(|matrix| {
            for (offset, reflection) in discrete_reflections
                .iter()
                .take(self.reflections_per_object)
                .enumerate()
            {
                for (section, coeff) in reflection.biquads.iter().enumerate() {
                    *matrix.0.at_mut(start + offset, section) = *coeff;
                }
            }
            for offset in used..self.reflections_per_object {
                for section in 0..NUM_DISCRETE_REFLECTION_BIQUADS {
                    *matrix.0.at_mut(start + offset, section) = BiquadCoeff::default();
                }
            }
        });

        self.late_gain_output
            .with_back_mut(|gains| gains.as_mut_slice()[slot] = level);
        // The onset delay is realised inside the synthesised impulse
        // response; the late delay stays at zero.
        self.late_delay_output
            .with_back_mut(|delays| delays.as_mut_slice()[slot] = 0.0);

        let changed = match &self.previous_late[slot] {
            None => true,
            Some(previous) => {
                previous.max_difference(late_reverb) > LATE_REVERB_COMPARISON_LIMIT
            }
        };
        if changed {
            self.previous_late[slot] = Some(late_reverb.clone());
            if !self.late_subband_output.enqueue(LateReverbParameter {
                slot,
                params: late_reverb.clone(),
            }) {
                self.status.count_dropped_message();
            }
        }
    }

    fn clear_slot(&mut self, slot: usize) {
        let start = slot * self.reflections_per_object;
        let count = self.reflections_per_object;
        let num_speakers = self.num_speakers;
        self.discrete_panning_output.with_mut(|panning| {
            for column in start..start + count {
                for speaker in 0..num_speakers {
                    *panning.at_mut(speaker, column) = 0.0;
                }
            }
        });
        self.discrete_gain_output
            .with_back_mut(|gains| gains.as_mut_slice()[start..start + count].fill(0.0));
        self.discrete_delay_output
            .with_back_mut(|delays| delays.as_mut_slice()[start..start + count].fill(0.0));
        self.discrete_eq_output.with_back_mut(|matrix| {
            for row in start..start + count {
                for section in 0..NUM_DISCRETE_REFLECTION_BIQUADS {
                    *matrix.0.at_mut(row, section) = BiquadCoeff::default();
                }
            }
        });
        self.late_gain_output
            .with_back_mut(|gains| gains.as_mut_slice()[slot] = 0.0);
        self.late_delay_output
            .with_back_mut(|delays| delays.as_mut_slice()[slot] = 0.0);

        let silent = LateReverb::silent();
        let send = match &self.previous_late[slot] {
            None => true,
            Some(previous) => previous.max_difference(&silent) > LATE_REVERB_COMPARISON_LIMIT,
        };
        if send {
            self.previous_late[slot] = Some(silent.clone());
            if !self.late_subband_output.enqueue(LateReverbParameter {
                slot,
                params: silent,
            }) {
                self.status.count_dropped_message();
            }
        }
    }
}

impl AtomicComponent for ReverbParameterCalculator {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn process(&mut self, _io: &ProcessIo<'_>) -> ProcessResult<()> {
        let objects: ObjectVectorParameter = self.object_input.with(|o| o.clone());
        let found = self.select_reverb_objects(&objects);
        if self.allocator.set_objects(&found).is_err() {
            // select_reverb_objects caps at capacity; this is unreachable
            // but kept as a defence for allocator state consistency.
            self.status.count_allocator_overflow();
            return Ok(());
        }
        self.routing_output.with_back_mut(|routing| routing.clear());
        for slot in 0..self.max_objects {
            match self.allocator.object_for_channel(slot) {
                Some(object_id) => {
                    let Some(object) = objects.get(object_id).cloned() else {
                        self.clear_slot(slot);
                        continue;
                    };
                    let channel = object.channel_index;
                    self.routing_output
                        .with_back_mut(|routing| routing.add_routing(channel, slot));
                    self.process_slot(slot, &object);
                }
                None => self.clear_slot(slot),
            }
        }
        self.routing_output.swap_buffers();
        self.discrete_gain_output.swap_buffers();
        self.discrete_delay_output.swap_buffers();
        self.discrete_eq_output.swap_buffers();
        // The panning matrix uses the shared protocol; no publish step.
        self.late_gain_output.swap_buffers();
        self.late_delay_output.swap_buffers();
        Ok(())
    }
}
