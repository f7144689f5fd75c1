//! The reverb sub-graph composite.

use sf_core::{ConfigResult, Sample, SignalFlowContext, StatusSink};
use sf_components::{
    Add, BiquadIirFilter, DelayVector, FirFilterMatrix, GainMatrix, SignalRouting,
    SingleToMultichannelDiffusion,
};
use sf_dsp::{FilterRouting, InterpolationMethod};
use sf_graph::{CompositeComponent, SELF};
use sf_num::AlignedMatrix;
use sf_objects::NUM_DISCRETE_REFLECTION_BIQUADS;
use sf_panning::LoudspeakerArray;
use sf_param::SignalRoutingParameter;

use crate::late_reverb_filter_calculator::LateReverbFilterCalculator;
use crate::reverb_parameter_calculator::ReverbParameterCalculator;

/// Static configuration of the reverb pipeline.
#[derive(Debug, Clone)]
pub struct ReverbRendererConfig {
    /// Rendering slots (simultaneous reverb objects).
    pub max_objects: usize,
    /// Discrete early reflections rendered per object.
    pub discrete_reflections_per_object: usize,
    /// Length of the synthesised late tail in seconds.
    pub late_length_seconds: Sample,
    /// Late-tail syntheses per block; surplus messages wait.
    pub max_updates_per_period: usize,
    /// Upper bound for discrete-reflection delays in seconds.
    pub max_discrete_delay_seconds: Sample,
    /// Interpolation period for gains and delays, in samples.
    pub interpolation_steps: usize,
    /// Crossfade length for late-filter replacement; `None` switches hard.
    pub late_transition_samples: Option<usize>,
    /// Fractional-delay method of the discrete reflection delays.
    pub discrete_interpolation: InterpolationMethod,
}

impl Default for ReverbRendererConfig {
    fn default() -> Self {
        Self {
            max_objects: 4,
            discrete_reflections_per_object: 8,
            late_length_seconds: 1.0,
            max_updates_per_period: 1,
            max_discrete_delay_seconds: 1.0,
            interpolation_steps: 1024,
            late_transition_samples: None,
            discrete_interpolation: InterpolationMethod::Linear,
        }
    }
}

/// Builder for the reverb composite.
///
/// External ports: audio `in` (object signals), audio `out` (loudspeaker
/// bus), parameter `objectIn` (scene vector).
pub struct ReverbObjectRenderer;

impl ReverbObjectRenderer {
    pub fn build(
        context: &SignalFlowContext,
        name: &str,
        config: &ReverbRendererConfig,
        array: &LoudspeakerArray,
        decorrelation_filters: &AlignedMatrix<Sample>,
        num_inputs: usize,
        status: StatusSink,
    ) -> ConfigResult<CompositeComponent> {
        let slots = config.max_objects;
        let reflections = slots * config.discrete_reflections_per_object;
        let num_speakers = array.num_regular_speakers();
        let fs = context.sampling_frequency_hz();
        let late_filter_length = (config.late_length_seconds * fs).ceil() as usize;

        let mut composite = CompositeComponent::new(name);
        composite.audio_input("in", num_inputs)?;
        composite.audio_output("out", num_speakers)?;
        composite.parameter_input("objectIn")?;

        // Parameter calculators.
        composite.add_component(Box::new(ReverbParameterCalculator::new(
            context,
            "ReverbParameterCalculator",
            array,
            slots,
            config.discrete_reflections_per_object,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(LateReverbFilterCalculator::new(
            context,
            "LateReverbFilterCalculator",
            slots,
            config.late_length_seconds,
            config.max_updates_per_period,
            status.clone(),
        )?))?;

        // Object signals onto their rendering slots.
        composite.add_component(Box::new(SignalRouting::new(
            context,
            "ObjectRouting",
            num_inputs,
            slots,
            SignalRoutingParameter::new(),
            true,
            status.clone(),
        )?))?;

        // Static fan-out: every slot feeds its block of reflection channels.
        let mut fanout = SignalRoutingParameter::new();
        for slot in 0..slots {
            for reflection in 0..config.discrete_reflections_per_object {
                fanout.add_routing(
                    slot,
                    slot * config.discrete_reflections_per_object + reflection,
                );
            }
        }
        composite.add_component(Box::new(SignalRouting::new(
            context,
            "ReflectionFanout",
            slots,
            reflections,
            fanout,
            false,
            status.clone(),
        )?))?;

        composite.add_component(Box::new(DelayVector::new(
            context,
            "ReflectionDelay",
            reflections,
            config.interpolation_steps,
            config.max_discrete_delay_seconds,
            config.discrete_interpolation,
            true,
            0.0,
            0.0,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(BiquadIirFilter::identity(
            context,
            "ReflectionFilter",
            reflections,
            NUM_DISCRETE_REFLECTION_BIQUADS,
            true,
        )?))?;
        composite.add_component(Box::new(GainMatrix::new(
            context,
            "ReflectionPanning",
            reflections,
            num_speakers,
            config.interpolation_steps,
            0.0,
            true,
        )?))?;

        // Late path: per-slot gain, late-tail FIR, decorrelation to the
        // loudspeaker bus.
        composite.add_component(Box::new(DelayVector::new(
            context,
            "LateGain",
            slots,
            config.interpolation_steps,
            0.0,
            InterpolationMethod::NearestSample,
            true,
            0.0,
            0.0,
            status.clone(),
        )?))?;
        let late_routings: Vec<FilterRouting<Sample>> = (0..slots)
            .map(|slot| FilterRouting {
                input: slot,
                output: 0,
                filter: slot,
                gain: 1.0,
            })
            .collect();
        composite.add_component(Box::new(FirFilterMatrix::new(
            context,
            "LateFirMatrix",
            slots,
            1,
            late_filter_length,
            slots,
            slots,
            &late_routings,
            config.late_transition_samples,
            true,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(SingleToMultichannelDiffusion::new(
            context,
            "LateDecorrelator",
            num_speakers,
            decorrelation_filters,
            SingleToMultichannelDiffusion::default_gain(num_speakers),
            status.clone(),
        )?))?;

        composite.add_component(Box::new(Add::new(
            context,
            "Sum",
            num_speakers,
            2,
        )?))?;

        // Audio wiring.
        composite.audio_connection((SELF, "in"), ("ObjectRouting", "in"));
        composite.audio_connection(("ObjectRouting", "out"), ("ReflectionFanout", "in"));
        composite.audio_connection(("ReflectionFanout", "out"), ("ReflectionDelay", "in"));
        composite.audio_connection(("ReflectionDelay", "out"), ("ReflectionFilter", "in"));
        composite.audio_connection(("ReflectionFilter", "out"), ("ReflectionPanning", "in"));
        composite.audio_connection(("ReflectionPanning", "out"), ("Sum", "in0"));
        composite.audio_connection(("ObjectRouting", "out"), ("LateGain", "in"));
        composite.audio_connection(("LateGain", "out"), ("LateFirMatrix", "in"));
        composite.audio_connection(("LateFirMatrix", "out"), ("LateDecorrelator", "in"));
        composite.audio_connection(("LateDecorrelator", "out"), ("Sum", "in1"));
        composite.audio_connection(("Sum", "out"), (SELF, "out"));

        // Parameter wiring.
        composite.parameter_connection(
            (SELF, "objectIn"),
            ("ReverbParameterCalculator", "objectInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "signalRoutingOut"),
            ("ObjectRouting", "controlInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "discreteGainOut"),
            ("ReflectionDelay", "gainInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "discreteDelayOut"),
            ("ReflectionDelay", "delayInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "discreteEqOut"),
            ("ReflectionFilter", "eqInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "discretePanningGainOut"),
            ("ReflectionPanning", "gainInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "lateGainOut"),
            ("LateGain", "gainInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "lateDelayOut"),
            ("LateGain", "delayInput"),
        );
        composite.parameter_connection(
            ("ReverbParameterCalculator", "lateSubbandOut"),
            ("LateReverbFilterCalculator", "subbandInput"),
        );
        composite.parameter_connection(
            ("LateReverbFilterCalculator", "filterOutput"),
            ("LateFirMatrix", "filterInput"),
        );

        Ok(composite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_graph::SignalFlow;
    use sf_objects::{AudioObject, CartesianPosition, DiscreteReflection, LateReverb, ObjectPayload};
    use sf_param::{
        DoubleBufferedCore, DoubleBufferedOutput, ObjectVectorParameter,
    };

    fn reverb_scene_object() -> AudioObject {
        let mut late = LateReverb::silent();
        late.levels = [0.3; sf_objects::NUM_SUBBANDS];
        late.decay_coeffs = [30.0; sf_objects::NUM_SUBBANDS];
        late.attack_times = [0.005; sf_objects::NUM_SUBBANDS];
        AudioObject::new(
            7,
            0,
            1.0,
            ObjectPayload::PointSourceWithReverb {
                position: CartesianPosition::new(1.0, 0.0, 0.0),
                discrete_reflections: vec![DiscreteReflection::new(
                    CartesianPosition::new(1.0, 0.2, 0.0),
                    0.005,
                    0.8,
                )],
                late_reverb: late,
            },
        )
    }

    #[test]
    fn reverb_pipeline_produces_output_for_a_reverb_object() {
        let context = SignalFlowContext::new(64, 48000).unwrap();
        let array = LoudspeakerArray::stereo(30.0).unwrap();
        let mut filters = AlignedMatrix::new(2, 8, context.alignment());
        filters.row_mut(0)[0] = 1.0;
        filters.row_mut(1)[0] = 1.0;
        let config = ReverbRendererConfig {
            max_objects: 2,
            discrete_reflections_per_object: 2,
            late_length_seconds: 0.05,
            interpolation_steps: 64,
            ..ReverbRendererConfig::default()
        };
        let status = StatusSink::new();
        let reverb = ReverbObjectRenderer::build(
            &context,
            "Reverb",
            &config,
            &array,
            &filters,
            2,
            status.clone(),
        )
        .unwrap();
        let mut flow = SignalFlow::new(reverb, context, status).unwrap();

        let scene_cell = flow
            .external_parameter_cell::<DoubleBufferedCore<ObjectVectorParameter>>("objectIn")
            .expect("scene input");
        let sender = DoubleBufferedOutput::from_cell(scene_cell);
        sender.with_back_mut(|scene| scene.0.set(reverb_scene_object()));
        sender.swap_buffers();

        let mut energy = 0.0f64;
        for _ in 0..32 {
            flow.input_mut(0).fill(1.0);
            flow.input_mut(1).fill(0.0);
            flow.process();
            energy += flow
                .output(0)
                .iter()
                .chain(flow.output(1))
                .map(|&s| (s as f64) * (s as f64))
                .sum::<f64>();
        }
        assert!(energy > 0.0, "reverb bus stayed silent");
    }
}
