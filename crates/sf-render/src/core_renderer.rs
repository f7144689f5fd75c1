//! The core rendering composite.

use sf_core::{ConfigError, ConfigResult, Sample, SignalFlowContext, StatusSink};
use sf_components::{
    Add, BiquadIirFilter, ChannelObjectRoutingCalculator, DelayVector, DiffusionGainCalculator,
    GainMatrix, GainVector, HoaAllRadGainCalculator, ListenerCompensation, NullSource,
    ObjectGainEqCalculator, PanningCalculator, SignalRouting, SingleToMultichannelDiffusion,
};
use sf_dsp::{BiquadCoeff, BiquadCoeffList, BiquadCoeffMatrix, InterpolationMethod};
use sf_graph::{CompositeComponent, SELF};
use sf_num::AlignedMatrix;
use sf_objects::CartesianPosition;
use sf_panning::LoudspeakerArray;
use sf_param::SignalRoutingParameter;
use sf_reverb::{ReverbObjectRenderer, ReverbRendererConfig};

/// HOA decoding support: a regular virtual array plus the stored
/// HOA-to-virtual decode matrix (`harmonics x virtual`).
#[derive(Clone)]
pub struct HoaDecodeConfig {
    pub virtual_positions: Vec<CartesianPosition>,
    pub decode_matrix: AlignedMatrix<Sample>,
}

/// Construction parameters of the core renderer.
pub struct CoreRendererConfig {
    pub array: LoudspeakerArray,
    /// Object signal channels entering the renderer.
    pub num_inputs: usize,
    /// Physical output channels leaving the renderer.
    pub num_outputs: usize,
    /// Interpolation period for all time-varying gains, in samples.
    pub interpolation_steps: usize,
    /// Biquad sections available for per-object EQ.
    pub object_eq_sections: usize,
    /// Decorrelation filters for the object-diffuse path (one row per
    /// loudspeaker).
    pub diffusion_filters: AlignedMatrix<Sample>,
    /// Enable listener tracking (position input + compensation stage).
    pub listener_tracking: bool,
    /// Split panning into a low/high band pair with a dedicated
    /// low-frequency matrix.
    pub frequency_dependent_panning: bool,
    /// HOA decoding; `None` renders HOA objects silent.
    pub hoa: Option<HoaDecodeConfig>,
    /// Reverb-object rendering; `None` omits the reverb sub-graph.
    pub reverb: Option<ReverbRendererConfig>,
}

/// Builder for the core composite.
///
/// External ports: audio `audioIn` / `audioOut`, parameter
/// `objectDataInput`, and (with tracking) `trackingPositionInput`.
pub struct CoreRenderer;

/// Static 2nd-order Linkwitz-Riley pair (700 Hz at 48 kHz) used by the
/// frequency-dependent panning split.
fn linkwitz_riley_pair() -> (BiquadCoeff<Sample>, BiquadCoeff<Sample>) {
    let lowpass = BiquadCoeff::new(
        0.001921697757295,
        0.003843395514590,
        0.001921697757295,
        -1.824651307057289,
        0.832338098086468,
    );
    // Numerator negated to compensate the 180 degree phase of the design.
    let highpass = BiquadCoeff::new(
        -0.914247351285939,
        1.828494702571878,
        -0.914247351285939,
        -1.824651307057289,
        0.832338098086468,
    );
    (lowpass, highpass)
}

impl CoreRenderer {
    pub fn build(
        context: &SignalFlowContext,
        name: &str,
        config: &CoreRendererConfig,
        status: StatusSink,
    ) -> ConfigResult<CompositeComponent> {
        let array = &config.array;
        let num_inputs = config.num_inputs;
        let num_speakers = array.num_regular_speakers();
        let num_subwoofers = array.num_subwoofers();
        let num_output_signals = num_speakers + num_subwoofers;
        if num_output_signals > config.num_outputs {
            return Err(ConfigError::LoudspeakerArray(format!(
                "{num_output_signals} output signals exceed the {} physical channels",
                config.num_outputs
            )));
        }
        for &channel in &array.output_channels() {
            if channel >= config.num_outputs {
                return Err(ConfigError::LoudspeakerArray(format!(
                    "output channel {channel} outside the {} physical channels",
                    config.num_outputs
                )));
            }
        }
        if config.diffusion_filters.rows() < num_speakers {
            return Err(ConfigError::LoudspeakerArray(format!(
                "{} diffusion filter rows for {num_speakers} loudspeakers",
                config.diffusion_filters.rows()
            )));
        }

        let mut composite = CompositeComponent::new(name);
        composite.audio_input("audioIn", num_inputs)?;
        composite.audio_output("audioOut", config.num_outputs)?;
        composite.parameter_input("objectDataInput")?;
        if config.listener_tracking {
            composite.parameter_input("trackingPositionInput")?;
        }

        // ============ Object conditioning ============

        composite.add_component(Box::new(ObjectGainEqCalculator::new(
            context,
            "ObjectGainEqCalculator",
            num_inputs,
            config.object_eq_sections,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(GainVector::new(
            context,
            "ObjectGain",
            num_inputs,
            config.interpolation_steps,
            true,
            1.0,
        )?))?;
        composite.add_component(Box::new(BiquadIirFilter::identity(
            context,
            "ObjectEq",
            num_inputs,
            config.object_eq_sections,
            true,
        )?))?;
        composite.audio_connection((SELF, "audioIn"), ("ObjectGain", "in"));
        composite.audio_connection(("ObjectGain", "out"), ("ObjectEq", "in"));
        composite.parameter_connection(
            (SELF, "objectDataInput"),
            ("ObjectGainEqCalculator", "objectIn"),
        );
        composite.parameter_connection(
            ("ObjectGainEqCalculator", "gainOut"),
            ("ObjectGain", "gainInput"),
        );
        composite.parameter_connection(
            ("ObjectGainEqCalculator", "eqOut"),
            ("ObjectEq", "eqInput"),
        );

        // ============ Direct / diffuse paths ============

        let mixer_inputs = 3
            + usize::from(config.frequency_dependent_panning)
            + usize::from(config.reverb.is_some());
        composite.add_component(Box::new(Add::new(
            context,
            "DirectDiffuseMixer",
            num_speakers,
            mixer_inputs,
        )?))?;
        let mut mixer_next = 0usize;
        let mut mixer_port = move || {
            let port = format!("in{mixer_next}");
            mixer_next += 1;
            port
        };

        // Channel-bed objects.
        composite.add_component(Box::new(ChannelObjectRoutingCalculator::new(
            context,
            "ChannelObjectRoutingCalculator",
            num_inputs,
            array,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(SignalRouting::new(
            context,
            "ChannelObjectRouting",
            num_inputs,
            num_speakers,
            SignalRoutingParameter::new(),
            true,
            status.clone(),
        )?))?;
        composite.parameter_connection(
            (SELF, "objectDataInput"),
            ("ChannelObjectRoutingCalculator", "objectIn"),
        );
        composite.parameter_connection(
            ("ChannelObjectRoutingCalculator", "routingOut"),
            ("ChannelObjectRouting", "controlInput"),
        );
        composite.audio_connection(("ObjectEq", "out"), ("ChannelObjectRouting", "in"));
        let port = mixer_port();
        composite.audio_connection(
            ("ChannelObjectRouting", "out"),
            ("DirectDiffuseMixer", port.as_str()),
        );

        // Panned objects.
        composite.add_component(Box::new(PanningCalculator::new(
            context,
            "VbapGainCalculator",
            num_inputs,
            array,
            config.listener_tracking,
            config.frequency_dependent_panning,
            status.clone(),
        )?))?;
        composite.add_component(Box::new(GainMatrix::new(
            context,
            "VbapGainMatrix",
            num_inputs,
            num_speakers,
            config.interpolation_steps,
            0.0,
            true,
        )?))?;
        composite.parameter_connection(
            (SELF, "objectDataInput"),
            ("VbapGainCalculator", "objectVectorInput"),
        );
        if config.listener_tracking {
            composite.parameter_connection(
                (SELF, "trackingPositionInput"),
                ("VbapGainCalculator", "listenerPosition"),
            );
        }
        match &config.hoa {
            Some(hoa) => {
                composite.add_component(Box::new(HoaAllRadGainCalculator::new(
                    context,
                    "AllRadGainCalculator",
                    num_inputs,
                    array,
                    hoa.virtual_positions.clone(),
                    hoa.decode_matrix.clone(),
                    config.listener_tracking,
                    status.clone(),
                )?))?;
                composite.parameter_connection(
                    (SELF, "objectDataInput"),
                    ("AllRadGainCalculator", "objectInput"),
                );
                if config.listener_tracking {
                    composite.parameter_connection(
                        (SELF, "trackingPositionInput"),
                        ("AllRadGainCalculator", "listenerPosition"),
                    );
                }
                composite.parameter_connection(
                    ("VbapGainCalculator", "gainOutput"),
                    ("AllRadGainCalculator", "gainInput"),
                );
                composite.parameter_connection(
                    ("AllRadGainCalculator", "gainOutput"),
                    ("VbapGainMatrix", "gainInput"),
                );
            }
            None => {
                composite.parameter_connection(
                    ("VbapGainCalculator", "gainOutput"),
                    ("VbapGainMatrix", "gainInput"),
                );
            }
        }
        let port = mixer_port();
        composite.audio_connection(("VbapGainMatrix", "out"), ("DirectDiffuseMixer", port.as_str()));

        if config.frequency_dependent_panning {
            let (lowpass, highpass) = linkwitz_riley_pair();
            let mut coefficients = BiquadCoeffMatrix::identity(2 * num_inputs, 1);
            for channel in 0..num_inputs {
                coefficients.set_channel(
                    channel,
                    &BiquadCoeffList::from_sections(vec![highpass]),
                );
                coefficients.set_channel(
                    channel + num_inputs,
                    &BiquadCoeffList::from_sections(vec![lowpass]),
                );
            }
            composite.add_component(Box::new(BiquadIirFilter::new(
                context,
                "PanningFilterbank",
                2 * num_inputs,
                1,
                coefficients,
                false,
            )?))?;
            composite.add_component(Box::new(GainMatrix::new(
                context,
                "LowFrequencyPanningMatrix",
                num_inputs,
                num_speakers,
                config.interpolation_steps,
                0.0,
                true,
            )?))?;
            composite.parameter_connection(
                ("VbapGainCalculator", "lowFrequencyGainOutput"),
                ("LowFrequencyPanningMatrix", "gainInput"),
            );
            composite.audio_connection_range(
                ("ObjectEq", "out"),
                0..num_inputs,
                ("PanningFilterbank", "in"),
                0..num_inputs,
            );
            composite.audio_connection_range(
                ("ObjectEq", "out"),
                0..num_inputs,
                ("PanningFilterbank", "in"),
                num_inputs..2 * num_inputs,
            );
            composite.audio_connection_range(
                ("PanningFilterbank", "out"),
                0..num_inputs,
                ("VbapGainMatrix", "in"),
                0..num_inputs,
            );
            composite.audio_connection_range(
                ("PanningFilterbank", "out"),
                num_inputs..2 * num_inputs,
                ("LowFrequencyPanningMatrix", "in"),
                0..num_inputs,
            );
            let port = mixer_port();
            composite.audio_connection(
                ("LowFrequencyPanningMatrix", "out"),
                ("DirectDiffuseMixer", port.as_str()),
            );
        } else {
            composite.audio_connection(("ObjectEq", "out"), ("VbapGainMatrix", "in"));
        }

        // Diffuse path: summation to one bus, then decorrelation.
        composite.add_component(Box::new(DiffusionGainCalculator::new(
            context,
            "DiffusionCalculator",
            num_inputs,
        )?))?;
        composite.add_component(Box::new(GainMatrix::new(
            context,
            "DiffusePartMatrix",
            num_inputs,
            1,
            config.interpolation_steps,
            0.0,
            true,
        )?))?;
        composite.add_component(Box::new(SingleToMultichannelDiffusion::new(
            context,
            "DiffusePartDecorrelator",
            num_speakers,
            &config.diffusion_filters,
            SingleToMultichannelDiffusion::default_gain(num_speakers),
            status.clone(),
        )?))?;
        composite.parameter_connection(
            (SELF, "objectDataInput"),
            ("DiffusionCalculator", "objectInput"),
        );
        composite.parameter_connection(
            ("DiffusionCalculator", "gainOutput"),
            ("DiffusePartMatrix", "gainInput"),
        );
        composite.audio_connection(("ObjectEq", "out"), ("DiffusePartMatrix", "in"));
        composite.audio_connection(
            ("DiffusePartMatrix", "out"),
            ("DiffusePartDecorrelator", "in"),
        );
        let port = mixer_port();
        composite.audio_connection(
            ("DiffusePartDecorrelator", "out"),
            ("DirectDiffuseMixer", port.as_str()),
        );

        // Reverb objects.
        if let Some(reverb_config) = &config.reverb {
            let reverb = ReverbObjectRenderer::build(
                context,
                "ReverbObjectRenderer",
                reverb_config,
                array,
                &config.diffusion_filters,
                num_inputs,
                status.clone(),
            )?;
            composite.add_composite(reverb)?;
            composite.audio_connection(("ObjectEq", "out"), ("ReverbObjectRenderer", "in"));
            composite.parameter_connection(
                (SELF, "objectDataInput"),
                ("ReverbObjectRenderer", "objectIn"),
            );
            let port = mixer_port();
            composite.audio_connection(
                ("ReverbObjectRenderer", "out"),
                ("DirectDiffuseMixer", port.as_str()),
            );
        }

        // ============ Output stages ============

        // Optional listener compensation between the mix and the outputs.
        let mix_source: (&str, &str) = if config.listener_tracking {
            composite.add_component(Box::new(ListenerCompensation::new(
                context,
                "TrackingListenerCompensation",
                array,
            )?))?;
            composite.add_component(Box::new(DelayVector::new(
                context,
                "ListenerGainDelayCompensation",
                num_speakers,
                context.block_size(),
                1.0,
                InterpolationMethod::Lagrange(0),
                true,
                0.0,
                1.0,
                status.clone(),
            )?))?;
            composite.parameter_connection(
                (SELF, "trackingPositionInput"),
                ("TrackingListenerCompensation", "positionInput"),
            );
            composite.parameter_connection(
                ("TrackingListenerCompensation", "delayOutput"),
                ("ListenerGainDelayCompensation", "delayInput"),
            );
            composite.parameter_connection(
                ("TrackingListenerCompensation", "gainOutput"),
                ("ListenerGainDelayCompensation", "gainInput"),
            );
            composite.audio_connection(
                ("DirectDiffuseMixer", "out"),
                ("ListenerGainDelayCompensation", "in"),
            );
            ("ListenerGainDelayCompensation", "out")
        } else {
            ("DirectDiffuseMixer", "out")
        };

        // Subwoofer mixing.
        if num_subwoofers > 0 {
            let mut subwoofer_gains =
                AlignedMatrix::new(num_subwoofers, num_speakers, context.alignment());
            for (row, weights) in array.subwoofer_gains().iter().enumerate() {
                subwoofer_gains.row_mut(row).copy_from_slice(weights);
            }
            composite.add_component(Box::new(GainMatrix::with_initial_matrix(
                context,
                "SubwooferMixer",
                num_speakers,
                num_subwoofers,
                0,
                &subwoofer_gains,
                false,
            )?))?;
            composite.audio_connection(mix_source, ("SubwooferMixer", "in"));
        }

        // Optional output equalisation over all output signals.
        let output_eq = array.output_eq_present();
        if output_eq {
            let sections = array.output_eq_sections();
            let fs = context.sampling_frequency_hz();
            let mut coefficients = BiquadCoeffMatrix::identity(num_output_signals, sections);
            for (channel, speaker) in array.speakers().iter().enumerate() {
                let mut list = Vec::with_capacity(speaker.eq.len());
                for spec in &speaker.eq {
                    list.push(spec.to_biquad(fs)?);
                }
                coefficients.set_channel(channel, &BiquadCoeffList::from_sections(list));
            }
            composite.add_component(Box::new(BiquadIirFilter::new(
                context,
                "OutputEqualisationFilter",
                num_output_signals,
                sections,
                coefficients,
                false,
            )?))?;
            composite.audio_connection_range(
                mix_source,
                0..num_speakers,
                ("OutputEqualisationFilter", "in"),
                0..num_speakers,
            );
            if num_subwoofers > 0 {
                composite.audio_connection_range(
                    ("SubwooferMixer", "out"),
                    0..num_subwoofers,
                    ("OutputEqualisationFilter", "in"),
                    num_speakers..num_output_signals,
                );
            }
        }

        // Per-output delay/gain trims.
        let delays = array.delay_adjustments();
        let gains = array.gain_adjustments();
        let max_delay = delays.iter().copied().fold(0.0 as Sample, Sample::max);
        let mut output_adjustment = DelayVector::new(
            context,
            "OutputAdjustment",
            num_output_signals,
            context.block_size(),
            max_delay + 1.0 / context.sampling_frequency_hz(),
            InterpolationMethod::Lagrange(0),
            false,
            0.0,
            1.0,
            status.clone(),
        )?;
        output_adjustment.set_delays(&delays);
        output_adjustment.set_gains(&gains);
        composite.add_component(Box::new(output_adjustment))?;
        if output_eq {
            composite.audio_connection(
                ("OutputEqualisationFilter", "out"),
                ("OutputAdjustment", "in"),
            );
        } else {
            composite.audio_connection_range(
                mix_source,
                0..num_speakers,
                ("OutputAdjustment", "in"),
                0..num_speakers,
            );
            if num_subwoofers > 0 {
                composite.audio_connection_range(
                    ("SubwooferMixer", "out"),
                    0..num_subwoofers,
                    ("OutputAdjustment", "in"),
                    num_speakers..num_output_signals,
                );
            }
        }

        // Physical channel routing; a null source fills unmapped channels.
        let mapped = array.output_channels();
        for (signal, &channel) in mapped.iter().enumerate() {
            composite.audio_connection_range(
                ("OutputAdjustment", "out"),
                signal..signal + 1,
                (SELF, "audioOut"),
                channel..channel + 1,
            );
        }
        let unmapped: Vec<usize> = (0..config.num_outputs)
            .filter(|c| !mapped.contains(c))
            .collect();
        if !unmapped.is_empty() {
            composite.add_component(Box::new(NullSource::new(
                context,
                "NullSource",
                unmapped.len(),
            )?))?;
            for (idx, &channel) in unmapped.iter().enumerate() {
                composite.audio_connection_range(
                    ("NullSource", "out"),
                    idx..idx + 1,
                    (SELF, "audioOut"),
                    channel..channel + 1,
                );
            }
        }

        Ok(composite)
    }
}
