//! End-to-end renderer scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use sf_core::{Sample, SignalFlowContext, StatusSink};
use sf_num::AlignedMatrix;
use sf_objects::{
    AudioObject, CartesianPosition, DiscreteReflection, LateReverb, ObjectPayload, ObjectVector,
};
use sf_panning::LoudspeakerArray;
use sf_render::{BaselineRenderer, CoreRendererConfig, decorrelation};
use sf_reverb::ReverbRendererConfig;

const BLOCK: usize = 64;
const FS: u32 = 48000;

fn context() -> SignalFlowContext {
    let _ = env_logger::builder().is_test(true).try_init();
    SignalFlowContext::new(BLOCK, FS).unwrap()
}

fn impulse_filters(rows: usize, alignment: usize) -> AlignedMatrix<Sample> {
    let mut filters = AlignedMatrix::new(rows, 8, alignment);
    for row in 0..rows {
        filters.row_mut(row)[0] = 1.0;
    }
    filters
}

fn stereo_config(num_inputs: usize) -> CoreRendererConfig {
    let array = LoudspeakerArray::stereo(30.0).unwrap();
    CoreRendererConfig {
        diffusion_filters: impulse_filters(array.num_regular_speakers(), 8),
        array,
        num_inputs,
        num_outputs: 2,
        interpolation_steps: BLOCK,
        object_eq_sections: 1,
        listener_tracking: false,
        frequency_dependent_panning: false,
        hoa: None,
        reverb: None,
    }
}

fn point_source(id: u32, channel: usize, position: CartesianPosition) -> AudioObject {
    AudioObject::new(id, channel, 1.0, ObjectPayload::PointSource { position })
}

fn run_blocks(
    renderer: &mut BaselineRenderer,
    inputs: &[Vec<Sample>],
    blocks: usize,
) -> Vec<Vec<Sample>> {
    let outputs_count = renderer.num_output_channels();
    let mut collected = vec![Vec::new(); outputs_count];
    for block in 0..blocks {
        let input_slices: Vec<&[Sample]> = inputs
            .iter()
            .map(|channel| &channel[block * BLOCK..(block + 1) * BLOCK])
            .collect();
        let mut output_buffers = vec![vec![0.0 as Sample; BLOCK]; outputs_count];
        let mut output_slices: Vec<&mut [Sample]> = output_buffers
            .iter_mut()
            .map(|channel| channel.as_mut_slice())
            .collect();
        renderer
            .process_block(&input_slices, &mut output_slices)
            .unwrap();
        for (sink, produced) in collected.iter_mut().zip(&output_buffers) {
            sink.extend_from_slice(produced);
        }
    }
    collected
}

fn sine(frequency: Sample, samples: usize) -> Vec<Sample> {
    (0..samples)
        .map(|n| {
            (2.0 * core::f64::consts::PI as Sample * frequency * n as Sample / FS as Sample).sin()
        })
        .collect()
}

#[test]
fn centre_point_source_on_stereo_pair() {
    let (mut renderer, _scene_tx, _) =
        BaselineRenderer::new(context(), &stereo_config(1), StatusSink::new()).unwrap();
    let scene: ObjectVector = [point_source(1, 0, CartesianPosition::new(1.0, 0.0, 0.0))]
        .into_iter()
        .collect();
    renderer.set_scene(scene);

    let blocks = 6;
    let input = sine(1000.0, blocks * BLOCK);
    let outputs = run_blocks(&mut renderer, &[input.clone()], blocks);

    // After the gain transition both loudspeakers carry the source at
    // 0.5 * sqrt(2).
    let expected_gain = (0.5f64).sqrt() as Sample;
    for channel in 0..2 {
        for n in 3 * BLOCK..blocks * BLOCK {
            let expected = expected_gain * input[n];
            assert!(
                (outputs[channel][n] - expected).abs() < 1e-4,
                "channel {channel}, sample {n}: {} vs {expected}",
                outputs[channel][n]
            );
        }
    }
}

#[test]
fn plane_wave_at_ninety_degrees_on_surround_array() {
    let array = LoudspeakerArray::itu_50().unwrap();
    let num_speakers = array.num_regular_speakers();
    let config = CoreRendererConfig {
        diffusion_filters: impulse_filters(num_speakers, 8),
        array,
        num_inputs: 1,
        num_outputs: num_speakers,
        interpolation_steps: BLOCK,
        object_eq_sections: 1,
        listener_tracking: false,
        frequency_dependent_panning: false,
        hoa: None,
        reverb: None,
    };
    let (mut renderer, _scene_tx, _) =
        BaselineRenderer::new(context(), &config, StatusSink::new()).unwrap();
    let scene: ObjectVector = [AudioObject::new(
        1,
        0,
        1.0,
        ObjectPayload::PlaneWave {
            azimuth_deg: 90.0,
            elevation_deg: 0.0,
            reference_distance: 1.0,
        },
    )]
    .into_iter()
    .collect();
    renderer.set_scene(scene);

    let blocks = 6;
    let input = vec![1.0 as Sample; blocks * BLOCK];
    let outputs = run_blocks(&mut renderer, &[input], blocks);

    let energy: Vec<f64> = outputs
        .iter()
        .map(|channel| {
            channel[3 * BLOCK..]
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum()
        })
        .collect();
    // Channel order: L R C Ls Rs. The +90 degree wave sits between L and
    // Ls; everything on the right stays silent.
    assert!(energy[0] > 1e-6, "L silent: {energy:?}");
    assert!(energy[3] > 1e-6, "Ls silent: {energy:?}");
    assert!(energy[1] < 1e-12, "R active: {energy:?}");
    assert!(energy[2] < 1e-12, "C active: {energy:?}");
    assert!(energy[4] < 1e-12, "Rs active: {energy:?}");
}

#[test]
fn reverb_objects_sharing_a_channel_keep_only_the_first() {
    let mut config = stereo_config(2);
    config.reverb = Some(ReverbRendererConfig {
        max_objects: 2,
        discrete_reflections_per_object: 2,
        late_length_seconds: 0.05,
        interpolation_steps: BLOCK,
        ..ReverbRendererConfig::default()
    });
    let status = StatusSink::new();
    let messages: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = messages.clone();
    status.set_callback(Box::new(move |message| {
        sink.borrow_mut().push(message.text.clone());
    }));

    let (mut renderer, _scene_tx, _) =
        BaselineRenderer::new(context(), &config, status).unwrap();

    let mut late = LateReverb::silent();
    late.levels[0] = 0.4;
    late.decay_coeffs[0] = 10.0;
    let reverb_payload = |pos: CartesianPosition| ObjectPayload::PointSourceWithReverb {
        position: pos,
        discrete_reflections: vec![DiscreteReflection::new(pos, 0.005, 0.5)],
        late_reverb: late.clone(),
    };
    let scene: ObjectVector = [
        AudioObject::new(10, 0, 1.0, reverb_payload(CartesianPosition::new(1.0, 0.1, 0.0))),
        AudioObject::new(11, 0, 1.0, reverb_payload(CartesianPosition::new(1.0, -0.1, 0.0))),
    ]
    .into_iter()
    .collect();
    renderer.set_scene(scene);

    let input = vec![vec![1.0 as Sample; 2 * BLOCK]; 2];
    run_blocks(&mut renderer, &input, 2);

    assert!(renderer.counters().invalid_objects >= 1);
    assert!(
        messages
            .borrow()
            .iter()
            .any(|m| m.contains("11") && m.contains("dropped")),
        "no diagnostic names the dropped object: {:?}",
        messages.borrow()
    );
}

#[test]
fn renderer_output_is_deterministic() {
    let build = || {
        let mut config = stereo_config(2);
        config.diffusion_filters =
            decorrelation::default_filters(2, decorrelation::DEFAULT_LENGTH, 1.0, 8).unwrap();
        BaselineRenderer::new(context(), &config, StatusSink::new()).unwrap()
    };
    let scene = || -> ObjectVector {
        [
            point_source(1, 0, CartesianPosition::new(1.0, 0.2, 0.0)),
            AudioObject::new(
                2,
                1,
                0.8,
                ObjectPayload::PointSourceWithDiffuseness {
                    position: CartesianPosition::new(1.0, -0.3, 0.0),
                    diffuseness: 0.4,
                },
            ),
        ]
        .into_iter()
        .collect()
    };

    let (mut renderer_a, _tx_a, _) = build();
    let (mut renderer_b, _tx_b, _) = build();
    renderer_a.set_scene(scene());
    renderer_b.set_scene(scene());

    let blocks = 5;
    let inputs = vec![sine(440.0, blocks * BLOCK), sine(997.0, blocks * BLOCK)];
    let out_a = run_blocks(&mut renderer_a, &inputs, blocks);
    let out_b = run_blocks(&mut renderer_b, &inputs, blocks);
    assert_eq!(out_a, out_b);
}

#[test]
fn scene_updates_cross_threads() {
    let (mut renderer, mut scene_tx, _) =
        BaselineRenderer::new(context(), &stereo_config(1), StatusSink::new()).unwrap();
    let handle = std::thread::spawn(move || {
        let scene: ObjectVector = [point_source(
            1,
            0,
            CartesianPosition::new(1.0, 0.0, 0.0),
        )]
        .into_iter()
        .collect();
        assert!(scene_tx.send(scene));
    });
    handle.join().unwrap();

    let blocks = 4;
    let input = vec![1.0 as Sample; blocks * BLOCK];
    let outputs = run_blocks(&mut renderer, &[input], blocks);
    let energy: f64 = outputs[0][3 * BLOCK..]
        .iter()
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    assert!(energy > 0.1, "scene update never reached the renderer");
}
