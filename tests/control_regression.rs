#![cfg(feature = "rtrb")]

//! End-to-end exercise of the composed control plane: commands flow through
//! the SPSC queue into the voice pool, pool gates drive per-voice envelopes,
//! and the sequencer resolves a moving transport alongside.

use std::thread;

use notegate::dsp::{CurveKind, Envelope, EnvelopeParams, EnvelopeStage};
use notegate::sequencing::{EventSequencer, Sequence};
use notegate::synth::ControlPlane;

const BLOCK_SIZE: usize = 64;

fn params() -> EnvelopeParams {
    EnvelopeParams {
        curve: CurveKind::Linear,
        attack_time: 16.0,
        attack_target: 1.0,
        decay_time: 16.0,
        sustain_target: 0.7,
        release_time: 32.0,
        release_target: 0.0,
    }
}

/// Run one block: drain the queue, then step every voice's envelope with the
/// pool's gate edge applied on the first frame.
fn run_block(plane: &mut ControlPlane, envelopes: &mut [Envelope]) -> Vec<f32> {
    plane.begin_block();
    let gates: Vec<f32> = plane.pool().gates().to_vec();
    let mut last = vec![0.0; envelopes.len()];
    for frame in 0..BLOCK_SIZE {
        for (voice, env) in envelopes.iter_mut().enumerate() {
            let gate = if frame == 0 { gates[voice] } else { 0.0 };
            last[voice] = env.step(gate, &params());
        }
    }
    last
}

#[test]
fn notes_from_another_thread_shape_voice_envelopes() {
    let (mut plane, mut handle) = ControlPlane::new(4);
    let mut envelopes = vec![Envelope::new(); 4];

    // Control arrives from a producer thread, as it would from a decoder.
    let sender = thread::spawn(move || {
        handle.note_on(60.0, 0.9);
        handle.note_on(64.0, 0.7);
        handle
    });
    let mut handle = sender.join().unwrap();

    let values = run_block(&mut plane, &mut envelopes);
    assert_eq!(plane.pool().slots()[0].note, 60.0);
    assert_eq!(plane.pool().slots()[1].note, 64.0);
    // 64 frames cover attack and decay; both voices sit at sustain.
    assert_eq!(values[0], 0.7);
    assert_eq!(values[1], 0.7);
    assert_eq!(values[2], 0.0, "untriggered voice stays silent");

    handle.note_off(60.0, 0.5);
    let values = run_block(&mut plane, &mut envelopes);
    assert_eq!(envelopes[0].stage(), EnvelopeStage::Finished);
    assert_eq!(values[0], 0.0);
    assert_eq!(values[1], 0.7, "other voices are unaffected by the release");
}

#[test]
fn stealing_keeps_the_block_consistent() {
    let (mut plane, mut handle) = ControlPlane::new(2);
    let mut envelopes = vec![Envelope::new(); 2];

    handle.note_on(60.0, 0.8);
    handle.note_on(62.0, 0.8);
    run_block(&mut plane, &mut envelopes);

    // A third note steals the first voice and re-gates it.
    handle.note_on(64.0, 0.8);
    plane.begin_block();
    assert_eq!(plane.pool().slots()[0].note, 64.0);
    assert_eq!(plane.pool().gates()[0], 1.0);

    let notes: Vec<f32> = plane.pool().slots().iter().map(|s| s.note).collect();
    assert_eq!(notes, vec![64.0, 62.0]);
}

#[test]
fn sequencer_gate_can_drive_an_envelope() {
    let sequence = Sequence::builder()
        .beat(0.0)
        .event(0, 0.9, 1.0)
        .beat(2.0)
        .event(0, 0.0, -1.0)
        .looping(8.0)
        .build()
        .unwrap();
    let (mut sequencer, handle) = EventSequencer::new(1);
    handle.load(sequence);

    let mut env = Envelope::new();
    let mut position = 0.0;
    let step = 4.0 / (BLOCK_SIZE as f64 * 2.0);

    let mut peak = 0.0f32;
    let mut value = 0.0f32;
    for _ in 0..BLOCK_SIZE * 2 {
        position += step;
        let (_, gate) = sequencer.lookup(0, position);
        value = env.step(gate, &params());
        peak = peak.max(value);
    }

    // The beat at 0 gated the envelope on; the beat at 2 released it.
    assert!(peak >= 0.7, "envelope must have opened, peak {peak}");
    assert_eq!(value, 0.0, "release beat must have closed it by the loop end");
    assert_eq!(env.stage(), EnvelopeStage::Finished);
}
