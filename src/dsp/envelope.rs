//! Gate-driven five-stage envelope generator.
//!
//! The envelope is evaluated once per output frame. It is driven by a gate
//! signal (`> 0` triggers Attack, `< 0` requests Release, `0` holds) together
//! with per-stage targets and durations supplied on every call, so a host can
//! modulate envelope parameters without touching the generator's state.
//!
//! Two curve families are supported:
//!
//!   Linear        value' = value + (target - origin) / duration
//!   Exponential   value' = target - e^(-PI/duration) * (target - value)
//!
//! The exponential recurrence converges to within `e^(-PI)` (about 4.3%) of
//! its target after `duration` frames. A new attack gate never snaps the
//! output: the current value becomes the curve's starting point and a
//! closed-form inverse recovers the elapsed-time parameter, so a retriggered
//! attack still completes at its nominal duration.
//!
//! All state transitions are pure per-frame numeric steps. The only hard
//! requirements are termination (the fall-through loop is capped at one pass
//! through all five stages per frame) and boundedness (non-finite results are
//! normalized before being stored).

use std::f32::consts::PI;
use std::num::FpCategory;

/// The current stage of the envelope state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Finished, // No gate held, envelope at rest
    Attack,   // Ramping toward the attack target
    Decay,    // Ramping from the attack target to the sustain target
    Sustain,  // Holding the sustain target while the gate is high
    Release,  // Ramping toward the release target
}

/// Curve family used for the ramping stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Linear,
    Exponential,
}

/// Per-stage targets and durations, supplied on every `step` call.
///
/// Durations are measured in frames. A duration of zero (or less) makes the
/// stage snap to its target and fall through to the next stage within the
/// same frame.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeParams {
    pub curve: CurveKind,
    pub attack_time: f32,
    pub attack_target: f32,
    pub decay_time: f32,
    pub sustain_target: f32,
    pub release_time: f32,
    pub release_target: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            curve: CurveKind::Linear,
            attack_time: 0.0,
            attack_target: 1.0,
            decay_time: 0.0,
            sustain_target: 1.0,
            release_time: 0.0,
            release_target: 0.0,
        }
    }
}

/// One envelope instance, typically owned per voice.
#[derive(Debug, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    value: f32,
    // Frames elapsed in the current stage. Retriggers initialize this with
    // the inverse-time formulas rather than zero.
    stage_time: f32,
    // Value the current stage started from; anchors the linear slope and the
    // retrigger inverses.
    origin: f32,
    release_requested: bool,
}

const STAGE_COUNT: usize = 5;

impl Envelope {
    pub fn new() -> Self {
        Self {
            stage: EnvelopeStage::Finished,
            value: 0.0,
            stage_time: 0.0,
            origin: 0.0,
            release_requested: false,
        }
    }

    /// Advance the envelope by one frame and return the new value.
    pub fn step(&mut self, gate: f32, params: &EnvelopeParams) -> f32 {
        if gate > 0.0 {
            self.trigger_attack(params);
        } else if gate < 0.0 {
            self.release_requested = true;
        }

        // Re-evaluate while the stage just changed, capped at one pass
        // through all five stages per frame so termination is obvious.
        let mut produced = false;
        for _ in 0..STAGE_COUNT {
            if self.release_requested
                && matches!(
                    self.stage,
                    EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain
                )
            {
                self.release_requested = false;
                self.enter(EnvelopeStage::Release);
            }

            let (target, duration) = match self.stage {
                EnvelopeStage::Finished => break,
                EnvelopeStage::Sustain => {
                    self.value = params.sustain_target;
                    break;
                }
                EnvelopeStage::Attack => (params.attack_target, params.attack_time),
                EnvelopeStage::Decay => (params.sustain_target, params.decay_time),
                EnvelopeStage::Release => (params.release_target, params.release_time),
            };

            if duration <= 0.0 {
                // Zero-length stage: snap and fall through.
                self.value = target;
                produced = true;
                self.advance();
                continue;
            }

            if produced {
                // A snap earlier in this frame already set the output; the
                // first real frame of this stage happens on the next call.
                break;
            }

            let completed = self.curve_step(params.curve, target, duration);
            produced = true;
            if completed {
                self.advance();
            } else {
                break;
            }
        }

        self.value = normalize(self.value);
        self.value
    }

    /// Current output value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Current stage of the state machine.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Whether the envelope is producing a moving or held value.
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Finished
    }

    /// Return to rest without ramping down.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Finished;
        self.value = 0.0;
        self.stage_time = 0.0;
        self.origin = 0.0;
        self.release_requested = false;
    }

    /// Begin (or re-aim) the attack stage from the current value.
    ///
    /// The nominal curve is anchored at the origin of the interrupted stage;
    /// the inverse-time formulas place the current value on that curve so the
    /// attack completes at its nominal duration. When the current value does
    /// not lie on the nominal curve (span of zero, value at or past the
    /// target) the attack restarts from the current value instead.
    fn trigger_attack(&mut self, params: &EnvelopeParams) {
        self.release_requested = false;

        let anchor = self.origin;
        let target = params.attack_target;
        let duration = params.attack_time.max(0.0);

        let elapsed = match params.curve {
            CurveKind::Linear => {
                let span = target - anchor;
                let progress = (self.value - anchor) / span;
                if progress.is_finite() && (0.0..1.0).contains(&progress) {
                    Some(duration * progress)
                } else {
                    None
                }
            }
            CurveKind::Exponential => {
                // Remaining-gap ratio relative to the full nominal gap.
                let ratio = (target - self.value) / (target - anchor);
                if ratio.is_finite() && ratio > 0.0 && ratio <= 1.0 {
                    Some((-duration * ratio.ln() / PI).clamp(0.0, duration))
                } else {
                    None
                }
            }
        };

        self.stage = EnvelopeStage::Attack;
        match elapsed {
            Some(t) => {
                self.origin = anchor;
                self.stage_time = t;
            }
            None => {
                self.origin = self.value;
                self.stage_time = 0.0;
            }
        }
    }

    /// One frame of curve motion toward `target`. Returns true when the stage
    /// completed this frame, either by crossing the target or by reaching the
    /// nominal duration.
    fn curve_step(&mut self, curve: CurveKind, target: f32, duration: f32) -> bool {
        let prev = self.value;
        let next = match curve {
            CurveKind::Linear => prev + (target - self.origin) / duration,
            CurveKind::Exponential => target - (-PI / duration).exp() * (target - prev),
        };
        self.stage_time += 1.0;

        // Overshoot: the sign of (target - value) flipped, or the value
        // landed exactly on the target.
        let crossed = (target - next) * (target - prev) <= 0.0;
        let timed_out = self.stage_time >= duration;

        if crossed || (timed_out && curve == CurveKind::Linear) {
            self.value = target;
            true
        } else if timed_out {
            // Exponential stages end within e^(-PI) of the target; the next
            // stage continues from the value actually reached.
            self.value = next;
            true
        } else {
            self.value = next;
            false
        }
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.origin = self.value;
        self.stage_time = 0.0;
    }

    fn advance(&mut self) {
        match self.stage {
            EnvelopeStage::Attack => self.enter(EnvelopeStage::Decay),
            EnvelopeStage::Decay => self.enter(EnvelopeStage::Sustain),
            EnvelopeStage::Release => self.enter(EnvelopeStage::Finished),
            EnvelopeStage::Sustain | EnvelopeStage::Finished => {}
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a recurrence result back into the finite, normal range so a single
/// malformed input cannot permanently poison the envelope state.
fn normalize(value: f32) -> f32 {
    match value.classify() {
        FpCategory::Nan => 0.0,
        FpCategory::Infinite => {
            if value > 0.0 {
                f32::MAX
            } else {
                f32::MIN
            }
        }
        FpCategory::Subnormal => 0.0,
        FpCategory::Zero | FpCategory::Normal => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(attack: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeParams {
        EnvelopeParams {
            curve: CurveKind::Linear,
            attack_time: attack,
            attack_target: 1.0,
            decay_time: decay,
            sustain_target: sustain,
            release_time: release,
            release_target: 0.0,
        }
    }

    #[test]
    fn zero_duration_attack_snaps_same_call() {
        let mut env = Envelope::new();
        let params = linear(0.0, 10.0, 0.5, 10.0);

        let value = env.step(1.0, &params);

        assert_eq!(value, 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn all_zero_durations_reach_sustain_in_one_frame() {
        let mut env = Envelope::new();
        let params = linear(0.0, 0.0, 0.6, 0.0);

        let value = env.step(1.0, &params);

        assert_eq!(value, 0.6);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn linear_attack_hits_target_after_exact_duration() {
        let mut env = Envelope::new();
        let params = linear(10.0, 20.0, 0.5, 10.0);

        let mut value = env.step(1.0, &params);
        for _ in 0..9 {
            value = env.step(0.0, &params);
        }

        assert_eq!(value, 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn sustain_is_idempotent() {
        let mut env = Envelope::new();
        let params = linear(0.0, 0.0, 0.7, 10.0);
        env.step(1.0, &params);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);

        for _ in 0..100 {
            assert_eq!(env.step(0.0, &params), 0.7);
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn exponential_attack_lands_within_tolerance_at_duration() {
        let mut env = Envelope::new();
        let params = EnvelopeParams {
            curve: CurveKind::Exponential,
            attack_time: 100.0,
            attack_target: 1.0,
            decay_time: 50.0,
            sustain_target: 0.5,
            release_time: 50.0,
            release_target: 0.0,
        };

        let mut value = env.step(1.0, &params);
        for _ in 0..99 {
            value = env.step(0.0, &params);
        }

        let expected = 1.0 - (-PI).exp();
        assert!(
            (value - expected).abs() < 1e-3,
            "value {value} should land within e^-PI of the target"
        );
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn release_gate_interrupts_attack() {
        let mut env = Envelope::new();
        let params = linear(10.0, 10.0, 0.5, 4.0);

        env.step(1.0, &params);
        env.step(0.0, &params);
        let before = env.value();

        let after = env.step(-1.0, &params);
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert!(after < before);

        for _ in 0..4 {
            env.step(0.0, &params);
        }
        assert_eq!(env.stage(), EnvelopeStage::Finished);
        assert_eq!(env.value(), 0.0);
    }

    #[test]
    fn retrigger_mid_release_continues_smoothly() {
        let mut env = Envelope::new();
        let params = linear(10.0, 10.0, 0.5, 20.0);

        // Run the attack to completion, then release part way down.
        env.step(1.0, &params);
        for _ in 0..9 {
            env.step(0.0, &params);
        }
        env.step(-1.0, &params);
        for _ in 0..7 {
            env.step(0.0, &params);
        }
        let resume_from = env.value();
        assert!(resume_from > 0.0 && resume_from < 1.0);

        // The retriggered attack resumes from the current value and keeps
        // moving toward the target without snapping.
        let value = env.step(1.0, &params);
        assert_eq!(env.stage(), EnvelopeStage::Attack);
        assert!(value >= resume_from);
        assert!(value - resume_from <= 0.11, "no snap on retrigger");

        // It still completes by the nominal duration.
        let mut steps = 0;
        while env.stage() == EnvelopeStage::Attack {
            env.step(0.0, &params);
            steps += 1;
            assert!(steps <= 10, "retriggered attack must finish within the nominal duration");
        }
        assert_eq!(env.value(), 1.0);
    }

    #[test]
    fn overshoot_clamps_to_target() {
        let mut env = Envelope::new();
        let slow = linear(10.0, 10.0, 0.5, 10.0);
        let fast = linear(4.0, 10.0, 0.5, 10.0);

        // Nine frames of the slow attack, then a steeper slope that would
        // step past the target.
        env.step(1.0, &slow);
        for _ in 0..8 {
            env.step(0.0, &slow);
        }
        let value = env.step(0.0, &fast);

        assert_eq!(value, 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn non_finite_results_are_normalized() {
        let mut env = Envelope::new();
        let mut params = linear(10.0, 10.0, 0.5, 10.0);
        params.attack_target = f32::NAN;

        let value = env.step(1.0, &params);
        assert_eq!(value, 0.0);

        params.attack_target = f32::INFINITY;
        let value = env.step(0.0, &params);
        assert!(value.is_finite());
    }

    #[test]
    fn finished_envelope_holds_gate_zero() {
        let mut env = Envelope::new();
        let params = linear(5.0, 5.0, 0.5, 5.0);
        for _ in 0..10 {
            assert_eq!(env.step(0.0, &params), 0.0);
        }
        assert_eq!(env.stage(), EnvelopeStage::Finished);
    }
}
