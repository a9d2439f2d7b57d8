//! Playback-position resolution over a published timeline.
//!
//! The [`EventSequencer`] runs on the processing thread and resolves a
//! movable, possibly loop-wrapping, possibly reversing playback position into
//! per-channel (value, gate) pairs. Timelines are published to it through a
//! [`SequencerHandle`] as whole snapshots behind an atomic pointer swap, so a
//! lookup mid-block always sees one complete sequence, never a mix of old and
//! new beats.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::sequencing::sequence::{BeatEvent, Sequence};

// Fresh channels sit just below zero so a beat at position 0.0 is crossed by
// the first forward lookup.
const PRIME_POSITION: f64 = -1e-9;

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    previous_position: f64,
    previous_value: f32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            previous_position: PRIME_POSITION,
            previous_value: 0.0,
        }
    }
}

/// Publisher side: replaces the active sequence with a full snapshot.
pub struct SequencerHandle {
    shared: Arc<ArcSwapOption<Sequence>>,
}

impl SequencerHandle {
    /// Atomically publish a new timeline. Readers mid-block keep the old one
    /// until their next lookup.
    pub fn load(&self, sequence: Sequence) {
        self.shared.store(Some(Arc::new(sequence)));
    }

    /// Remove the active timeline; lookups return cached values until a new
    /// one is loaded.
    pub fn clear(&self) {
        self.shared.store(None);
    }
}

/// Resolves playback positions into per-channel value/gate pairs.
pub struct EventSequencer {
    shared: Arc<ArcSwapOption<Sequence>>,
    channels: Vec<ChannelState>,
}

impl EventSequencer {
    /// Build a sequencer/handle pair serving `channels` channels.
    pub fn new(channels: usize) -> (Self, SequencerHandle) {
        let shared = Arc::new(ArcSwapOption::const_empty());
        let sequencer = Self {
            shared: Arc::clone(&shared),
            channels: vec![ChannelState::new(); channels],
        };
        (sequencer, SequencerHandle { shared })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Forget cached positions and values, e.g. after a transport seek.
    pub fn reset(&mut self) {
        self.channels.fill(ChannelState::new());
    }

    /// Resolve `position` for `channel` and return the channel's (value,
    /// gate) pair.
    ///
    /// Direction is inferred from the channel's cached previous position.
    /// Ascending walks cross beats in `(previous, position]` and snap the
    /// value at each start event. A descending walk over `[position,
    /// previous)` reports the last gate crossed and leaves the channel at the
    /// value a forward pass would hold at the landing position: crossing a
    /// beat downward reverts to the preceding start event, wrapping to the
    /// timeline tail when looping. When looping is enabled and the position
    /// falls outside the loop, the walk splits at the boundary and both
    /// segments are applied in time order. The only state mutated is this
    /// channel's cache, so channels never interfere within a block.
    pub fn lookup(&mut self, channel: usize, position: f64) -> (f32, f32) {
        let Some(state) = self.channels.get(channel) else {
            return (0.0, 0.0);
        };
        let mut value = state.previous_value;
        let prev = state.previous_position;

        let guard = self.shared.load();
        let Some(sequence) = guard.as_deref() else {
            return (value, 0.0);
        };

        let new_position = position * sequence.speed_multiplier();
        let mut gate = 0.0;
        let stored_position;

        let wraps = sequence.loop_enabled()
            && (new_position < 0.0 || new_position >= sequence.loop_length());

        if new_position > prev {
            if wraps {
                let length = sequence.loop_length();
                let wrapped = new_position.rem_euclid(length);
                // Head of the loop first, then the wrapped remainder. The
                // boundary beat at position 0 belongs to the second segment.
                walk_up(sequence, channel, prev, false, length, &mut value, &mut gate);
                walk_up(sequence, channel, 0.0, true, wrapped, &mut value, &mut gate);
                stored_position = wrapped;
            } else {
                walk_up(
                    sequence,
                    channel,
                    prev,
                    false,
                    new_position,
                    &mut value,
                    &mut gate,
                );
                stored_position = new_position;
            }
        } else if wraps {
            let length = sequence.loop_length();
            let wrapped = new_position.rem_euclid(length);
            // Reverse playback across the boundary: walk down to the head of
            // the loop, then from the boundary down into the tail.
            let mut crossed_start = false;
            walk_down(sequence, channel, prev, 0.0, &mut crossed_start, &mut gate);
            walk_down(sequence, channel, length, wrapped, &mut crossed_start, &mut gate);
            if crossed_start {
                if let Some(resolved) = value_at(sequence, channel, wrapped, true) {
                    value = resolved;
                }
            }
            stored_position = wrapped;
        } else {
            let mut crossed_start = false;
            walk_down(
                sequence,
                channel,
                prev,
                new_position,
                &mut crossed_start,
                &mut gate,
            );
            if crossed_start {
                if let Some(resolved) =
                    value_at(sequence, channel, new_position, sequence.loop_enabled())
                {
                    value = resolved;
                }
            }
            stored_position = new_position;
        }

        let state = &mut self.channels[channel];
        state.previous_position = stored_position;
        state.previous_value = value;
        (value, gate)
    }
}

/// Walk beats ascending through `(lower, upper]` (or `[lower, upper]` when
/// `lower_inclusive`), applying each crossed event for `channel`.
fn walk_up(
    sequence: &Sequence,
    channel: usize,
    lower: f64,
    lower_inclusive: bool,
    upper: f64,
    value: &mut f32,
    gate: &mut f32,
) {
    let beats = sequence.beats();
    let start = if lower_inclusive {
        beats.partition_point(|b| b.position < lower)
    } else {
        beats.partition_point(|b| b.position <= lower)
    };
    for beat in &beats[start..] {
        if beat.position > upper {
            break;
        }
        apply(beat.event_for(channel), value, gate);
    }
}

/// Walk beats descending through `[lower, upper)`, remembering the last gate
/// seen and whether a start event for `channel` was crossed. Crossing a start
/// event downward un-does it, so the caller re-resolves the value at the
/// landing position instead of taking values from the walk.
fn walk_down(
    sequence: &Sequence,
    channel: usize,
    upper: f64,
    lower: f64,
    crossed_start: &mut bool,
    gate: &mut f32,
) {
    let beats = sequence.beats();
    // Bisection lands on the first beat at/after `upper`; one step back is
    // the start of the reverse walk.
    let start = beats.partition_point(|b| b.position < upper);
    for beat in beats[..start].iter().rev() {
        if beat.position < lower {
            break;
        }
        if let Some(event) = beat.event_for(channel) {
            if event.gate != 0.0 {
                *gate = event.gate;
                if event.gate > 0.0 {
                    *crossed_start = true;
                }
            }
        }
    }
}

/// The value in effect at `position`: the nearest start event for `channel`
/// at or below it, wrapping around to the timeline tail when `wrap` is set.
/// `None` when no start event governs the position.
fn value_at(sequence: &Sequence, channel: usize, position: f64, wrap: bool) -> Option<f32> {
    let beats = sequence.beats();
    let end = beats.partition_point(|b| b.position <= position);
    for beat in beats[..end].iter().rev() {
        if let Some(event) = beat.event_for(channel) {
            if event.gate > 0.0 {
                return Some(event.value);
            }
        }
    }
    if wrap {
        for beat in beats[end..].iter().rev() {
            if let Some(event) = beat.event_for(channel) {
                if event.gate > 0.0 {
                    return Some(event.value);
                }
            }
        }
    }
    None
}

fn apply(event: Option<&BeatEvent>, value: &mut f32, gate: &mut f32) {
    let Some(event) = event else { return };
    if event.gate == 0.0 {
        return;
    }
    // Only a start gate forces the value; release gates modulate the gate
    // output while the value holds.
    if event.gate > 0.0 {
        *value = event.value;
    }
    *gate = event.gate;
}
