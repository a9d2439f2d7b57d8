use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One channel's event at a beat.
///
/// `gate` follows the engine-wide convention: positive starts (and snaps the
/// channel value), negative releases, zero is inert.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub channel: usize,
    pub value: f32,
    pub gate: f32,
}

/// A time position in the sequence holding sparse per-channel events.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Beat {
    pub position: f64,
    pub events: Vec<BeatEvent>,
}

impl Beat {
    /// The event this beat carries for `channel`, if any.
    pub fn event_for(&self, channel: usize) -> Option<&BeatEvent> {
        self.events.iter().find(|e| e.channel == channel)
    }
}

/// A pre-authored, ascending-sorted event timeline.
///
/// A `Sequence` is immutable once constructed; the sequencer publishes
/// replacements wholesale, so readers never observe a half-updated timeline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    beats: Vec<Beat>,
    loop_length: f64,
    speed_multiplier: f64,
    loop_enabled: bool,
}

impl Sequence {
    /// Normalize an already-parsed beat list into a sequence: looping
    /// sequences fold positions into `[0, loop_length)`, beats are sorted by
    /// position, and equal positions are merged with later events winning per
    /// channel.
    pub fn new(
        mut beats: Vec<Beat>,
        loop_length: f64,
        loop_enabled: bool,
        speed_multiplier: f64,
    ) -> Result<Self, SequenceError> {
        for beat in &beats {
            if !beat.position.is_finite() {
                return Err(SequenceError::NonFinitePosition {
                    position: beat.position,
                });
            }
        }
        if loop_enabled && loop_length <= 0.0 {
            return Err(SequenceError::NonPositiveLoopLength {
                length: loop_length,
            });
        }

        if loop_enabled {
            // Fold authored positions into `[0, loop_length)` so a beat at
            // exactly the loop length merges with the loop head instead of
            // firing both at the boundary and again at zero on every wrap.
            for beat in &mut beats {
                beat.position = beat.position.rem_euclid(loop_length);
            }
        }

        beats.sort_by(|a, b| {
            a.position
                .partial_cmp(&b.position)
                .unwrap_or(Ordering::Equal)
        });

        let mut merged: Vec<Beat> = Vec::with_capacity(beats.len());
        for beat in beats {
            match merged.last_mut() {
                Some(last) if last.position == beat.position => {
                    for event in beat.events {
                        match last.events.iter_mut().find(|e| e.channel == event.channel) {
                            Some(existing) => *existing = event,
                            None => last.events.push(event),
                        }
                    }
                }
                _ => merged.push(beat),
            }
        }

        Ok(Self {
            beats: merged,
            loop_length,
            speed_multiplier,
            loop_enabled,
        })
    }

    /// Start a fluent builder for hand-authored sequences.
    pub fn builder() -> SequenceBuilder {
        SequenceBuilder::new()
    }

    /// Beats in strictly ascending position order.
    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn loop_length(&self) -> f64 {
        self.loop_length
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }
}

/// Builder for constructing sequences with a fluent API.
pub struct SequenceBuilder {
    beats: Vec<Beat>,
    loop_length: f64,
    loop_enabled: bool,
    speed_multiplier: f64,
}

impl SequenceBuilder {
    fn new() -> Self {
        Self {
            beats: Vec::new(),
            loop_length: 0.0,
            loop_enabled: false,
            speed_multiplier: 1.0,
        }
    }

    /// Open a new beat at `position`; subsequent `event` calls attach to it.
    pub fn beat(mut self, position: f64) -> Self {
        self.beats.push(Beat {
            position,
            events: Vec::new(),
        });
        self
    }

    /// Add an event to the most recently opened beat.
    pub fn event(mut self, channel: usize, value: f32, gate: f32) -> Self {
        if let Some(beat) = self.beats.last_mut() {
            beat.events.push(BeatEvent {
                channel,
                value,
                gate,
            });
        }
        self
    }

    /// Enable looping with the given loop length.
    pub fn looping(mut self, length: f64) -> Self {
        self.loop_enabled = true;
        self.loop_length = length;
        self
    }

    /// Scale factor applied to transport positions during lookup.
    pub fn speed(mut self, multiplier: f64) -> Self {
        self.speed_multiplier = multiplier;
        self
    }

    pub fn build(self) -> Result<Sequence, SequenceError> {
        Sequence::new(
            self.beats,
            self.loop_length,
            self.loop_enabled,
            self.speed_multiplier,
        )
    }
}

/// Errors that can occur when normalizing a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceError {
    /// Looping was requested with a zero or negative loop length.
    NonPositiveLoopLength { length: f64 },
    /// A beat position was NaN or infinite.
    NonFinitePosition { position: f64 },
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::NonPositiveLoopLength { length } => {
                write!(f, "loop length must be positive, got {length}")
            }
            SequenceError::NonFinitePosition { position } => {
                write!(f, "beat position must be finite, got {position}")
            }
        }
    }
}

impl std::error::Error for SequenceError {}
