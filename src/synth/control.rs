//! Cross-thread front end for the voice pool.
//!
//! The [`ControlPlane`] lives on the processing thread and owns the pool; the
//! paired [`ControlHandle`] lives wherever control originates (a protocol
//! decoder, a UI). The two sides communicate over a bounded SPSC ring buffer,
//! so the processing thread never waits on a lock.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::synth::message::ControlMessage;
use crate::synth::pool::{PoolError, VoiceMode, VoicePool};

const CONTROL_QUEUE_SIZE: usize = 256;

/// Producer side of the control queue.
pub struct ControlHandle {
    tx: Producer<ControlMessage>,
}

impl ControlHandle {
    /// Push a message, dropping it if the queue is full. A full queue means
    /// the processing thread is not draining; blocking here would stall the
    /// sender instead.
    pub fn send(&mut self, message: ControlMessage) {
        let _ = self.tx.push(message);
    }

    pub fn note_on(&mut self, note: f32, velocity: f32) {
        self.send(ControlMessage::NoteOn { note, velocity });
    }

    pub fn note_off(&mut self, note: f32, velocity: f32) {
        self.send(ControlMessage::NoteOff { note, velocity });
    }

    pub fn pressure(&mut self, note: f32, pressure: f32) {
        self.send(ControlMessage::Pressure { note, pressure });
    }

    pub fn set_voice_count(&mut self, count: usize) {
        self.send(ControlMessage::SetVoiceCount(count));
    }

    pub fn set_mode(&mut self, mode: VoiceMode) {
        self.send(ControlMessage::SetMode(mode));
    }

    pub fn all_notes_off(&mut self) {
        self.send(ControlMessage::AllNotesOff);
    }
}

/// Processing-thread side: owns the pool, drains the queue once per block.
pub struct ControlPlane {
    pool: VoicePool,
    rx: Consumer<ControlMessage>,
    // A resize that failed while draining; the pool is untouched in that
    // case, and the error is held for the next `take_error` call.
    error: Option<PoolError>,
}

impl ControlPlane {
    /// Build a plane/handle pair with a pool of `voices` slots.
    pub fn new(voices: usize) -> (Self, ControlHandle) {
        let (tx, rx) = RingBuffer::<ControlMessage>::new(CONTROL_QUEUE_SIZE);
        let plane = Self {
            pool: VoicePool::new(voices),
            rx,
            error: None,
        };
        (plane, ControlHandle { tx })
    }

    /// Build a plane/handle pair with the crate-default voice count.
    pub fn with_defaults() -> (Self, ControlHandle) {
        Self::new(crate::DEFAULT_VOICE_COUNT)
    }

    /// Clear the previous block's gate edges and apply every queued control
    /// message. Called once at the start of each block, before any per-frame
    /// work.
    pub fn begin_block(&mut self) {
        self.pool.clear_gates();
        while let Ok(message) = self.rx.pop() {
            self.apply(message);
        }
    }

    /// Apply one control message directly. Same-thread callers can use this
    /// instead of the queue.
    pub fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::NoteOn { note, velocity } => {
                self.pool.start(note, velocity);
            }
            ControlMessage::NoteOff { note, velocity } => {
                self.pool.stop(note, velocity);
            }
            ControlMessage::Pressure { note, pressure } => {
                self.pool.set_pressure(note, pressure);
            }
            ControlMessage::SetVoiceCount(count) => {
                if let Err(err) = self.pool.resize(count) {
                    self.error = Some(err);
                }
            }
            ControlMessage::SetMode(mode) => self.pool.set_mode(mode),
            ControlMessage::AllNotesOff => self.pool.all_notes_off(),
        }
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut VoicePool {
        &mut self.pool
    }

    /// Error from a queued command that could not be applied, if any. The
    /// prior configuration stays live when this is set.
    pub fn take_error(&mut self) -> Option<PoolError> {
        self.error.take()
    }
}
