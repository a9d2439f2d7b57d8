//! Bounded voice pool with deterministic reuse.
//!
//! Slot bookkeeping lives in two index queues: `active` holds sounding slots
//! in oldest-triggered-first order, `free` holds reusable slots in
//! next-to-reuse-first order. Every slot index is in exactly one of the two
//! queues at all times. Allocation policy when the pool is saturated is to
//! steal the longest-sounding voice, so sustained pads yield to new notes
//! before fresh attacks do.
//!
//! All per-note calls are O(capacity), which stays cheap for the tens of
//! voices a synth realistically runs.

use std::collections::{TryReserveError, VecDeque};
use std::fmt;

/// Allocation behavior of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceMode {
    /// Notes spread across all slots, stealing the oldest when full.
    Poly,
    /// Every note lands on slot 0; no allocation happens.
    Mono,
}

/// One voice slot. Owned exclusively by the pool; external code reads slots
/// through [`VoicePool::slots`].
#[derive(Debug, Clone, Copy)]
pub struct VoiceSlot {
    pub index: usize,
    pub note: f32,
    pub attack_velocity: f32,
    pub release_velocity: f32,
    pub pressure: f32,
}

impl VoiceSlot {
    fn new(index: usize) -> Self {
        Self {
            index,
            note: 0.0,
            attack_velocity: 0.0,
            release_velocity: 0.0,
            pressure: 0.0,
        }
    }
}

/// Error returned when a transactional resize cannot allocate.
#[derive(Debug)]
pub enum PoolError {
    Allocation(TryReserveError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Allocation(err) => write!(f, "voice pool resize failed: {err}"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<TryReserveError> for PoolError {
    fn from(err: TryReserveError) -> Self {
        PoolError::Allocation(err)
    }
}

/// Maps note start/stop requests onto a bounded set of voice slots.
pub struct VoicePool {
    slots: Vec<VoiceSlot>,
    active: VecDeque<usize>,
    free: VecDeque<usize>,
    // This block's trigger edges, one per slot: +1 start, 0 hold, -1 release.
    gates: Vec<f32>,
    mode: VoiceMode,
}

impl VoicePool {
    /// Create a pool with `capacity` slots, all free. A pool always has at
    /// least one slot so mono mode has a slot 0 to land on.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(VoiceSlot::new).collect(),
            active: VecDeque::new(),
            free: (0..capacity).collect(),
            gates: vec![0.0; capacity],
            mode: VoiceMode::Poly,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn mode(&self) -> VoiceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VoiceMode) {
        self.mode = mode;
    }

    /// Read-only view of all slots, indexed by voice.
    pub fn slots(&self) -> &[VoiceSlot] {
        &self.slots
    }

    /// This block's gate edges, indexed by voice.
    pub fn gates(&self) -> &[f32] {
        &self.gates
    }

    /// Sounding slot indices, oldest-triggered first.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().copied()
    }

    /// Reusable slot indices, next-to-reuse first.
    pub fn free_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.free.iter().copied()
    }

    /// Reset gate edges at the start of a block.
    pub fn clear_gates(&mut self) {
        self.gates.fill(0.0);
    }

    /// Assign `note` to a slot and return its index.
    ///
    /// A note that is already sounding keeps its slot (refreshed to
    /// most-recently-triggered) and its envelope: no gate edge is emitted.
    /// Otherwise the head of the free queue is used, or, when the pool is
    /// saturated, the longest-sounding voice is cut directly to the new note.
    pub fn start(&mut self, note: f32, velocity: f32) -> usize {
        if self.mode == VoiceMode::Mono {
            return self.start_mono(note, velocity);
        }

        if let Some(pos) = self.active.iter().position(|&i| self.slots[i].note == note) {
            let index = self.active.remove(pos).unwrap();
            self.active.push_back(index);
            self.slots[index].attack_velocity = velocity;
            return index;
        }

        let index = match self.free.pop_front() {
            Some(index) => index,
            // Saturated: steal the oldest voice. Its release is not
            // signaled; it is reassigned in place.
            None => self
                .active
                .pop_front()
                .expect("every slot index lives in exactly one queue, so an empty free queue means active is full"),
        };
        self.assign(index, note, velocity);
        index
    }

    /// Release the slot holding `note`, if any. The freed slot goes to the
    /// tail of the free queue so its release tail can finish before reuse.
    pub fn stop(&mut self, note: f32, velocity: f32) -> Option<usize> {
        if self.mode == VoiceMode::Mono {
            return self.stop_mono(note, velocity);
        }

        let pos = self.active.iter().position(|&i| self.slots[i].note == note)?;
        let index = self.active.remove(pos).unwrap();
        self.free.push_back(index);
        self.slots[index].release_velocity = velocity;
        self.gates[index] = -1.0;
        Some(index)
    }

    /// Release every sounding slot. Recency order is preserved so the most
    /// recently triggered note becomes the next to be reused.
    pub fn all_notes_off(&mut self) {
        while let Some(index) = self.active.pop_front() {
            self.gates[index] = -1.0;
            self.free.push_front(index);
        }
    }

    /// Write `pressure` into every sounding slot holding `note`.
    pub fn set_pressure(&mut self, note: f32, pressure: f32) {
        for &index in &self.active {
            if self.slots[index].note == note {
                self.slots[index].pressure = pressure;
            }
        }
    }

    /// Grow or shrink the pool. Growing is transactional: on allocation
    /// failure nothing has changed and the error is returned. New slots go to
    /// the head of the free queue so they are used before older free slots.
    ///
    /// Shrinking removes the highest-index slots. Any of them that are still
    /// sounding are cut (their notes end with the slots); surviving slots
    /// keep their assignments and relative queue order.
    pub fn resize(&mut self, capacity: usize) -> Result<(), PoolError> {
        let capacity = capacity.max(1);
        let current = self.slots.len();

        if capacity > current {
            let added = capacity - current;
            self.slots.try_reserve(added)?;
            self.gates.try_reserve(added)?;
            self.free.try_reserve(added)?;

            for index in current..capacity {
                self.slots.push(VoiceSlot::new(index));
                self.gates.push(0.0);
            }
            for index in (current..capacity).rev() {
                self.free.push_front(index);
            }
        } else if capacity < current {
            self.active.retain(|&i| i < capacity);
            self.free.retain(|&i| i < capacity);
            self.slots.truncate(capacity);
            self.gates.truncate(capacity);
        }

        Ok(())
    }

    fn start_mono(&mut self, note: f32, velocity: f32) -> usize {
        // Slot 0 always receives the note, regardless of queue state.
        if let Some(pos) = self.active.iter().position(|&i| i == 0) {
            self.active.remove(pos);
        } else {
            self.free.retain(|&i| i != 0);
        }
        self.assign(0, note, velocity);
        0
    }

    fn stop_mono(&mut self, note: f32, velocity: f32) -> Option<usize> {
        if self.slots[0].note != note || !self.active.contains(&0) {
            return None;
        }
        self.active.retain(|&i| i != 0);
        self.free.push_back(0);
        self.slots[0].release_velocity = velocity;
        self.gates[0] = -1.0;
        Some(0)
    }

    fn assign(&mut self, index: usize, note: f32, velocity: f32) {
        self.active.push_back(index);
        let slot = &mut self.slots[index];
        slot.note = note;
        slot.attack_velocity = velocity;
        slot.pressure = 0.0;
        self.gates[index] = 1.0;
    }
}
