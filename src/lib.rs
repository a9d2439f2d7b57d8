pub mod dsp; // Allocation-free per-frame primitives
pub mod sequencing; // Timed event timelines and lookup
pub mod synth; // Voice allocation and cross-thread control

/// Default number of voice slots a pool starts with.
pub const DEFAULT_VOICE_COUNT: usize = 16;
