pub mod sequence;
pub mod sequencer;

pub use sequence::{Beat, BeatEvent, Sequence, SequenceBuilder, SequenceError};
pub use sequencer::{EventSequencer, SequencerHandle};
