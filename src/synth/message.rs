use crate::synth::pool::VoiceMode;
#[cfg(feature = "rtrb")]
use rtrb::Consumer;

/// Control requests handed from the decoder/UI thread to the processing
/// thread. Drained at the start of every block.
#[derive(Debug, Copy, Clone)]
pub enum ControlMessage {
    NoteOn { note: f32, velocity: f32 },
    NoteOff { note: f32, velocity: f32 },
    Pressure { note: f32, pressure: f32 },
    SetVoiceCount(usize),
    SetMode(VoiceMode),
    AllNotesOff,
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<ControlMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<ControlMessage> {
    fn pop(&mut self) -> Option<ControlMessage> {
        Consumer::pop(self).ok()
    }
}
