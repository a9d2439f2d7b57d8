// Purpose: voice allocation and the cross-thread control path.
// This layer turns note start/stop requests into per-voice gate edges for
// the synthesis engine downstream.

#[cfg(feature = "rtrb")]
pub mod control;
pub mod message;
pub mod pool;

#[cfg(feature = "rtrb")]
pub use control::{ControlHandle, ControlPlane};
pub use message::{ControlMessage, MessageReceiver};
pub use pool::{PoolError, VoiceMode, VoicePool, VoiceSlot};
