//! Low-level control-rate primitives evaluated once per frame.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! embed directly inside voice structs. They intentionally stay focused on the
//! curve math so the surrounding engine can layer on orchestration and
//! modulation.

/// Gate-driven five-stage envelope generator.
pub mod envelope;

pub use envelope::{CurveKind, Envelope, EnvelopeParams, EnvelopeStage};
