//! Touch capture and replay.
//!
//! # Overview
//!
//! Two passes share one artifact, the event log:
//! 1. **Recorder** copies the raw `getevent -l` stream from the device into
//!    the log, line for line, until the stream ends or the user cancels.
//! 2. **Replayer** walks the log once, tracks touch state and the last known
//!    coordinates, and sends a tap to the device each time a touch is released.
//!
//! The passes never overlap; the log is the only hand-off between them.

pub mod recorder;
pub mod recording;
pub mod replayer;
