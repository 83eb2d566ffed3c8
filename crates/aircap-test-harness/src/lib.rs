//! aircap-test-harness: Test utilities and mock collaborators for aircap.
//!
//! This crate provides [`MockBuffer`] for deterministic testing of the
//! controller without a real transport, [`ManualTimers`] for firing the
//! reopen timer on demand, and [`RecordingChain`] for capturing the packets
//! a controller delivers downstream.

pub mod manual_timers;
pub mod mock_buffer;
pub mod recording_chain;

pub use manual_timers::ManualTimers;
pub use mock_buffer::MockBuffer;
pub use recording_chain::RecordingChain;
