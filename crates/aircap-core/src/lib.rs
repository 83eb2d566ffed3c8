//! aircap-core: Core traits, types, and error definitions for aircap.
//!
//! This crate defines the contracts the capture-source controller consumes
//! without pulling in any protocol or transport implementation: the duplex
//! byte-buffer seam, the timer service, the downstream packet chain, shared
//! data types, and error handling.
//!
//! # Key types
//!
//! - [`DuplexBuffer`] / [`BufferReader`] -- the byte-level transport seam
//! - [`PacketChain`] -- downstream delivery of captured packets
//! - [`TimerService`] -- one-shot timer scheduling (reopen-after-error)
//! - [`SourceEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod buffer;
pub mod chain;
pub mod error;
pub mod events;
pub mod timer;
pub mod types;

// Re-export key types at crate root for ergonomic `use aircap_core::*`.
pub use buffer::{BufferReader, DuplexBuffer};
pub use chain::{ChannelChain, ChunkPayload, ComponentId, Packet, PacketChain};
pub use error::{Error, Result};
pub use events::SourceEvent;
pub use timer::{TimerId, TimerService, TokioTimers};
pub use types::*;
