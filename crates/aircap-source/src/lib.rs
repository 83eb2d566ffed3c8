//! aircap-source: the capture data-source controller.
//!
//! [`SourceController`] mediates between a host process and one capture
//! session reached through a [`DuplexBuffer`](aircap_core::DuplexBuffer):
//! it issues asynchronous commands (list, probe, open, configure),
//! correlates sequence-numbered responses through a pending-command
//! registry, dispatches incoming frames to per-type handlers, and runs the
//! error/recovery state machine including the timed reopen after failure.
//!
//! Construction goes through [`SourceBuilder`], which carries the driver's
//! capability flags and the injected context (timer service, packet chain).

pub mod builder;
pub mod controller;
pub mod definition;
pub mod registry;

pub use builder::SourceBuilder;
pub use controller::{SourceController, SourceState, SourceStatus};
pub use definition::SourceDefinition;
pub use registry::{
    Completion, ConfigureCallback, ListCallback, OpenCallback, PendingCommand, ProbeCallback,
};
