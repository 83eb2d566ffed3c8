//! aircap-transport: real transports implementing the duplex-buffer
//! contract.
//!
//! Two ways to reach a capture peer:
//!
//! - [`TcpTransport`] -- a remote capture peer over TCP.
//! - [`ChildProcessTransport`] -- a local capture helper binary spawned
//!   with piped stdio.
//!
//! Both run a background read pump that buffers incoming bytes and drives
//! the registered [`BufferReader`](aircap_core::BufferReader), and a write
//! pump that flushes queued frames, so
//! [`write`](aircap_core::DuplexBuffer::write) never blocks on the peer.

mod pump;

pub mod ipc;
pub mod tcp;

pub use ipc::ChildProcessTransport;
pub use tcp::TcpTransport;
