//! # aircap -- Wireless Capture Data-Source Control
//!
//! `aircap` is an asynchronous Rust library for driving wireless capture
//! data sources: child capture helpers spoken to over piped stdio, or
//! remote capture peers reached over TCP, both speaking a framed,
//! checksummed, sequence-correlated control/data protocol.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aircap::{SourceBuilder, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> aircap::Result<()> {
//!     let source = SourceBuilder::new("wifi")
//!         .list_capable(true)
//!         .local_capable(true)
//!         .tune_capable(true)
//!         .build();
//!
//!     let transport = TcpTransport::connect("sensor.local:3501").await?;
//!     source.connect_buffer(transport);
//!
//!     source.open_interface(
//!         "wlan0:name=roof,retry=true",
//!         1,
//!         Box::new(|_, ok, msg| println!("open: {ok} {msg}")),
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `aircap-core`         | Contracts (buffer, timer, packet chain), types, errors |
//! | `aircap-proto`        | Frame envelope codec, named-map codec, payload decoders |
//! | `aircap-source`       | The controller: commands, dispatch, error/retry  |
//! | `aircap-transport`    | TCP and child-process transports                 |
//! | `aircap-test-harness` | Mock buffer, manual timers, recording chain      |
//! | **`aircap`**          | This facade crate -- re-exports everything       |
//!
//! ## Command flow
//!
//! Every command ([`list_interfaces`](SourceController::list_interfaces),
//! [`probe_interface`](SourceController::probe_interface),
//! [`open_interface`](SourceController::open_interface),
//! [`set_channel`](SourceController::set_channel), ...) is asynchronous:
//! the call returns once the frame is queued, and the caller's completion
//! fires when the matching response arrives, correlated by sequence
//! number. On failure -- a framing error, a peer error frame, a lost
//! transport -- every outstanding completion is failed exactly once, and a
//! source opened with `retry=true` schedules a reopen.
//!
//! ## Observing a source
//!
//! Subscribe to [`SourceEvent`]s for state transitions, or snapshot
//! [`SourceController::status`] at any time. Captured packets flow into
//! the [`PacketChain`] the controller was built with; [`ChannelChain`]
//! adapts that to an ordinary channel receiver.

pub use aircap_core::*;
pub use aircap_source::{
    Completion, ConfigureCallback, ListCallback, OpenCallback, ProbeCallback, SourceBuilder,
    SourceController, SourceDefinition, SourceState, SourceStatus,
};
pub use aircap_transport::{ChildProcessTransport, TcpTransport};

/// The wire protocol: frame codec, named-map codec, payload decoders.
pub mod proto {
    pub use aircap_proto::*;
}
