//! Asynchronous source event types.
//!
//! Events are emitted by the controller through a [`tokio::sync::broadcast`]
//! channel when source state changes. Host applications subscribe to track
//! open/close/error transitions and channel configuration without polling
//! the status snapshot.

/// An event emitted when capture-source state changes.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may miss events under load.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// The source opened successfully.
    Opened,

    /// The source was closed in an orderly fashion.
    Closed {
        /// Why the source was closed.
        reason: String,
    },

    /// The source entered the error state.
    Error {
        /// The failure reason.
        reason: String,
    },

    /// A reopen has been scheduled after an error.
    Retrying {
        /// Consecutive failed-open count (1-based).
        attempt: u32,
    },

    /// The current channel changed.
    ChannelChanged {
        /// The new channel.
        channel: String,
    },

    /// The hop configuration changed.
    HopChanged {
        /// Hops per second.
        rate: f64,
        /// The hop pattern.
        channels: Vec<String>,
    },
}
