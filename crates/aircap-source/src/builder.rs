//! SourceBuilder -- fluent builder for constructing [`SourceController`]
//! instances.
//!
//! Separates configuration from construction: the driver's capability
//! flags, the reopen delay, and the injected context (timer service,
//! packet chain) are set up front, then [`build()`](SourceBuilder::build)
//! produces the shared controller.
//!
//! # Example
//!
//! ```no_run
//! use aircap_source::SourceBuilder;
//!
//! let source = SourceBuilder::new("wifi")
//!     .list_capable(true)
//!     .probe_capable(true)
//!     .local_capable(true)
//!     .tune_capable(true)
//!     .build();
//! ```

use std::sync::Arc;
use std::time::Duration;

use aircap_core::{PacketChain, SourceCapabilities, TimerService, TokioTimers};

use crate::controller::SourceController;

/// Default delay before a failed source is reopened.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Fluent builder for [`SourceController`].
pub struct SourceBuilder {
    driver: String,
    capabilities: SourceCapabilities,
    retry_delay: Duration,
    timers: Option<Arc<dyn TimerService>>,
    chain: Option<Arc<dyn PacketChain>>,
    event_capacity: usize,
}

impl SourceBuilder {
    /// Create a builder for the named driver with every capability off.
    pub fn new(driver: &str) -> Self {
        SourceBuilder {
            driver: driver.to_string(),
            capabilities: SourceCapabilities::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            timers: None,
            chain: None,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Whether the driver can enumerate capturable interfaces.
    pub fn list_capable(mut self, capable: bool) -> Self {
        self.capabilities.list_capable = capable;
        self
    }

    /// Whether the driver can probe a source definition.
    pub fn probe_capable(mut self, capable: bool) -> Self {
        self.capabilities.probe_capable = capable;
        self
    }

    /// Whether the driver can open a local capture.
    pub fn local_capable(mut self, capable: bool) -> Self {
        self.capabilities.local_capable = capable;
        self
    }

    /// Whether the driver can tune channels and configure hopping.
    pub fn tune_capable(mut self, capable: bool) -> Self {
        self.capabilities.tune_capable = capable;
        self
    }

    /// Replace the whole capability set at once.
    pub fn capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Delay before reopening after an error (default: 5 seconds).
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Use a specific timer service instead of [`TokioTimers`].
    ///
    /// This is the injection point for deterministic timers in tests.
    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Deliver decoded data frames to this packet chain.
    ///
    /// The `LINKFRAME`, `RADIODATA`, and `GPS` components are registered at
    /// build time. Without a chain, data frames are decoded and discarded.
    pub fn packet_chain(mut self, chain: Arc<dyn PacketChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Capacity of the event broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the controller.
    pub fn build(self) -> Arc<SourceController> {
        let timers = self
            .timers
            .unwrap_or_else(|| Arc::new(TokioTimers::new()) as Arc<dyn TimerService>);

        SourceController::new(
            self.driver,
            self.capabilities,
            self.retry_delay,
            timers,
            self.chain,
            self.event_capacity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SourceState;

    #[test]
    fn builder_defaults() {
        let source = SourceBuilder::new("wifi").build();
        assert_eq!(source.driver(), "wifi");
        assert_eq!(source.capabilities(), SourceCapabilities::default());

        let status = source.status();
        assert_eq!(status.state, SourceState::Idle);
        assert!(!status.error);
        assert_eq!(status.retry_attempts, 0);
    }

    #[test]
    fn builder_fluent_chain() {
        let source = SourceBuilder::new("wifi")
            .list_capable(true)
            .probe_capable(true)
            .local_capable(true)
            .tune_capable(true)
            .retry_delay(Duration::from_millis(250))
            .event_capacity(8)
            .build();

        let caps = source.capabilities();
        assert!(caps.list_capable);
        assert!(caps.probe_capable);
        assert!(caps.local_capable);
        assert!(caps.tune_capable);
    }

    #[test]
    fn builder_capabilities_replaces_set() {
        let caps = SourceCapabilities {
            list_capable: true,
            probe_capable: false,
            local_capable: true,
            tune_capable: false,
        };
        let source = SourceBuilder::new("wifi").capabilities(caps).build();
        assert_eq!(source.capabilities(), caps);
    }
}
