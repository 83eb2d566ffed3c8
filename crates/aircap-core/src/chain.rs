//! Downstream packet pipeline contract.
//!
//! Decoded data frames are assembled into [`Packet`]s and handed to a
//! [`PacketChain`] for processing by the host application. The controller
//! reserves three component ids at construction time -- `LINKFRAME` for the
//! raw capture bytes, `RADIODATA` for the decoded signal record, and `GPS`
//! for the decoded location record -- and attaches the matching
//! [`ChunkPayload`] under each.
//!
//! [`ChannelChain`] is a ready-made implementation that forwards every
//! processed packet into an unbounded channel.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::types::{GpsFix, SignalReport};

/// Identifies a registered packet component within one chain.
pub type ComponentId = usize;

/// A payload attached to a packet under a component id.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    /// The raw captured frame and its link type.
    LinkFrame {
        /// Data-link type of the capture (libpcap DLT value).
        dlt: u32,
        /// Raw capture bytes.
        data: Vec<u8>,
    },
    /// Radio-layer signal data.
    Radio(SignalReport),
    /// GPS location data.
    Gps(GpsFix),
}

/// One captured packet moving through the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    /// Capture timestamp, whole seconds since the Unix epoch.
    pub ts_sec: u64,
    /// Capture timestamp, microsecond remainder.
    pub ts_usec: u64,
    chunks: Vec<(ComponentId, ChunkPayload)>,
}

impl Packet {
    /// Attach a payload under a component id.
    pub fn attach(&mut self, component: ComponentId, payload: ChunkPayload) {
        self.chunks.push((component, payload));
    }

    /// Look up the payload attached under `component`, if any.
    pub fn chunk(&self, component: ComponentId) -> Option<&ChunkPayload> {
        self.chunks
            .iter()
            .find(|(id, _)| *id == component)
            .map(|(_, payload)| payload)
    }

    /// All attached chunks in attachment order.
    pub fn chunks(&self) -> &[(ComponentId, ChunkPayload)] {
        &self.chunks
    }
}

/// Downstream packet pipeline.
///
/// Packets are owned by the chain once [`process`](PacketChain::process) is
/// called; dropping a generated packet without processing it discards it.
pub trait PacketChain: Send + Sync {
    /// Register a named component, returning its id. Registering the same
    /// name twice returns the same id.
    fn register_component(&self, name: &str) -> ComponentId;

    /// Allocate an empty packet.
    fn generate(&self) -> Packet;

    /// Deliver a fully assembled packet downstream.
    fn process(&self, packet: Packet);
}

/// A [`PacketChain`] that forwards processed packets into an unbounded
/// channel.
///
/// If the receiving half has been dropped, processed packets are discarded
/// silently -- capture keeps running even when nobody is listening.
pub struct ChannelChain {
    components: Mutex<Vec<String>>,
    tx: mpsc::UnboundedSender<Packet>,
}

impl ChannelChain {
    /// Create a chain and the receiver for its processed packets.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChannelChain {
                components: Mutex::new(Vec::new()),
                tx,
            },
            rx,
        )
    }
}

impl PacketChain for ChannelChain {
    fn register_component(&self, name: &str) -> ComponentId {
        let mut components = self.components.lock().unwrap();
        if let Some(id) = components.iter().position(|c| c == name) {
            return id;
        }
        components.push(name.to_string());
        components.len() - 1
    }

    fn generate(&self) -> Packet {
        Packet::default()
    }

    fn process(&self, packet: Packet) {
        let _ = self.tx.send(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_attach_and_lookup() {
        let mut packet = Packet::default();
        packet.attach(
            0,
            ChunkPayload::LinkFrame {
                dlt: 127,
                data: vec![0xAA, 0xBB],
            },
        );
        packet.attach(2, ChunkPayload::Gps(GpsFix::default()));

        assert!(matches!(
            packet.chunk(0),
            Some(ChunkPayload::LinkFrame { dlt: 127, .. })
        ));
        assert!(packet.chunk(1).is_none());
        assert!(matches!(packet.chunk(2), Some(ChunkPayload::Gps(_))));
        assert_eq!(packet.chunks().len(), 2);
    }

    #[test]
    fn channel_chain_component_registration_is_idempotent() {
        let (chain, _rx) = ChannelChain::new();
        let a = chain.register_component("LINKFRAME");
        let b = chain.register_component("RADIODATA");
        let a2 = chain.register_component("LINKFRAME");
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }

    #[test]
    fn channel_chain_forwards_processed_packets() {
        let (chain, mut rx) = ChannelChain::new();
        let link = chain.register_component("LINKFRAME");

        let mut packet = chain.generate();
        packet.ts_sec = 1_700_000_000;
        packet.attach(
            link,
            ChunkPayload::LinkFrame {
                dlt: 105,
                data: vec![1, 2, 3],
            },
        );
        chain.process(packet);

        let received = rx.try_recv().expect("packet should be queued");
        assert_eq!(received.ts_sec, 1_700_000_000);
        assert!(matches!(
            received.chunk(link),
            Some(ChunkPayload::LinkFrame { dlt: 105, .. })
        ));
    }

    #[test]
    fn channel_chain_survives_dropped_receiver() {
        let (chain, rx) = ChannelChain::new();
        drop(rx);
        chain.process(Packet::default());
    }
}
