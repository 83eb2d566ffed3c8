//! Packet chain that records everything it processes.

use std::sync::Mutex;

use aircap_core::{ComponentId, Packet, PacketChain};

/// A [`PacketChain`] for asserting on delivered packets.
pub struct RecordingChain {
    components: Mutex<Vec<String>>,
    processed: Mutex<Vec<Packet>>,
}

impl RecordingChain {
    /// Create an empty recording chain.
    pub fn new() -> Self {
        RecordingChain {
            components: Mutex::new(Vec::new()),
            processed: Mutex::new(Vec::new()),
        }
    }

    /// Every packet processed so far, in order.
    pub fn processed(&self) -> Vec<Packet> {
        self.processed.lock().unwrap().clone()
    }

    /// Look up the id a component name was registered under.
    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.components
            .lock()
            .unwrap()
            .iter()
            .position(|c| c == name)
    }
}

impl Default for RecordingChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketChain for RecordingChain {
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
        self.processed.lock().unwrap().push(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircap_core::ChunkPayload;

    #[test]
    fn records_processed_packets() {
        let chain = RecordingChain::new();
        let link = chain.register_component("LINKFRAME");
        assert_eq!(chain.component_id("LINKFRAME"), Some(link));
        assert_eq!(chain.component_id("GPS"), None);

        let mut packet = chain.generate();
        packet.attach(
            link,
            ChunkPayload::LinkFrame {
                dlt: 127,
                data: vec![1, 2, 3],
            },
        );
        chain.process(packet);

        let processed = chain.processed();
        assert_eq!(processed.len(), 1);
        assert!(matches!(
            processed[0].chunk(link),
            Some(ChunkPayload::LinkFrame { dlt: 127, .. })
        ));
    }

    #[test]
    fn duplicate_registration_reuses_id() {
        let chain = RecordingChain::new();
        let a = chain.register_component("RADIODATA");
        let b = chain.register_component("RADIODATA");
        assert_eq!(a, b);
    }
}
