//! Pending-command registry.
//!
//! Every command emitted on the wire carries a fresh sequence number and
//! registers a [`PendingCommand`] holding the caller's completion. Incoming
//! responses retire the entry by sequence; errors and explicit closes drain
//! the registry and fail every completion exactly once.
//!
//! The registry itself is not synchronized -- it lives inside the
//! controller's state lock, which serializes allocation, registration,
//! retirement, and cancellation together.

use std::collections::HashMap;

use aircap_core::{Interface, TimerId};

/// Completion for a list command: `(transaction, interfaces)`.
pub type ListCallback = Box<dyn FnOnce(u32, Vec<Interface>) + Send>;
/// Completion for a probe command: `(transaction, success, message)`.
pub type ProbeCallback = Box<dyn FnOnce(u32, bool, String) + Send>;
/// Completion for an open command: `(transaction, success, message)`.
pub type OpenCallback = Box<dyn FnOnce(u32, bool, String) + Send>;
/// Completion for a configure command: `(transaction, success, message)`.
pub type ConfigureCallback = Box<dyn FnOnce(u32, bool, String) + Send>;

/// The caller completion attached to a pending command, tagged by the kind
/// of command that was sent.
pub enum Completion {
    /// Awaiting a `LISTRESP`.
    List(ListCallback),
    /// Awaiting a `PROBERESP`.
    Probe(ProbeCallback),
    /// Awaiting an `OPENRESP`.
    Open(OpenCallback),
    /// Awaiting a `CONFIGRESP`.
    Configure(ConfigureCallback),
}

impl Completion {
    /// The command kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Completion::List(_) => "list",
            Completion::Probe(_) => "probe",
            Completion::Open(_) => "open",
            Completion::Configure(_) => "configure",
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// One command awaiting its response.
#[derive(Debug)]
pub struct PendingCommand {
    /// Caller-supplied tag, echoed back through the completion.
    pub transaction: u32,
    /// Wire sequence number keying this command.
    pub sequence: u32,
    /// The caller's completion.
    pub completion: Completion,
    /// Optional timer tied to this command, cancelled when the command is
    /// retired or cancelled.
    pub timer_id: Option<TimerId>,
}

impl PendingCommand {
    /// Invoke the completion with its failure shape: an empty interface
    /// list for a list command, `(false, reason)` for everything else.
    pub fn fail(self, reason: &str) {
        match self.completion {
            Completion::List(cb) => cb(self.transaction, Vec::new()),
            Completion::Probe(cb) | Completion::Open(cb) | Completion::Configure(cb) => {
                cb(self.transaction, false, reason.to_string())
            }
        }
    }
}

/// Sequence allocation plus the pending-command map.
pub struct CommandRegistry {
    next_sequence: u32,
    pending: HashMap<u32, PendingCommand>,
}

impl CommandRegistry {
    /// Create an empty registry; sequences start at 1.
    pub fn new() -> Self {
        CommandRegistry {
            next_sequence: 1,
            pending: HashMap::new(),
        }
    }

    /// Consume and return the next sequence number. Wraps on overflow;
    /// sequences are compared by equality only.
    pub fn allocate(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        seq
    }

    /// Insert a pending command. Sequences are unique by construction, so
    /// a collision indicates a caller bug.
    pub fn register(&mut self, command: PendingCommand) {
        debug_assert!(
            !self.pending.contains_key(&command.sequence),
            "sequence {} already registered",
            command.sequence
        );
        self.pending.insert(command.sequence, command);
    }

    /// Remove and return the command registered under `sequence`. Unknown
    /// sequences (stale or duplicate responses) return `None`.
    pub fn retire(&mut self, sequence: u32) -> Option<PendingCommand> {
        self.pending.remove(&sequence)
    }

    /// Remove and return every pending command.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.pending.drain().map(|(_, cmd)| cmd).collect()
    }

    /// Number of commands awaiting responses.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no commands are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    fn set_next_sequence(&mut self, next: u32) {
        self.next_sequence = next;
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn probe_completion(log: &Arc<Mutex<Vec<(u32, bool, String)>>>) -> Completion {
        let log = Arc::clone(log);
        Completion::Probe(Box::new(move |tx, ok, msg| {
            log.lock().unwrap().push((tx, ok, msg));
        }))
    }

    #[test]
    fn allocate_is_monotonic_and_unique() {
        let mut registry = CommandRegistry::new();
        let seqs: Vec<u32> = (0..100).map(|_| registry.allocate()).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), seqs.len());
        assert_eq!(seqs[0], 1);
        assert_eq!(seqs[99], 100);
    }

    #[test]
    fn allocate_wraps_without_panicking() {
        let mut registry = CommandRegistry::new();
        registry.set_next_sequence(u32::MAX);
        assert_eq!(registry.allocate(), u32::MAX);
        assert_eq!(registry.allocate(), 0);
        assert_eq!(registry.allocate(), 1);
    }

    #[test]
    fn register_and_retire() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CommandRegistry::new();

        let seq = registry.allocate();
        registry.register(PendingCommand {
            transaction: 9,
            sequence: seq,
            completion: probe_completion(&log),
            timer_id: None,
        });
        assert_eq!(registry.len(), 1);

        let cmd = registry.retire(seq).expect("command should be pending");
        assert_eq!(cmd.transaction, 9);
        assert!(registry.is_empty());

        // Retiring again finds nothing: at-most-once.
        assert!(registry.retire(seq).is_none());
    }

    #[test]
    fn retire_unknown_sequence_returns_none() {
        let mut registry = CommandRegistry::new();
        assert!(registry.retire(12345).is_none());
    }

    #[test]
    fn fail_shapes_per_kind() {
        let probe_log = Arc::new(Mutex::new(Vec::new()));
        let cmd = PendingCommand {
            transaction: 3,
            sequence: 1,
            completion: probe_completion(&probe_log),
            timer_id: None,
        };
        cmd.fail("card unplugged");
        assert_eq!(
            probe_log.lock().unwrap().as_slice(),
            &[(3, false, "card unplugged".to_string())]
        );

        let list_log: Arc<Mutex<Vec<(u32, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&list_log);
        let cmd = PendingCommand {
            transaction: 7,
            sequence: 2,
            completion: Completion::List(Box::new(move |tx, ifaces| {
                log.lock().unwrap().push((tx, ifaces.len()));
            })),
            timer_id: None,
        };
        cmd.fail("whatever");
        assert_eq!(list_log.lock().unwrap().as_slice(), &[(7, 0)]);
    }

    #[test]
    fn drain_empties_the_registry() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CommandRegistry::new();
        for _ in 0..3 {
            let seq = registry.allocate();
            registry.register(PendingCommand {
                transaction: seq,
                sequence: seq,
                completion: probe_completion(&log),
                timer_id: None,
            });
        }

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());

        for cmd in drained {
            cmd.fail("Closing source");
        }
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn completion_kind_names() {
        assert_eq!(Completion::List(Box::new(|_, _| {})).kind(), "list");
        assert_eq!(Completion::Probe(Box::new(|_, _, _| {})).kind(), "probe");
        assert_eq!(Completion::Open(Box::new(|_, _, _| {})).kind(), "open");
        assert_eq!(
            Completion::Configure(Box::new(|_, _, _| {})).kind(),
            "configure"
        );
    }
}
