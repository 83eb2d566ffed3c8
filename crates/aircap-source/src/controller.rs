//! The capture-source controller.
//!
//! [`SourceController`] drives one capture session over a bound
//! [`DuplexBuffer`]: it emits sequence-numbered command frames, registers
//! the caller's completion for each, decodes and dispatches incoming
//! frames, applies channel/uuid/interface state, and runs the error/retry
//! state machine.
//!
//! # Locking
//!
//! All state lives behind one non-reentrant mutex. Internal helpers take
//! `&mut Inner` and never re-acquire the lock; caller completions, packet
//! deliveries, and transport teardown calls are collected in a [`Deferred`]
//! batch while the lock is held and invoked after it is released. Sequence
//! allocation and command registration happen under the same lock hold, so
//! a response can never arrive for a command that is not yet registered.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use aircap_core::{
    log_message, BufferReader, ChunkPayload, ComponentId, DuplexBuffer, Interface, PacketChain,
    SourceCapabilities, SourceEvent, TimerId, TimerService,
};
use aircap_proto::frame::{self, DecodedFrame, FrameOutcome};
use aircap_proto::payloads::{self, SuccessValue};

use crate::definition::SourceDefinition;
use crate::registry::{
    CommandRegistry, Completion, ConfigureCallback, ListCallback, OpenCallback, PendingCommand,
    ProbeCallback,
};

/// Lifecycle state of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Constructed, nothing attempted yet.
    Idle,
    /// An open command is in flight.
    Opening,
    /// The source opened successfully and is delivering data.
    Running,
    /// A failure is being processed; pending commands are draining.
    Erroring,
    /// A reopen timer is armed after a failure.
    Retrying,
    /// Closed, either deliberately or after a non-retried failure.
    Closed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceState::Idle => "idle",
            SourceState::Opening => "opening",
            SourceState::Running => "running",
            SourceState::Erroring => "erroring",
            SourceState::Retrying => "retrying",
            SourceState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// A point-in-time snapshot of the controller's observable state.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    /// Lifecycle state.
    pub state: SourceState,
    /// Display name from the source definition.
    pub name: String,
    /// Capture interface from the source definition.
    pub interface: String,
    /// The raw source definition, once one has been parsed.
    pub definition: Option<String>,
    /// Source UUID, locally defined or adopted from the peer.
    pub uuid: Option<Uuid>,
    /// Channels the source supports.
    pub channels: Vec<String>,
    /// Current channel.
    pub channel: String,
    /// Hop rate in hops per second.
    pub hop_rate: f64,
    /// Channels in the hop pattern.
    pub hop_channels: Vec<String>,
    /// Interfaces reported by the most recent list response.
    pub listed_interfaces: Vec<Interface>,
    /// Whether the source is in the error state.
    pub error: bool,
    /// Last known reason for the error state.
    pub error_reason: String,
    /// Whether the source reopens automatically after failure.
    pub retry: bool,
    /// Consecutive unsuccessful retry attempts.
    pub retry_attempts: u32,
}

/// The packet chain plus the component ids reserved at build time.
#[derive(Clone)]
struct ChainHandles {
    chain: Arc<dyn PacketChain>,
    linkframe: ComponentId,
    radiodata: ComponentId,
    gps: ComponentId,
}

/// Work collected under the state lock and executed after it is released.
#[derive(Default)]
struct Deferred(Vec<Box<dyn FnOnce() + Send>>);

impl Deferred {
    fn push(&mut self, f: impl FnOnce() + Send + 'static) {
        self.0.push(Box::new(f));
    }

    fn fail(&mut self, command: PendingCommand, reason: &str) {
        let reason = reason.to_string();
        self.push(move || command.fail(&reason));
    }

    fn run(self) {
        for f in self.0 {
            f();
        }
    }
}

struct Inner {
    state: SourceState,
    buffer: Option<Arc<dyn DuplexBuffer>>,
    registry: CommandRegistry,
    definition: Option<SourceDefinition>,
    name: String,
    interface: String,
    uuid: Option<Uuid>,
    local_uuid: bool,
    channels: Vec<String>,
    channel: String,
    hop_rate: f64,
    hop_channels: Vec<String>,
    listed_interfaces: Vec<Interface>,
    error: bool,
    error_reason: String,
    retry: bool,
    retry_attempts: u32,
    reopen_timer: Option<TimerId>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            state: SourceState::Idle,
            buffer: None,
            registry: CommandRegistry::new(),
            definition: None,
            name: String::new(),
            interface: String::new(),
            uuid: None,
            local_uuid: false,
            channels: Vec::new(),
            channel: String::new(),
            hop_rate: 0.0,
            hop_channels: Vec::new(),
            listed_interfaces: Vec::new(),
            error: false,
            error_reason: String::new(),
            retry: false,
            retry_attempts: 0,
            reopen_timer: None,
        }
    }
}

/// Controller for one capture data source.
///
/// Shared via `Arc`; every public method takes `&self`. Constructed through
/// [`SourceBuilder`](crate::SourceBuilder).
pub struct SourceController {
    driver: String,
    capabilities: SourceCapabilities,
    retry_delay: Duration,
    timers: Arc<dyn TimerService>,
    chain: Option<ChainHandles>,
    event_tx: broadcast::Sender<SourceEvent>,
    weak_self: Weak<SourceController>,
    inner: Mutex<Inner>,
}

impl SourceController {
    pub(crate) fn new(
        driver: String,
        capabilities: SourceCapabilities,
        retry_delay: Duration,
        timers: Arc<dyn TimerService>,
        chain: Option<Arc<dyn PacketChain>>,
        event_capacity: usize,
    ) -> Arc<Self> {
        let chain = chain.map(|chain| {
            let linkframe = chain.register_component("LINKFRAME");
            let radiodata = chain.register_component("RADIODATA");
            let gps = chain.register_component("GPS");
            ChainHandles {
                chain,
                linkframe,
                radiodata,
                gps,
            }
        });

        let (event_tx, _) = broadcast::channel(event_capacity);

        Arc::new_cyclic(|weak| SourceController {
            driver,
            capabilities,
            retry_delay,
            timers,
            chain,
            event_tx,
            weak_self: weak.clone(),
            inner: Mutex::new(Inner::new()),
        })
    }

    /// The driver name this controller was built for.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// The driver's capability flags.
    pub fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    /// Subscribe to source events.
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot the observable state.
    pub fn status(&self) -> SourceStatus {
        let inner = self.inner.lock().unwrap();
        SourceStatus {
            state: inner.state,
            name: inner.name.clone(),
            interface: inner.interface.clone(),
            definition: inner.definition.as_ref().map(|d| d.raw.clone()),
            uuid: inner.uuid,
            channels: inner.channels.clone(),
            channel: inner.channel.clone(),
            hop_rate: inner.hop_rate,
            hop_channels: inner.hop_channels.clone(),
            listed_interfaces: inner.listed_interfaces.clone(),
            error: inner.error,
            error_reason: inner.error_reason.clone(),
            retry: inner.retry,
            retry_attempts: inner.retry_attempts,
        }
    }

    /// Bind a transport buffer and register as its read interface.
    pub fn connect_buffer(&self, buffer: Arc<dyn DuplexBuffer>) {
        if let Some(me) = self.weak_self.upgrade() {
            buffer.set_read_interface(me);
        }
        self.inner.lock().unwrap().buffer = Some(buffer);
    }

    /// Ask the peer for its capturable interfaces.
    ///
    /// On a non-list-capable driver the completion is invoked synchronously
    /// with an empty list and nothing is emitted.
    pub fn list_interfaces(&self, transaction: u32, cb: ListCallback) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.capabilities.list_capable {
                deferred.push(move || cb(transaction, Vec::new()));
            } else {
                self.send_command(
                    &mut inner,
                    &mut deferred,
                    "LISTDEVICE",
                    BTreeMap::new(),
                    transaction,
                    Completion::List(cb),
                );
            }
        }
        deferred.run();
    }

    /// Ask the peer whether it can handle a source definition.
    pub fn probe_interface(&self, definition: &str, transaction: u32, cb: ProbeCallback) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.capabilities.probe_capable {
                deferred.push(move || {
                    cb(transaction, false, "Driver not capable of probing".into())
                });
            } else {
                let mut objects = BTreeMap::new();
                objects.insert("DEFINITION".to_string(), definition.as_bytes().to_vec());
                self.send_command(
                    &mut inner,
                    &mut deferred,
                    "PROBEDEVICE",
                    objects,
                    transaction,
                    Completion::Probe(cb),
                );
            }
        }
        deferred.run();
    }

    /// Open a capture on a source definition.
    ///
    /// Cancels any armed reopen timer, parses the definition into local
    /// state, and emits `OPENDEVICE`.
    pub fn open_interface(&self, definition: &str, transaction: u32, cb: OpenCallback) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.capabilities.local_capable {
                deferred.push(move || {
                    cb(
                        transaction,
                        false,
                        "Driver does not support direct capture".into(),
                    )
                });
            } else {
                if let Some(timer) = inner.reopen_timer.take() {
                    self.timers.remove_timer(timer);
                }

                match definition.parse::<SourceDefinition>() {
                    Err(e) => {
                        tracing::debug!(error = %e, definition, "rejecting source definition");
                        deferred
                            .push(move || cb(transaction, false, "Malformed source config".into()));
                    }
                    Ok(parsed) => {
                        inner.interface = parsed.interface.clone();
                        inner.name = parsed.name.clone();
                        inner.local_uuid = parsed.uuid.is_some();
                        if let Some(uuid) = parsed.uuid {
                            inner.uuid = Some(uuid);
                        }
                        if let Some(retry) = parsed.retry {
                            inner.retry = retry;
                        }
                        inner.definition = Some(parsed);
                        inner.state = SourceState::Opening;

                        let mut objects = BTreeMap::new();
                        objects.insert("DEFINITION".to_string(), definition.as_bytes().to_vec());
                        self.send_command(
                            &mut inner,
                            &mut deferred,
                            "OPENDEVICE",
                            objects,
                            transaction,
                            Completion::Open(cb),
                        );
                    }
                }
            }
        }
        deferred.run();
    }

    /// Lock the source onto a single channel.
    pub fn set_channel(&self, channel: &str, transaction: u32, cb: ConfigureCallback) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.capabilities.tune_capable {
                deferred.push(move || {
                    cb(
                        transaction,
                        false,
                        "Driver not capable of changing channel".into(),
                    )
                });
            } else {
                let mut objects = BTreeMap::new();
                objects.insert("CHANSET".to_string(), channel.as_bytes().to_vec());
                self.send_command(
                    &mut inner,
                    &mut deferred,
                    "CONFIGURE",
                    objects,
                    transaction,
                    Completion::Configure(cb),
                );
            }
        }
        deferred.run();
    }

    /// Configure channel hopping over `channels` at `rate` hops per second.
    pub fn set_channel_hop(
        &self,
        rate: f64,
        channels: Vec<String>,
        transaction: u32,
        cb: ConfigureCallback,
    ) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.capabilities.tune_capable {
                deferred.push(move || {
                    cb(
                        transaction,
                        false,
                        "Driver not capable of changing channel".into(),
                    )
                });
            } else {
                let mut objects = BTreeMap::new();
                objects.insert(
                    "CHANHOP".to_string(),
                    payloads::encode_chanhop(rate, &channels),
                );
                self.send_command(
                    &mut inner,
                    &mut deferred,
                    "CONFIGURE",
                    objects,
                    transaction,
                    Completion::Configure(cb),
                );
            }
        }
        deferred.run();
    }

    /// Change the hop rate, keeping the current hop pattern.
    pub fn set_channel_hop_rate(&self, rate: f64, transaction: u32, cb: ConfigureCallback) {
        let channels = self.inner.lock().unwrap().hop_channels.clone();
        self.set_channel_hop(rate, channels, transaction, cb);
    }

    /// Change the hop pattern, keeping the current hop rate.
    pub fn set_channel_hop_list(
        &self,
        channels: Vec<String>,
        transaction: u32,
        cb: ConfigureCallback,
    ) {
        let rate = self.inner.lock().unwrap().hop_rate;
        self.set_channel_hop(rate, channels, transaction, cb);
    }

    /// Cancel one pending command, failing its completion with `reason`.
    pub fn cancel_command(&self, sequence: u32, reason: &str) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(command) = inner.registry.retire(sequence) {
                if let Some(timer) = command.timer_id {
                    self.timers.remove_timer(timer);
                }
                deferred.fail(command, reason);
            }
        }
        deferred.run();
    }

    /// Close the source: cancel the reopen timer, fail every pending
    /// command, and close the transport.
    pub fn close_source(&self) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            self.close_locked(&mut inner, &mut deferred, "Closing source");
        }
        deferred.run();
    }

    /// Drive the source into the error state.
    ///
    /// Every pending command fails, the transport is told to tear down,
    /// and -- when retry is enabled -- a single reopen is scheduled.
    pub fn trigger_error(&self, reason: &str) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock().unwrap();
            self.trigger_error_locked(&mut inner, &mut deferred, reason);
        }
        deferred.run();
    }

    // -----------------------------------------------------------------
    // Outgoing path
    // -----------------------------------------------------------------

    /// Allocate a sequence, encode the frame, write it, and register the
    /// pending command -- all under the caller's lock hold.
    fn send_command(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        command: &str,
        objects: BTreeMap<String, Vec<u8>>,
        transaction: u32,
        completion: Completion,
    ) {
        let Some(buffer) = inner.buffer.clone() else {
            deferred.fail(
                PendingCommand {
                    transaction,
                    sequence: 0,
                    completion,
                    timer_id: None,
                },
                "unable to generate command frame",
            );
            return;
        };

        let sequence = inner.registry.allocate();
        let encoded = frame::encode_frame(command, sequence, &objects);
        tracing::trace!(command, sequence, len = encoded.len(), "sending command");

        let pending = PendingCommand {
            transaction,
            sequence,
            completion,
            timer_id: None,
        };

        match buffer.write(&encoded) {
            Ok(()) => inner.registry.register(pending),
            Err(e) => {
                tracing::debug!(command, error = %e, "command write failed");
                deferred.fail(pending, "unable to generate command frame");
            }
        }
    }

    // -----------------------------------------------------------------
    // Incoming path
    // -----------------------------------------------------------------

    fn dispatch_frame(&self, inner: &mut Inner, deferred: &mut Deferred, decoded: DecodedFrame) {
        let type_tag = decoded.type_tag.to_ascii_lowercase();
        let kv = decoded.objects;

        match type_tag.as_str() {
            "message" => self.handle_message_frame(inner, deferred, &kv),
            "error" => self.handle_error_frame(inner, deferred, &kv),
            "proberesp" => self.handle_probe_resp(inner, deferred, &kv),
            "openresp" => self.handle_open_resp(inner, deferred, &kv),
            "listresp" => self.handle_list_resp(inner, deferred, &kv),
            "configresp" => self.handle_config_resp(inner, deferred, &kv),
            "data" => self.handle_data_frame(inner, deferred, &kv),
            other => tracing::trace!(type_tag = other, "ignoring unknown frame type"),
        }
    }

    fn handle_message_frame(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        let _ = self.take_message(inner, deferred, kv);
    }

    fn handle_error_frame(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        let Ok(msg) = self.take_message(inner, deferred, kv) else {
            return;
        };
        let reason = msg.unwrap_or_else(|| "Received error frame on data source".to_string());
        self.trigger_error_locked(inner, deferred, &reason);
    }

    fn handle_probe_resp(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        let Ok(msg) = self.take_message(inner, deferred, kv) else {
            return;
        };
        let msg = msg.unwrap_or_default();

        if let Some(bytes) = kv.get("channels") {
            if !self.apply_channels(inner, deferred, bytes) {
                return;
            }
        }
        if let Some(bytes) = kv.get("chanset") {
            if !self.apply_chanset(inner, deferred, bytes) {
                return;
            }
        }

        let Some(success) = self.require_success(inner, deferred, kv, "probe") else {
            return;
        };

        if let Some(command) = inner.registry.retire(success.sequence) {
            self.retire_cleanup(&command);
            match command.completion {
                Completion::Probe(cb) => {
                    let transaction = command.transaction;
                    let ok = success.success;
                    deferred.push(move || cb(transaction, ok, msg));
                }
                other => {
                    tracing::warn!(kind = other.kind(), "probe response matched a non-probe command")
                }
            }
        }

        // Probe sessions are one-shot.
        self.close_locked(inner, deferred, "Closing source");
    }

    fn handle_open_resp(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        let Ok(msg) = self.take_message(inner, deferred, kv) else {
            return;
        };
        let msg = msg.unwrap_or_default();

        if let Some(bytes) = kv.get("channels") {
            if !self.apply_channels(inner, deferred, bytes) {
                return;
            }
        }
        if let Some(bytes) = kv.get("chanset") {
            if !self.apply_chanset(inner, deferred, bytes) {
                return;
            }
        }
        if let Some(bytes) = kv.get("chanhop") {
            if !self.apply_chanhop(inner, deferred, bytes) {
                return;
            }
        }
        if let Some(bytes) = kv.get("uuid") {
            if !self.apply_uuid(inner, deferred, bytes) {
                return;
            }
        }

        let Some(success) = self.require_success(inner, deferred, kv, "open") else {
            return;
        };

        if let Some(command) = inner.registry.retire(success.sequence) {
            self.retire_cleanup(&command);
            match command.completion {
                Completion::Open(cb) => {
                    let transaction = command.transaction;
                    let ok = success.success;
                    let msg = msg.clone();
                    deferred.push(move || cb(transaction, ok, msg));
                }
                other => {
                    tracing::warn!(kind = other.kind(), "open response matched a non-open command")
                }
            }
        }

        if success.success {
            inner.error = false;
            inner.error_reason.clear();
            inner.state = SourceState::Running;
            let _ = self.event_tx.send(SourceEvent::Opened);
        } else {
            self.trigger_error_locked(inner, deferred, &msg);
        }
    }

    fn handle_list_resp(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        if self.take_message(inner, deferred, kv).is_err() {
            return;
        }

        if let Some(bytes) = kv.get("interfacelist") {
            match payloads::decode_interface_list(bytes) {
                Ok(interfaces) => inner.listed_interfaces = interfaces,
                Err(e) => {
                    self.trigger_error_locked(inner, deferred, &e.to_string());
                    return;
                }
            }
        }

        let Some(success) = self.require_success(inner, deferred, kv, "list") else {
            return;
        };

        if let Some(command) = inner.registry.retire(success.sequence) {
            self.retire_cleanup(&command);
            match command.completion {
                Completion::List(cb) => {
                    let transaction = command.transaction;
                    let interfaces = inner.listed_interfaces.clone();
                    deferred.push(move || cb(transaction, interfaces));
                }
                other => {
                    tracing::warn!(kind = other.kind(), "list response matched a non-list command")
                }
            }
        }

        // List sessions are one-shot.
        self.close_locked(inner, deferred, "Closing source");
    }

    fn handle_config_resp(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        let Ok(msg) = self.take_message(inner, deferred, kv) else {
            return;
        };
        let msg = msg.unwrap_or_default();

        if let Some(bytes) = kv.get("chanset") {
            if !self.apply_chanset(inner, deferred, bytes) {
                return;
            }
        }
        if let Some(bytes) = kv.get("chanhop") {
            if !self.apply_chanhop(inner, deferred, bytes) {
                return;
            }
        }

        let Some(success) = self.require_success(inner, deferred, kv, "config") else {
            return;
        };

        if let Some(command) = inner.registry.retire(success.sequence) {
            self.retire_cleanup(&command);
            match command.completion {
                Completion::Configure(cb) => {
                    let transaction = command.transaction;
                    let ok = success.success;
                    let msg = msg.clone();
                    deferred.push(move || cb(transaction, ok, msg));
                }
                other => tracing::warn!(
                    kind = other.kind(),
                    "configure response matched a different command"
                ),
            }
        }

        if !success.success {
            self.trigger_error_locked(inner, deferred, &msg);
        }
    }

    fn handle_data_frame(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) {
        if self.take_message(inner, deferred, kv).is_err() {
            return;
        }

        let Some(packet_bytes) = kv.get("packet") else {
            return;
        };
        let record = match payloads::decode_packet(packet_bytes) {
            Ok(record) => record,
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                return;
            }
        };

        let signal = match kv.get("signal") {
            Some(bytes) => match payloads::decode_signal(bytes) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    self.trigger_error_locked(inner, deferred, &e.to_string());
                    return;
                }
            },
            None => None,
        };

        let gps = match kv.get("gps") {
            Some(bytes) => match payloads::decode_gps(bytes) {
                Ok(gps) => Some(gps),
                Err(e) => {
                    self.trigger_error_locked(inner, deferred, &e.to_string());
                    return;
                }
            },
            None => None,
        };

        let Some(handles) = self.chain.clone() else {
            tracing::trace!("data frame decoded but no packet chain is attached");
            return;
        };

        deferred.push(move || {
            let mut packet = handles.chain.generate();
            packet.ts_sec = record.ts_sec;
            packet.ts_usec = record.ts_usec;
            packet.attach(
                handles.linkframe,
                ChunkPayload::LinkFrame {
                    dlt: record.dlt,
                    data: record.data,
                },
            );
            if let Some(signal) = signal {
                packet.attach(handles.radiodata, ChunkPayload::Radio(signal));
            }
            if let Some(gps) = gps {
                packet.attach(handles.gps, ChunkPayload::Gps(gps));
            }
            handles.chain.process(packet);
        });
    }

    // -----------------------------------------------------------------
    // Keyed-value application helpers
    // -----------------------------------------------------------------

    /// Decode and log a `message` object if present. `Err(())` means the
    /// payload was malformed and the error path has already been taken.
    fn take_message(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
    ) -> Result<Option<String>, ()> {
        let Some(bytes) = kv.get("message") else {
            return Ok(None);
        };
        match payloads::decode_message(bytes) {
            Ok(record) => {
                log_message(&record.msg, record.flags);
                Ok(Some(record.msg))
            }
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                Err(())
            }
        }
    }

    fn apply_channels(&self, inner: &mut Inner, deferred: &mut Deferred, bytes: &[u8]) -> bool {
        match payloads::decode_channels(bytes) {
            Ok(channels) => {
                inner.channels = channels;
                true
            }
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                false
            }
        }
    }

    fn apply_chanset(&self, inner: &mut Inner, deferred: &mut Deferred, bytes: &[u8]) -> bool {
        match payloads::decode_chanset(bytes) {
            Ok(channel) => {
                if inner.channel != channel {
                    inner.channel = channel.clone();
                    let _ = self.event_tx.send(SourceEvent::ChannelChanged { channel });
                }
                true
            }
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                false
            }
        }
    }

    fn apply_chanhop(&self, inner: &mut Inner, deferred: &mut Deferred, bytes: &[u8]) -> bool {
        match payloads::decode_chanhop(bytes) {
            Ok(hop) => {
                inner.hop_rate = hop.rate;
                inner.hop_channels = hop.channels.clone();
                let _ = self.event_tx.send(SourceEvent::HopChanged {
                    rate: hop.rate,
                    channels: hop.channels,
                });
                true
            }
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                false
            }
        }
    }

    fn apply_uuid(&self, inner: &mut Inner, deferred: &mut Deferred, bytes: &[u8]) -> bool {
        match payloads::decode_uuid(bytes) {
            Ok(uuid) => {
                // A UUID in the source definition takes precedence over
                // anything the peer reports.
                if !inner.local_uuid {
                    inner.uuid = Some(uuid);
                }
                true
            }
            Err(e) => {
                self.trigger_error_locked(inner, deferred, &e.to_string());
                false
            }
        }
    }

    /// Extract the mandatory `success` object, tripping the error path
    /// when it is absent or malformed.
    fn require_success(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &HashMap<String, Vec<u8>>,
        kind: &str,
    ) -> Option<SuccessValue> {
        let Some(bytes) = kv.get("success") else {
            self.trigger_error_locked(
                inner,
                deferred,
                &format!("No valid response found for {kind} request"),
            );
            return None;
        };
        match payloads::decode_success(bytes) {
            Ok(success) => Some(success),
            Err(_) => {
                self.trigger_error_locked(inner, deferred, "Invalid SUCCESS object in response");
                None
            }
        }
    }

    fn retire_cleanup(&self, command: &PendingCommand) {
        if let Some(timer) = command.timer_id {
            self.timers.remove_timer(timer);
        }
    }

    // -----------------------------------------------------------------
    // Error & lifecycle
    // -----------------------------------------------------------------

    fn close_locked(&self, inner: &mut Inner, deferred: &mut Deferred, reason: &str) {
        if let Some(timer) = inner.reopen_timer.take() {
            self.timers.remove_timer(timer);
        }

        for command in inner.registry.drain() {
            self.retire_cleanup(&command);
            deferred.fail(command, reason);
        }

        if let Some(buffer) = inner.buffer.clone() {
            let reason = reason.to_string();
            deferred.push(move || buffer.close(&reason));
        }

        inner.state = SourceState::Closed;
        let _ = self.event_tx.send(SourceEvent::Closed {
            reason: reason.to_string(),
        });
    }

    fn trigger_error_locked(&self, inner: &mut Inner, deferred: &mut Deferred, reason: &str) {
        tracing::error!(source = %inner.name, reason, "capture source failed");

        for command in inner.registry.drain() {
            self.retire_cleanup(&command);
            deferred.fail(command, reason);
        }

        if let Some(buffer) = inner.buffer.clone() {
            let reason = reason.to_string();
            deferred.push(move || buffer.error(&reason));
        }

        inner.error = true;
        inner.error_reason = reason.to_string();
        inner.state = SourceState::Erroring;
        let _ = self.event_tx.send(SourceEvent::Error {
            reason: reason.to_string(),
        });

        self.schedule_reopen(inner);
    }

    /// After a failure: arm the reopen timer when retry is on, otherwise
    /// settle into `Closed`.
    fn schedule_reopen(&self, inner: &mut Inner) {
        if !inner.retry {
            tracing::error!(
                source = %inner.name,
                "source is not configured to automatically re-open; it will remain closed"
            );
            inner.state = SourceState::Closed;
            return;
        }

        let Some(definition) = inner.definition.as_ref().map(|d| d.raw.clone()) else {
            tracing::error!(
                source = %inner.name,
                "source has never been opened; nothing to re-open"
            );
            inner.state = SourceState::Closed;
            return;
        };

        inner.retry_attempts += 1;
        let attempt = inner.retry_attempts;
        tracing::error!(
            source = %inner.name,
            attempt,
            delay_secs = self.retry_delay.as_secs(),
            "source failed; re-open scheduled"
        );

        if let Some(timer) = inner.reopen_timer.take() {
            self.timers.remove_timer(timer);
        }

        let weak = self.weak_self.clone();
        let timer = self.timers.register_timer(
            self.retry_delay,
            Box::new(move || {
                if let Some(controller) = weak.upgrade() {
                    controller.open_interface(&definition, 0, Box::new(|_, _, _| {}));
                }
            }),
        );
        inner.reopen_timer = Some(timer);
        inner.state = SourceState::Retrying;
        let _ = self.event_tx.send(SourceEvent::Retrying { attempt });
    }
}

impl BufferReader for SourceController {
    /// Drain every complete frame currently buffered. Runs synchronously;
    /// caller completions fire between frames with the state lock released.
    fn on_bytes_available(&self, _available: usize) {
        loop {
            let mut deferred = Deferred::default();
            let mut keep_going = false;
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(buffer) = inner.buffer.clone() {
                    let peeked = buffer.peek_read(frame::MAX_FRAME_LEN);
                    match frame::decode_frame(&peeked) {
                        Ok(FrameOutcome::NeedMore) => {}
                        Ok(FrameOutcome::Frame(decoded)) => {
                            buffer.consume_read(decoded.consumed);
                            self.dispatch_frame(&mut inner, &mut deferred, decoded);
                            keep_going = !inner.error;
                        }
                        Err(e) => {
                            tracing::error!(
                                source = %inner.name,
                                error = %e,
                                "invalid control frame from capture peer, closing"
                            );
                            self.trigger_error_locked(
                                &mut inner,
                                &mut deferred,
                                "Source got invalid control frame",
                            );
                        }
                    }
                }
            }
            deferred.run();
            if !keep_going {
                break;
            }
        }
    }

    fn on_buffer_error(&self, reason: &str) {
        self.trigger_error(reason);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
