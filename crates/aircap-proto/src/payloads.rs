//! Typed decoders for the well-known keyed-object kinds.
//!
//! Each decoder takes the opaque bytes of one keyed object and returns a
//! typed value or a decode error whose text names the payload kind
//! (`failed to unpack <kind> bundle: <detail>`). Decoders are pure: they
//! never touch controller state or I/O, the dispatcher applies their
//! results.
//!
//! The outgoing direction lives here too: [`encode_chanhop`] builds the
//! `CHANHOP` configuration map. `DEFINITION` and `CHANSET` objects are raw
//! UTF-8 strings and need no builder.

use std::collections::BTreeMap;

use uuid::Uuid;

use aircap_core::{Error, GpsFix, Interface, Result, SignalReport, SignalScale};

use crate::kvmap::{self, Value};

/// Wire size of a `success` object: one status byte plus a `u32` sequence.
pub const SUCCESS_LEN: usize = 5;

/// A decoded `success` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessValue {
    /// Whether the command succeeded.
    pub success: bool,
    /// Sequence number of the command being answered.
    pub sequence: u32,
}

/// A decoded `message` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Human-readable message text.
    pub msg: String,
    /// Severity flag bits (see [`aircap_core::msgflag`]).
    pub flags: u32,
}

/// A decoded `chanhop` object: the hop pattern and its rate.
#[derive(Debug, Clone, PartialEq)]
pub struct HopConfig {
    /// Hops per second.
    pub rate: f64,
    /// Channels in the hop pattern.
    pub channels: Vec<String>,
}

/// A decoded `packet` object: one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Capture timestamp, whole seconds.
    pub ts_sec: u64,
    /// Capture timestamp, microsecond remainder.
    pub ts_usec: u64,
    /// Data-link type of the capture.
    pub dlt: u32,
    /// Raw capture bytes.
    pub data: Vec<u8>,
}

/// Decode a `success` object: a fixed 5-byte record.
pub fn decode_success(bytes: &[u8]) -> Result<SuccessValue> {
    if bytes.len() != SUCCESS_LEN {
        return Err(Error::Decode(format!(
            "invalid success object: expected {SUCCESS_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(SuccessValue {
        success: bytes[0] != 0,
        sequence: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
    })
}

/// Encode a `success` object.
///
/// The controller never sends one, but capture-side peers and tests do.
pub fn encode_success(success: bool, sequence: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(SUCCESS_LEN);
    out.push(success as u8);
    out.extend_from_slice(&sequence.to_be_bytes());
    out
}

/// Decode a `message` object: `{ msg: string, flags: u32 }`, both required.
pub fn decode_message(bytes: &[u8]) -> Result<MessageRecord> {
    let dict = unpack_map("message", bytes)?;
    let msg = require(&dict, "message", "msg", Value::as_str)?.to_string();
    let flags = require(&dict, "message", "flags", Value::as_u64)? as u32;
    Ok(MessageRecord { msg, flags })
}

/// Decode a `channels` object: the full supported-channel list.
pub fn decode_channels(bytes: &[u8]) -> Result<Vec<String>> {
    let dict = unpack_map("channels", bytes)?;
    let list = require(&dict, "channels", "channels", Value::as_array)?;
    string_vec("channels", list)
}

/// Decode a `chanset` object: raw bytes holding the current channel.
pub fn decode_chanset(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| unpack_error("chanset", "channel is not valid UTF-8"))
}

/// Decode a `chanhop` object: `{ channels: [string], rate: f64 }`.
pub fn decode_chanhop(bytes: &[u8]) -> Result<HopConfig> {
    let dict = unpack_map("chanhop", bytes)?;
    let list = require(&dict, "chanhop", "channels", Value::as_array)?;
    let channels = string_vec("chanhop", list)?;
    let rate = require(&dict, "chanhop", "rate", Value::as_f64)?;
    Ok(HopConfig { rate, channels })
}

/// Decode a `uuid` object: raw text parseable as a UUID.
pub fn decode_uuid(bytes: &[u8]) -> Result<Uuid> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| Uuid::parse_str(text.trim()).ok())
        .ok_or_else(|| Error::Decode("unable to parse UUID".into()))
}

/// Decode an `interfacelist` object: an array of
/// `{ interface: string, flags?: string }` maps.
pub fn decode_interface_list(bytes: &[u8]) -> Result<Vec<Interface>> {
    let items = kvmap::decode_array(bytes)
        .map_err(|e| unpack_error("interfacelist", e))?;

    let mut interfaces = Vec::with_capacity(items.len());
    for item in &items {
        let dict = item
            .as_map()
            .ok_or_else(|| unpack_error("interfacelist", "entry is not a map"))?;
        let interface = dict
            .get("interface")
            .and_then(Value::as_str)
            .ok_or_else(|| unpack_error("interfacelist", "interface missing in list response"))?;
        let flags = match dict.get("flags") {
            Some(value) => Some(
                value
                    .as_str()
                    .ok_or_else(|| unpack_error("interfacelist", "invalid 'flags' entry"))?
                    .to_string(),
            ),
            None => None,
        };
        interfaces.push(Interface {
            interface: interface.to_string(),
            flags,
        });
    }
    Ok(interfaces)
}

/// Decode a `packet` object.
///
/// `tv_sec`, `tv_usec`, `dlt`, `size`, and `packet` are all required, and
/// the declared size must match the byte length of the capture data.
pub fn decode_packet(bytes: &[u8]) -> Result<PacketRecord> {
    let dict = unpack_map("packet", bytes)?;

    let ts_sec = require(&dict, "packet", "tv_sec", Value::as_u64)?;
    let ts_usec = require(&dict, "packet", "tv_usec", Value::as_u64)?;
    let dlt_raw = require(&dict, "packet", "dlt", Value::as_u64)?;
    let dlt = u32::try_from(dlt_raw)
        .map_err(|_| unpack_error("packet", "DLT out of range"))?;
    let size = require(&dict, "packet", "size", Value::as_u64)? as usize;
    let data = require(&dict, "packet", "packet", Value::as_bytes)?;

    if data.len() != size {
        return Err(unpack_error("packet", "packet size did not match data size"));
    }

    Ok(PacketRecord {
        ts_sec,
        ts_usec,
        dlt,
        data: data.to_vec(),
    })
}

/// Decode a `signal` object. Every field is optional.
///
/// The presence of any dBm field selects the dBm scale; RSSI fields select
/// the RSSI scale only when no dBm field is present.
pub fn decode_signal(bytes: &[u8]) -> Result<SignalReport> {
    let dict = unpack_map("signal", bytes)?;

    let report = SignalReport {
        scale: None,
        signal_dbm: optional(&dict, "signal", "signal_dbm", Value::as_i32)?,
        noise_dbm: optional(&dict, "signal", "noise_dbm", Value::as_i32)?,
        signal_rssi: optional(&dict, "signal", "signal_rssi", Value::as_i32)?,
        noise_rssi: optional(&dict, "signal", "noise_rssi", Value::as_i32)?,
        freq_khz: optional(&dict, "signal", "freq_khz", Value::as_f64)?,
        channel: optional(&dict, "signal", "channel", Value::as_str)?.map(str::to_string),
        datarate: optional(&dict, "signal", "datarate", Value::as_f64)?,
    };

    let scale = if report.signal_dbm.is_some() || report.noise_dbm.is_some() {
        Some(SignalScale::Dbm)
    } else if report.signal_rssi.is_some() || report.noise_rssi.is_some() {
        Some(SignalScale::Rssi)
    } else {
        None
    };

    Ok(SignalReport { scale, ..report })
}

/// Decode a `gps` object. Every field is optional.
pub fn decode_gps(bytes: &[u8]) -> Result<GpsFix> {
    let dict = unpack_map("gps", bytes)?;

    Ok(GpsFix {
        lat: optional(&dict, "gps", "lat", Value::as_f64)?,
        lon: optional(&dict, "gps", "lon", Value::as_f64)?,
        alt: optional(&dict, "gps", "alt", Value::as_f64)?,
        speed: optional(&dict, "gps", "speed", Value::as_f64)?,
        heading: optional(&dict, "gps", "heading", Value::as_f64)?,
        precision: optional(&dict, "gps", "precision", Value::as_f64)?,
        fix: optional(&dict, "gps", "fix", Value::as_i32)?,
        time: optional(&dict, "gps", "time", Value::as_u64)?,
        name: optional(&dict, "gps", "name", Value::as_str)?.map(str::to_string),
    })
}

/// Build the outgoing `CHANHOP` payload: `{ rate, channels }`.
pub fn encode_chanhop(rate: f64, channels: &[String]) -> Vec<u8> {
    let mut entries = BTreeMap::new();
    entries.insert("rate".to_string(), Value::Float(rate));
    entries.insert(
        "channels".to_string(),
        Value::Array(channels.iter().map(|c| Value::from(c.as_str())).collect()),
    );
    kvmap::encode_map(&entries)
}

fn unpack_error(kind: &str, detail: impl std::fmt::Display) -> Error {
    Error::Decode(format!("failed to unpack {kind} bundle: {detail}"))
}

fn unpack_map(kind: &str, bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
    kvmap::decode_map(bytes).map_err(|e| unpack_error(kind, e))
}

/// Fetch a required entry, coercing through `get`.
fn require<'a, T>(
    dict: &'a BTreeMap<String, Value>,
    kind: &str,
    key: &str,
    get: impl Fn(&'a Value) -> Option<T>,
) -> Result<T> {
    match dict.get(key) {
        Some(value) => get(value).ok_or_else(|| unpack_error(kind, format!("invalid '{key}' entry"))),
        None => Err(unpack_error(kind, format!("missing '{key}' entry"))),
    }
}

/// Fetch an optional entry; a present entry of the wrong type is an error.
fn optional<'a, T>(
    dict: &'a BTreeMap<String, Value>,
    kind: &str,
    key: &str,
    get: impl Fn(&'a Value) -> Option<T>,
) -> Result<Option<T>> {
    match dict.get(key) {
        Some(value) => get(value)
            .map(Some)
            .ok_or_else(|| unpack_error(kind, format!("invalid '{key}' entry"))),
        None => Ok(None),
    }
}

fn string_vec(kind: &str, list: &[Value]) -> Result<Vec<String>> {
    list.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| unpack_error(kind, "channel entry is not a string"))
        })
        .collect()
}
