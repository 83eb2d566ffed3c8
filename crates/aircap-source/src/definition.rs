//! Textual source-definition parsing.
//!
//! A capture source is named by a definition string of the form
//! `interface[:opt=val,opt=val,...]`, e.g. `wlan0:name=roof,retry=true`.
//! Option keys are case-insensitive; values are taken verbatim (whitespace
//! is not stripped). Unknown options are preserved for the capture-side
//! consumer, which receives the raw definition on the wire.

use std::collections::HashMap;
use std::str::FromStr;

use uuid::Uuid;

use aircap_core::Error;

/// A parsed source definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefinition {
    /// The definition exactly as given; this is what travels on the wire.
    pub raw: String,
    /// The capture interface (the part before the first `:`).
    pub interface: String,
    /// Display name: the `name=` option, defaulting to the interface.
    pub name: String,
    /// Explicit UUID from the `uuid=` option. When present, the controller
    /// is locally UUID-defined and ignores UUIDs reported by the peer.
    pub uuid: Option<Uuid>,
    /// The `retry=` option, when given.
    pub retry: Option<bool>,
    /// Every option pair, keys lowercased, unknown options included.
    pub options: HashMap<String, String>,
}

impl FromStr for SourceDefinition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (interface, tail) = match s.split_once(':') {
            Some((interface, tail)) => (interface, Some(tail)),
            None => (s, None),
        };

        if interface.is_empty() {
            return Err(Error::InvalidDefinition("empty interface".into()));
        }

        let mut options = HashMap::new();
        if let Some(tail) = tail {
            if !tail.is_empty() {
                for pair in tail.split(',') {
                    let (key, value) = pair.split_once('=').ok_or_else(|| {
                        Error::InvalidDefinition(format!("option '{pair}' is not key=value"))
                    })?;
                    options.insert(key.to_ascii_lowercase(), value.to_string());
                }
            }
        }

        let name = options
            .get("name")
            .cloned()
            .unwrap_or_else(|| interface.to_string());

        let uuid = match options.get("uuid") {
            Some(text) => Some(
                Uuid::parse_str(text)
                    .map_err(|_| Error::InvalidDefinition(format!("invalid UUID '{text}'")))?,
            ),
            None => None,
        };

        let retry = options.get("retry").map(|v| parse_bool(v));

        Ok(SourceDefinition {
            raw: s.to_string(),
            interface: interface.to_string(),
            name,
            uuid,
            retry,
            options,
        })
    }
}

/// Lenient boolean parsing for option values; unrecognized text reads as
/// true.
fn parse_bool(value: &str) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "false" | "f" | "0" | "no" | "n" => false,
        _ => true,
    }
}
