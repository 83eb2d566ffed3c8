//! Core types used throughout aircap.
//!
//! These types are shared between the protocol engine, the controller, and
//! downstream consumers: driver capability flags, listed-interface entries,
//! and the decoded signal/GPS records attached to captured packets.

/// Capability flags for a capture driver.
///
/// Populated by the driver's builder before the controller is constructed.
/// Every public controller operation checks the matching flag before
/// emitting anything on the wire; an unsupported operation fails the
/// caller's completion synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCapabilities {
    /// Driver can enumerate capturable interfaces (`LISTDEVICE`).
    pub list_capable: bool,
    /// Driver can probe whether a definition is usable (`PROBEDEVICE`).
    pub probe_capable: bool,
    /// Driver can open a local capture (`OPENDEVICE`).
    pub local_capable: bool,
    /// Driver can tune channels and configure hopping (`CONFIGURE`).
    pub tune_capable: bool,
}

/// One entry in an interface-list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// System interface name (e.g. `wlan0`).
    pub interface: String,
    /// Optional driver-specific flags (e.g. `monitor`).
    pub flags: Option<String>,
}

impl Interface {
    /// Create an interface entry with no flags.
    pub fn new(interface: impl Into<String>) -> Self {
        Interface {
            interface: interface.into(),
            flags: None,
        }
    }

    /// Create an interface entry with flags.
    pub fn with_flags(interface: impl Into<String>, flags: impl Into<String>) -> Self {
        Interface {
            interface: interface.into(),
            flags: Some(flags.into()),
        }
    }
}

/// Which scale a signal report is expressed in.
///
/// Radios report either calibrated dBm or an uncalibrated RSSI; the two are
/// not comparable, so the scale travels with the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScale {
    /// Calibrated decibel-milliwatts.
    Dbm,
    /// Relative, driver-specific signal units.
    Rssi,
}

/// Radio-layer signal data decoded from a `signal` keyed object.
///
/// All fields are optional; absent fields were simply not reported by the
/// capture driver. When both dBm and RSSI fields are present, dBm wins and
/// sets [`scale`](SignalReport::scale).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalReport {
    /// Scale selected by the fields present in the report.
    pub scale: Option<SignalScale>,
    /// Signal strength in dBm.
    pub signal_dbm: Option<i32>,
    /// Noise floor in dBm.
    pub noise_dbm: Option<i32>,
    /// Signal strength in driver RSSI units.
    pub signal_rssi: Option<i32>,
    /// Noise floor in driver RSSI units.
    pub noise_rssi: Option<i32>,
    /// Center frequency in kHz.
    pub freq_khz: Option<f64>,
    /// Logical channel the packet was seen on.
    pub channel: Option<String>,
    /// Data rate in Mbit/s.
    pub datarate: Option<f64>,
}

/// GPS location data decoded from a `gps` keyed object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsFix {
    /// Latitude in decimal degrees.
    pub lat: Option<f64>,
    /// Longitude in decimal degrees.
    pub lon: Option<f64>,
    /// Altitude in meters.
    pub alt: Option<f64>,
    /// Speed in m/s.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// Horizontal precision estimate in meters.
    pub precision: Option<f64>,
    /// Fix quality (2 = 2D, 3 = 3D).
    pub fix: Option<i32>,
    /// Fix timestamp, seconds since the Unix epoch.
    pub time: Option<u64>,
    /// Name of the reporting GPS device.
    pub name: Option<String>,
}

/// Severity flag bits carried by `message` keyed objects.
pub mod msgflag {
    /// Debug chatter.
    pub const DEBUG: u32 = 0x01;
    /// Informational.
    pub const INFO: u32 = 0x02;
    /// Recoverable error.
    pub const ERROR: u32 = 0x04;
    /// Alert requiring operator attention.
    pub const ALERT: u32 = 0x08;
    /// Fatal condition.
    pub const FATAL: u32 = 0x10;
}

/// Emit a peer-supplied message to the host log channel at the severity
/// encoded in `flags`.
///
/// Unknown or zero flags log at info.
pub fn log_message(text: &str, flags: u32) {
    if flags & (msgflag::ERROR | msgflag::ALERT | msgflag::FATAL) != 0 {
        tracing::error!(flags, "{text}");
    } else if flags & msgflag::DEBUG != 0 {
        tracing::debug!(flags, "{text}");
    } else {
        tracing::info!(flags, "{text}");
    }
}
