//! aircap-proto: the capture control/data wire protocol.
//!
//! Three layers, outermost first:
//!
//! - [`frame`] -- the frame envelope: signature, Adler-32 checksum, sequence
//!   number, NUL-padded type tag, and a run of keyed objects. Pure byte-slice
//!   codec with streaming (`NeedMore`) decode.
//! - [`kvmap`] -- the self-describing named-map encoding used inside map- and
//!   array-typed keyed objects (string/integer/float/binary/array/map
//!   primitives, big-endian).
//! - [`payloads`] -- typed decoders for each well-known keyed-object kind
//!   (`success`, `message`, `channels`, `chanset`, `chanhop`, `uuid`,
//!   `interfacelist`, `packet`, `signal`, `gps`) and builders for the
//!   outgoing configuration payloads.
//!
//! All functions here are I/O-free; the controller in `aircap-source` wires
//! them to a transport.

pub mod frame;
pub mod kvmap;
pub mod payloads;

pub use frame::{DecodedFrame, FrameOutcome, decode_frame, encode_frame, ENVELOPE_LEN, FRAME_SIGNATURE};
pub use kvmap::Value;
