//! Frame envelope codec.
//!
//! Every control and data message travels in one frame:
//!
//! ```text
//! 0                   4                   8
//! ┌───────────────────┬───────────────────┬───────────────────┐
//! │ signature (u32)   │ checksum (u32)    │ sequence (u32)    │
//! ├───────────────────┴───────────────────┴───────────────────┤
//! │ type (16 bytes, NUL-padded ASCII)                         │
//! ├───────────────────┬───────────────────┬───────────────────┤
//! │ length (u32)      │ num_kv (u32)      │ keyed objects...  │
//! └───────────────────┴───────────────────┴───────────────────┘
//! ```
//!
//! All integers are big-endian. `length` covers the whole frame including
//! the 36-byte envelope. The checksum is Adler-32 computed over the whole
//! frame with the checksum field zeroed. Each keyed object is a 16-byte
//! NUL-padded key, a `u32` object size, and that many opaque bytes.
//!
//! Decoding is streaming: callers peek their read buffer and get
//! [`FrameOutcome::NeedMore`] until a complete frame is buffered. Framing
//! violations (bad signature, bad checksum, bogus length, truncated keyed
//! objects) are errors and fatal to the session.

use std::collections::{BTreeMap, HashMap};

use aircap_core::{Error, Result};

/// Protocol signature opening every frame.
pub const FRAME_SIGNATURE: u32 = 0xDECA_FBAD;

/// Envelope header size in bytes.
pub const ENVELOPE_LEN: usize = 36;

/// Keyed-object header size in bytes (16-byte key + u32 object size).
pub const KV_HEADER_LEN: usize = 20;

/// Width of the NUL-padded type and key fields.
pub const TAG_LEN: usize = 16;

/// Upper bound on a single frame. Anything larger is treated as a framing
/// error rather than an instruction to buffer without limit.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A completely decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Bytes consumed from the read buffer (the frame's `length`).
    pub consumed: usize,
    /// Type tag with trailing NULs stripped, original case preserved.
    pub type_tag: String,
    /// Envelope sequence number.
    pub sequence: u32,
    /// Keyed objects by lowercased key; duplicate keys collapse last-wins.
    pub objects: HashMap<String, Vec<u8>>,
}

/// Result of attempting to decode one frame from a peeked buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The buffer does not yet hold a complete frame; consume nothing.
    NeedMore,
    /// One frame decoded; consume [`DecodedFrame::consumed`] bytes.
    Frame(DecodedFrame),
}

/// Decode one frame from the front of `buf`.
///
/// Returns [`FrameOutcome::NeedMore`] when the buffer holds less than a
/// complete frame, and an [`Error::Framing`] when the buffered bytes can
/// never form a valid frame.
pub fn decode_frame(buf: &[u8]) -> Result<FrameOutcome> {
    if buf.len() < ENVELOPE_LEN {
        return Ok(FrameOutcome::NeedMore);
    }

    let signature = read_u32(buf, 0);
    if signature != FRAME_SIGNATURE {
        return Err(Error::Framing(format!(
            "bad signature {signature:#010x}, expected {FRAME_SIGNATURE:#010x}"
        )));
    }

    let length = read_u32(buf, 28) as usize;
    if length < ENVELOPE_LEN {
        return Err(Error::Framing(format!(
            "frame length {length} smaller than the envelope"
        )));
    }
    if length > MAX_FRAME_LEN {
        return Err(Error::Framing(format!(
            "frame length {length} exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }
    if length > buf.len() {
        return Ok(FrameOutcome::NeedMore);
    }

    // Verify the checksum over a copy with the checksum field zeroed.
    let wire_checksum = read_u32(buf, 4);
    let mut copy = buf[..length].to_vec();
    copy[4..8].fill(0);
    let calc_checksum = adler::adler32_slice(&copy);
    if calc_checksum != wire_checksum {
        return Err(Error::Framing(format!(
            "checksum mismatch: frame {wire_checksum:#010x}, computed {calc_checksum:#010x}"
        )));
    }

    let sequence = read_u32(buf, 8);
    let type_tag = decode_tag(&buf[12..12 + TAG_LEN])?;
    let num_kv = read_u32(buf, 32);

    let mut objects = HashMap::new();
    let mut pos = ENVELOPE_LEN;
    for _ in 0..num_kv {
        if pos + KV_HEADER_LEN > length {
            return Err(Error::Framing("truncated keyed-object header".into()));
        }
        let key = decode_tag(&buf[pos..pos + TAG_LEN])?.to_ascii_lowercase();
        let obj_size = read_u32(buf, pos + TAG_LEN) as usize;
        pos += KV_HEADER_LEN;

        if pos + obj_size > length {
            return Err(Error::Framing(format!(
                "keyed object '{key}' overruns the frame"
            )));
        }
        objects.insert(key, buf[pos..pos + obj_size].to_vec());
        pos += obj_size;
    }

    Ok(FrameOutcome::Frame(DecodedFrame {
        consumed: length,
        type_tag,
        sequence,
        objects,
    }))
}

/// Encode a frame carrying `objects` under the given type tag and sequence
/// number.
///
/// Keys longer than 16 bytes are truncated on emission; iteration order of
/// the map fixes the object order (not semantically observable by
/// receivers).
pub fn encode_frame(type_tag: &str, sequence: u32, objects: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let kv_len: usize = objects.values().map(|obj| KV_HEADER_LEN + obj.len()).sum();
    let length = ENVELOPE_LEN + kv_len;

    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&FRAME_SIGNATURE.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // checksum, patched below
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&encode_tag(type_tag));
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    for (key, obj) in objects {
        buf.extend_from_slice(&encode_tag(key));
        buf.extend_from_slice(&(obj.len() as u32).to_be_bytes());
        buf.extend_from_slice(obj);
    }

    let checksum = adler::adler32_slice(&buf);
    buf[4..8].copy_from_slice(&checksum.to_be_bytes());

    buf
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// NUL-pad (or truncate) a tag to its 16-byte wire field.
fn encode_tag(tag: &str) -> [u8; TAG_LEN] {
    let mut out = [0u8; TAG_LEN];
    let bytes = tag.as_bytes();
    let n = bytes.len().min(TAG_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Strip trailing NULs from a 16-byte tag field and require ASCII.
fn decode_tag(raw: &[u8]) -> Result<String> {
    let end = raw
        .iter()
        .rposition(|&b| b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let trimmed = &raw[..end];
    if !trimmed.is_ascii() {
        return Err(Error::Framing("non-ASCII tag field".into()));
    }
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(entries: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    fn decode_one(buf: &[u8]) -> DecodedFrame {
        match decode_frame(buf).unwrap() {
            FrameOutcome::Frame(frame) => frame,
            FrameOutcome::NeedMore => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn round_trip_empty_frame() {
        let buf = encode_frame("LISTDEVICE", 42, &BTreeMap::new());
        assert_eq!(buf.len(), ENVELOPE_LEN);

        let frame = decode_one(&buf);
        assert_eq!(frame.consumed, buf.len());
        assert_eq!(frame.type_tag, "LISTDEVICE");
        assert_eq!(frame.sequence, 42);
        assert!(frame.objects.is_empty());
    }

    #[test]
    fn round_trip_with_objects_lowercases_keys() {
        let buf = encode_frame(
            "PROBEDEVICE",
            7,
            &kv(&[("DEFINITION", b"wlan0:name=mon"), ("EXTRA", &[0x00, 0x01])]),
        );

        let frame = decode_one(&buf);
        assert_eq!(frame.type_tag, "PROBEDEVICE");
        assert_eq!(frame.objects.len(), 2);
        assert_eq!(
            frame.objects.get("definition").map(Vec::as_slice),
            Some(b"wlan0:name=mon".as_slice())
        );
        assert_eq!(
            frame.objects.get("extra").map(Vec::as_slice),
            Some([0x00, 0x01].as_slice())
        );
    }

    #[test]
    fn need_more_for_every_short_prefix() {
        let buf = encode_frame("CONFIGURE", 9, &kv(&[("CHANSET", b"6")]));
        for end in 0..buf.len() {
            assert_eq!(
                decode_frame(&buf[..end]).unwrap(),
                FrameOutcome::NeedMore,
                "prefix of {end} bytes should be incomplete"
            );
        }
        assert!(matches!(
            decode_frame(&buf).unwrap(),
            FrameOutcome::Frame(_)
        ));
    }

    #[test]
    fn bad_signature_is_fatal() {
        let mut buf = encode_frame("LISTDEVICE", 1, &BTreeMap::new());
        buf[0] ^= 0xFF;
        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("bad signature"));
    }

    #[test]
    fn flipped_payload_bit_fails_checksum() {
        let mut buf = encode_frame("CONFIGURE", 3, &kv(&[("CHANSET", b"11")]));
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn flipped_checksum_bit_fails_checksum() {
        let mut buf = encode_frame("CONFIGURE", 3, &kv(&[("CHANSET", b"11")]));
        buf[5] ^= 0x10;
        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn length_below_envelope_is_fatal() {
        let mut buf = encode_frame("LISTDEVICE", 1, &BTreeMap::new());
        buf[28..32].copy_from_slice(&8u32.to_be_bytes());
        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("smaller than the envelope"));
    }

    #[test]
    fn oversized_length_is_fatal_not_need_more() {
        let mut buf = encode_frame("LISTDEVICE", 1, &BTreeMap::new());
        buf[28..32].copy_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn keyed_object_overrunning_frame_is_fatal() {
        // Hand-build a frame whose single kv claims more bytes than remain.
        let mut buf = Vec::new();
        buf.extend_from_slice(&FRAME_SIGNATURE.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&encode_tag("DATA"));
        let length = (ENVELOPE_LEN + KV_HEADER_LEN + 2) as u32;
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&encode_tag("packet"));
        buf.extend_from_slice(&100u32.to_be_bytes()); // claims 100, only 2 present
        buf.extend_from_slice(&[0xAB, 0xCD]);
        let checksum = adler::adler32_slice(&buf);
        buf[4..8].copy_from_slice(&checksum.to_be_bytes());

        let err = decode_frame(&buf).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn duplicate_keys_collapse_last_wins() {
        // Two objects under the same key (differing only in case); the map
        // used by encode_frame can't express this, so hand-build the frame.
        let mut buf = Vec::new();
        buf.extend_from_slice(&FRAME_SIGNATURE.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(&encode_tag("CONFIGRESP"));
        let length = (ENVELOPE_LEN + 2 * (KV_HEADER_LEN + 1)) as u32;
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&encode_tag("CHANSET"));
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(b'1');
        buf.extend_from_slice(&encode_tag("chanset"));
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(b'6');
        let checksum = adler::adler32_slice(&buf);
        buf[4..8].copy_from_slice(&checksum.to_be_bytes());

        let frame = decode_one(&buf);
        assert_eq!(frame.objects.len(), 1);
        assert_eq!(
            frame.objects.get("chanset").map(Vec::as_slice),
            Some(b"6".as_slice())
        );
    }

    #[test]
    fn long_type_tag_is_truncated_to_field_width() {
        let buf = encode_frame("ABCDEFGHIJKLMNOPQRST", 1, &BTreeMap::new());
        let frame = decode_one(&buf);
        assert_eq!(frame.type_tag, "ABCDEFGHIJKLMNOP");
        assert_eq!(frame.type_tag.len(), TAG_LEN);
    }

    #[test]
    fn back_to_back_frames_decode_sequentially() {
        let mut stream = encode_frame("OPENRESP", 1, &kv(&[("CHANSET", b"6")]));
        let second = encode_frame("DATA", 2, &BTreeMap::new());
        stream.extend_from_slice(&second);

        let first = decode_one(&stream);
        assert_eq!(first.type_tag, "OPENRESP");

        let rest = &stream[first.consumed..];
        let next = decode_one(rest);
        assert_eq!(next.type_tag, "DATA");
        assert_eq!(next.sequence, 2);
        assert_eq!(first.consumed + next.consumed, stream.len());
    }
}
