//! Error types for aircap.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, framing-layer, and
//! payload-layer errors are all captured here.

/// The error type for all aircap operations.
///
/// Variants cover the failure modes encountered when driving a capture
/// source: physical transport failures, invalid control frames, malformed
/// keyed-object payloads, and unsupported driver capabilities.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (socket, pipe, child process).
    #[error("transport error: {0}")]
    Transport(String),

    /// An invalid control frame (bad signature, bad checksum, bogus length).
    ///
    /// Framing errors are fatal for the session: the peer is either not
    /// speaking the capture protocol or the stream has been corrupted.
    #[error("invalid control frame: {0}")]
    Framing(String),

    /// A keyed-object payload failed to decode.
    #[error("{0}")]
    Decode(String),

    /// The driver is not capable of the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The textual source definition could not be parsed.
    #[error("malformed source definition: {0}")]
    InvalidDefinition(String),

    /// No transport buffer is bound to the controller.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be handed to the transport write path.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("pipe closed".into());
        assert_eq!(e.to_string(), "transport error: pipe closed");
    }

    #[test]
    fn error_display_framing() {
        let e = Error::Framing("bad signature".into());
        assert_eq!(e.to_string(), "invalid control frame: bad signature");
    }

    #[test]
    fn error_display_decode_is_bare() {
        // Decode carries the full "failed to unpack ..." text produced by
        // the payload decoders, so Display adds no prefix.
        let e = Error::Decode("failed to unpack message bundle: missing 'msg' entry".into());
        assert_eq!(
            e.to_string(),
            "failed to unpack message bundle: missing 'msg' entry"
        );
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("channel tuning".into());
        assert_eq!(e.to_string(), "unsupported operation: channel tuning");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
