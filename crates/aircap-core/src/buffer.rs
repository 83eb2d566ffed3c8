//! The duplex byte-buffer contract between a transport and the controller.
//!
//! A [`DuplexBuffer`] abstracts the stream carrying the capture protocol: a
//! TCP socket to a remote capture peer, the piped stdio of a child capture
//! process, or an in-memory mock for testing. Transports own the buffering;
//! the controller only peeks, consumes, and writes.
//!
//! The read side is push-driven: the transport invokes
//! [`BufferReader::on_bytes_available`] on the registered reader whenever
//! new bytes have been buffered, and the reader peeks/consumes whole frames
//! synchronously. Partial frames stay buffered until more bytes arrive.

use std::sync::Arc;

use crate::error::Result;

/// Read-side callbacks implemented by the controller.
///
/// Both methods must run to completion without blocking; they are invoked
/// from the transport's pump task.
pub trait BufferReader: Send + Sync {
    /// New bytes have arrived; `available` is the total number of buffered,
    /// unconsumed bytes.
    fn on_bytes_available(&self, available: usize);

    /// The transport failed (connection lost, child died, pipe closed).
    fn on_buffer_error(&self, reason: &str);
}

/// A duplex byte buffer carrying the capture protocol.
///
/// Writes are enqueued and flushed by the transport in the background;
/// [`write`](DuplexBuffer::write) never blocks on the peer. Reads are
/// peek/consume so the controller can leave an incomplete frame in place.
pub trait DuplexBuffer: Send + Sync {
    /// Register the reader to be notified of buffered bytes and transport
    /// errors. Must be called before data can be dispatched.
    fn set_read_interface(&self, reader: Arc<dyn BufferReader>);

    /// Copy up to `max` buffered bytes without consuming them.
    fn peek_read(&self, max: usize) -> Vec<u8>;

    /// Discard `amount` bytes from the front of the read buffer.
    fn consume_read(&self, amount: usize);

    /// Enqueue `bytes` for transmission. Returns an error if the transport
    /// is closed or its write queue is gone.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Close the transport in an orderly fashion.
    fn close(&self, reason: &str);

    /// Tear the transport down after a protocol-level failure.
    fn error(&self, reason: &str);
}
