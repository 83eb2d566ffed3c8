//! In-memory duplex buffer for controller tests.
//!
//! [`MockBuffer`] implements the [`DuplexBuffer`] contract entirely in
//! memory: tests inject incoming bytes with [`inject`](MockBuffer::inject)
//! (which drives the registered reader synchronously, exactly like a
//! transport pump would) and inspect everything the controller wrote.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use aircap_test_harness::MockBuffer;
//!
//! let mock = MockBuffer::new();
//! // controller.connect_buffer(mock.clone());
//! // mock.inject(&response_frame);
//! // assert_eq!(mock.written().len(), 1);
//! # let _: Arc<MockBuffer> = mock;
//! ```

use std::sync::{Arc, Mutex};

use aircap_core::{BufferReader, DuplexBuffer, Error, Result};

#[derive(Default)]
struct State {
    read: Vec<u8>,
    written: Vec<Vec<u8>>,
    reader: Option<Arc<dyn BufferReader>>,
    fail_writes: bool,
    closed: bool,
    close_reason: Option<String>,
    error_reason: Option<String>,
}

/// A scripted [`DuplexBuffer`].
///
/// Writes fail once the buffer is closed or after
/// [`set_fail_writes`](MockBuffer::set_fail_writes). An
/// [`error`](DuplexBuffer::error) teardown records its reason but leaves
/// the pipe usable, mirroring a transport that survives a protocol fault
/// and can carry the scheduled reopen.
pub struct MockBuffer {
    state: Mutex<State>,
}

impl MockBuffer {
    /// Create a new, open mock buffer.
    pub fn new() -> Arc<Self> {
        Arc::new(MockBuffer {
            state: Mutex::new(State::default()),
        })
    }

    /// Append incoming bytes and notify the registered reader, as a
    /// transport read pump would.
    pub fn inject(&self, bytes: &[u8]) {
        let (reader, available) = {
            let mut state = self.state.lock().unwrap();
            state.read.extend_from_slice(bytes);
            (state.reader.clone(), state.read.len())
        };
        if let Some(reader) = reader {
            reader.on_bytes_available(available);
        }
    }

    /// Report a transport failure to the registered reader.
    pub fn raise_error(&self, reason: &str) {
        let reader = self.state.lock().unwrap().reader.clone();
        if let Some(reader) = reader {
            reader.on_buffer_error(reason);
        }
    }

    /// Everything written so far, one entry per `write` call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }

    /// Drain and return everything written so far.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().unwrap().written)
    }

    /// Make subsequent writes fail, simulating a full or broken pipe.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Unconsumed bytes remaining in the read buffer.
    pub fn buffered_len(&self) -> usize {
        self.state.lock().unwrap().read.len()
    }

    /// Whether [`close`](DuplexBuffer::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// The reason passed to [`close`](DuplexBuffer::close), if any.
    pub fn close_reason(&self) -> Option<String> {
        self.state.lock().unwrap().close_reason.clone()
    }

    /// The reason passed to [`error`](DuplexBuffer::error), if any.
    pub fn error_reason(&self) -> Option<String> {
        self.state.lock().unwrap().error_reason.clone()
    }
}

impl DuplexBuffer for MockBuffer {
    fn set_read_interface(&self, reader: Arc<dyn BufferReader>) {
        self.state.lock().unwrap().reader = Some(reader);
    }

    fn peek_read(&self, max: usize) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let n = state.read.len().min(max);
        state.read[..n].to_vec()
    }

    fn consume_read(&self, amount: usize) {
        let mut state = self.state.lock().unwrap();
        let n = state.read.len().min(amount);
        state.read.drain(..n);
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::NotConnected);
        }
        if state.fail_writes {
            return Err(Error::WriteFailed("mock write failure".into()));
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }

    fn close(&self, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.close_reason = Some(reason.to_string());
    }

    fn error(&self, reason: &str) {
        self.state.lock().unwrap().error_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_and_consume() {
        let mock = MockBuffer::new();
        mock.inject(&[1, 2, 3, 4]);

        assert_eq!(mock.peek_read(2), vec![1, 2]);
        assert_eq!(mock.peek_read(10), vec![1, 2, 3, 4]);
        assert_eq!(mock.buffered_len(), 4);

        mock.consume_read(3);
        assert_eq!(mock.peek_read(10), vec![4]);
        assert_eq!(mock.buffered_len(), 1);
    }

    #[test]
    fn writes_are_recorded_and_drainable() {
        let mock = MockBuffer::new();
        mock.write(&[0xAA]).unwrap();
        mock.write(&[0xBB, 0xCC]).unwrap();

        assert_eq!(mock.written(), vec![vec![0xAA], vec![0xBB, 0xCC]]);
        assert_eq!(mock.take_written().len(), 2);
        assert!(mock.written().is_empty());
    }

    #[test]
    fn write_fails_after_close() {
        let mock = MockBuffer::new();
        mock.close("done");
        assert!(mock.is_closed());
        assert_eq!(mock.close_reason().as_deref(), Some("done"));
        assert!(matches!(mock.write(&[1]), Err(Error::NotConnected)));
    }

    #[test]
    fn forced_write_failure() {
        let mock = MockBuffer::new();
        mock.set_fail_writes(true);
        assert!(matches!(mock.write(&[1]), Err(Error::WriteFailed(_))));
        mock.set_fail_writes(false);
        assert!(mock.write(&[1]).is_ok());
    }

    #[test]
    fn error_records_reason_but_keeps_pipe_usable() {
        let mock = MockBuffer::new();
        mock.error("bad frame");
        assert_eq!(mock.error_reason().as_deref(), Some("bad frame"));
        assert!(!mock.is_closed());
        assert!(mock.write(&[1]).is_ok());
    }

    #[test]
    fn inject_without_reader_only_buffers() {
        let mock = MockBuffer::new();
        mock.inject(&[9, 9]);
        assert_eq!(mock.buffered_len(), 2);
    }
}
