//! Child-process transport for local capture helpers.
//!
//! A local capture source is a helper binary speaking the capture protocol
//! on its stdio: commands go to the child's stdin, frames come back on its
//! stdout. Closing the transport kills the child.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::process::{Child, Command};

use aircap_core::{BufferReader, DuplexBuffer, Error, Result};

use crate::pump::StreamBuffer;

/// A [`DuplexBuffer`] over the piped stdio of a spawned capture helper.
pub struct ChildProcessTransport {
    inner: Arc<StreamBuffer>,
    child: Mutex<Option<Child>>,
}

impl ChildProcessTransport {
    /// Spawn `program` with `args` and bind its stdio.
    ///
    /// stderr is discarded; capture helpers report through `message`
    /// frames, not their stderr.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Arc<Self>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to launch '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("child stdout unavailable".into()))?;

        tracing::debug!(program, pid = child.id(), "capture helper launched");

        Ok(Arc::new(ChildProcessTransport {
            inner: StreamBuffer::start("ipc", stdout, stdin),
            child: Mutex::new(Some(child)),
        }))
    }

    fn kill_child(&self) {
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.start_kill();
        }
    }
}

impl DuplexBuffer for ChildProcessTransport {
    fn set_read_interface(&self, reader: Arc<dyn BufferReader>) {
        self.inner.set_read_interface(reader);
    }

    fn peek_read(&self, max: usize) -> Vec<u8> {
        self.inner.peek_read(max)
    }

    fn consume_read(&self, amount: usize) {
        self.inner.consume_read(amount)
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.inner.write(bytes)
    }

    fn close(&self, reason: &str) {
        self.inner.close(reason);
        self.kill_child();
    }

    fn error(&self, reason: &str) {
        self.inner.error(reason);
        self.kill_child();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingReader {
        available: Mutex<usize>,
    }

    impl BufferReader for RecordingReader {
        fn on_bytes_available(&self, available: usize) {
            *self.available.lock().unwrap() = available;
        }

        fn on_buffer_error(&self, _reason: &str) {}
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let result = ChildProcessTransport::spawn("/nonexistent/capture-helper", &[]);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn cat_echoes_written_bytes() {
        let transport = ChildProcessTransport::spawn("cat", &[]).expect("cat should spawn");
        let reader = Arc::new(RecordingReader::default());
        transport.set_read_interface(reader.clone());

        transport.write(b"ping").unwrap();

        let mut seen = 0;
        for _ in 0..200 {
            seen = *reader.available.lock().unwrap();
            if seen == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(seen, 4);
        assert_eq!(transport.peek_read(16), b"ping");

        transport.close("test done");
        assert!(matches!(transport.write(b"x"), Err(Error::NotConnected)));
    }
}
