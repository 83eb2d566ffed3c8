//! Shared read/write pump behind both transports.
//!
//! [`StreamBuffer`] adapts any split `AsyncRead`/`AsyncWrite` pair to the
//! [`DuplexBuffer`] contract: a spawned read pump appends incoming bytes to
//! a [`BytesMut`] and notifies the registered reader, and a spawned write
//! pump drains an unbounded queue into the write half. The reader callback
//! is always invoked with the internal lock released.

use std::sync::{Arc, Mutex};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use aircap_core::{BufferReader, DuplexBuffer, Error, Result};

const READ_CHUNK: usize = 8192;

struct State {
    read: BytesMut,
    reader: Option<Arc<dyn BufferReader>>,
    closed: bool,
}

pub(crate) struct StreamBuffer {
    label: &'static str,
    state: Mutex<State>,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl StreamBuffer {
    /// Wrap the halves of a stream and start both pumps.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn start<R, W>(label: &'static str, read_half: R, write_half: W) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let buffer = Arc::new(StreamBuffer {
            label,
            state: Mutex::new(State {
                read: BytesMut::new(),
                reader: None,
                closed: false,
            }),
            write_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let read_task = tokio::spawn(read_pump(Arc::clone(&buffer), read_half));
        let write_task = tokio::spawn(write_pump(label, write_half, write_rx));
        buffer.tasks.lock().unwrap().extend([read_task, write_task]);

        buffer
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            state.reader = None;
        }
        // Aborting the write pump drops the write half, which closes the
        // stream; the read pump then sees EOF or is aborted here first.
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl DuplexBuffer for StreamBuffer {
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
        state.read.advance(n);
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        self.write_tx
            .send(bytes.to_vec())
            .map_err(|_| Error::WriteFailed("write queue is gone".into()))
    }

    fn close(&self, reason: &str) {
        tracing::debug!(transport = self.label, reason, "closing transport");
        self.shutdown();
    }

    fn error(&self, reason: &str) {
        tracing::warn!(transport = self.label, reason, "tearing down transport");
        self.shutdown();
    }
}

async fn read_pump<R>(buffer: Arc<StreamBuffer>, mut read_half: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                let reader = {
                    let state = buffer.state.lock().unwrap();
                    if state.closed { None } else { state.reader.clone() }
                };
                if let Some(reader) = reader {
                    reader.on_buffer_error("connection closed by peer");
                }
                break;
            }
            Ok(n) => {
                let (reader, available) = {
                    let mut state = buffer.state.lock().unwrap();
                    state.read.extend_from_slice(&chunk[..n]);
                    (state.reader.clone(), state.read.len())
                };
                if let Some(reader) = reader {
                    reader.on_bytes_available(available);
                }
            }
            Err(e) => {
                let reader = {
                    let state = buffer.state.lock().unwrap();
                    if state.closed { None } else { state.reader.clone() }
                };
                if let Some(reader) = reader {
                    reader.on_buffer_error(&format!("read failed: {e}"));
                }
                break;
            }
        }
    }
}

async fn write_pump<W>(
    label: &'static str,
    mut write_half: W,
    mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(chunk) = write_rx.recv().await {
        if let Err(e) = write_half.write_all(&chunk).await {
            tracing::debug!(transport = label, error = %e, "write pump stopping");
            break;
        }
        if write_half.flush().await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
