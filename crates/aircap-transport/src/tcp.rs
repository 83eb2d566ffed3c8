//! TCP transport for remote capture peers.

use std::sync::Arc;

use tokio::net::TcpStream;

use aircap_core::{BufferReader, DuplexBuffer, Error, Result};

use crate::pump::StreamBuffer;

/// A [`DuplexBuffer`] over a TCP connection to a remote capture peer.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> aircap_core::Result<()> {
/// use aircap_transport::TcpTransport;
///
/// let transport = TcpTransport::connect("sensor.local:3501").await?;
/// // controller.connect_buffer(transport);
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport {
    inner: Arc<StreamBuffer>,
}

impl TcpTransport {
    /// Connect to a capture peer and start the background pumps.
    pub async fn connect(addr: &str) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Transport(format!("TCP connect to {addr} failed: {e}")))?;

        // Disable Nagle for low-latency command/response.
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = tokio::io::split(stream);
        Ok(Arc::new(TcpTransport {
            inner: StreamBuffer::start("tcp", read_half, write_half),
        }))
    }
}

impl DuplexBuffer for TcpTransport {
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
        self.inner.close(reason)
    }

    fn error(&self, reason: &str) {
        self.inner.error(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingReader {
        available: Mutex<usize>,
        errors: Mutex<Vec<String>>,
    }

    impl BufferReader for RecordingReader {
        fn on_bytes_available(&self, available: usize) {
            *self.available.lock().unwrap() = available;
        }

        fn on_buffer_error(&self, reason: &str) {
            self.errors.lock().unwrap().push(reason.to_string());
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Port 1 is essentially never listening.
        let result = TcpTransport::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn bytes_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            // Expect the client's write first.
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");

            stream.write_all(b"world!").await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        let reader = Arc::new(RecordingReader::default());
        transport.set_read_interface(reader.clone());

        transport.write(b"hello").unwrap();

        let probe = reader.clone();
        wait_until(move || *probe.available.lock().unwrap() == 6).await;
        assert_eq!(transport.peek_read(64), b"world!");

        transport.consume_read(5);
        assert_eq!(transport.peek_read(64), b"!");

        transport.close("test done");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn peer_disconnect_reports_buffer_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        let reader = Arc::new(RecordingReader::default());
        transport.set_read_interface(reader.clone());
        server.await.unwrap();

        let probe = reader.clone();
        wait_until(move || !probe.errors.lock().unwrap().is_empty()).await;
        assert_eq!(
            reader.errors.lock().unwrap()[0],
            "connection closed by peer"
        );
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        transport.close("done");
        assert!(matches!(transport.write(b"x"), Err(Error::NotConnected)));
        server.await.unwrap();
    }
}
