//! Seam between frame transmission and the UART driver, so the supervisor can
//! be driven against an in-memory port in tests.

use async_trait::async_trait;
use std::io;

/// Byte sink for iBUS frames
#[async_trait]
pub trait SerialPortIO: Send {
    /// Queue `data` for transmission; resolves once the driver accepted all of it
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait until queued bytes have left the driver
    async fn flush(&mut self) -> io::Result<()>;
}

/// UART opened through `tokio-serial`
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}
