use std::sync::Arc;

use async_trait::async_trait;
use serial2_tokio::SerialPort;

use super::{ChunkReader, ChunkWriter, Transport, TransportError, TransportHalves};

/// Serial device paths the OS reports.
pub fn list_ports() -> Vec<String> {
    match SerialPort::available_ports() {
        Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
        Err(e) => {
            tracing::warn!("Could not enumerate serial ports: {}", e);
            vec![]
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerialTransport {
    pub port: String,
    pub baud: u32,
}

impl SerialTransport {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self { port: port.into(), baud }
    }
}

struct SerialReader(Arc<SerialPort>);

struct SerialWriter(Arc<SerialPort>);

#[async_trait]
impl ChunkReader for SerialReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.0.read(buf).await?)
    }
}

#[async_trait]
impl ChunkWriter for SerialWriter {
    async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            let n = self.0.write(&bytes[written..]).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            written += n;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The port closes when the reader drops its handle too.
        Ok(())
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> Result<TransportHalves, TransportError> {
        let port = Arc::new(SerialPort::open(&self.port, self.baud)?);
        tracing::info!("Opened serial port {} at {} baud", self.port, self.baud);
        Ok(TransportHalves {
            reader: Box::new(SerialReader(port.clone())),
            writer: Box::new(SerialWriter(port)),
        })
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud)
    }
}
