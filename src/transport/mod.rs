//! Byte transports the session runs over.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod serial;

pub use memory::{memory_pair, DeviceEnd, MemoryTransport};
pub use serial::{list_ports, SerialTransport};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
    #[error("transport already opened")]
    AlreadyOpen,
}

/// Read side of an open transport.
#[async_trait]
pub trait ChunkReader: Send {
    /// Read whatever is available. `Ok(0)` means end of stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Write side of an open transport.
#[async_trait]
pub trait ChunkWriter: Send {
    async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

pub struct TransportHalves {
    pub reader: Box<dyn ChunkReader>,
    pub writer: Box<dyn ChunkWriter>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<TransportHalves, TransportError>;

    /// Human-readable endpoint, used in logs.
    fn describe(&self) -> String;
}
