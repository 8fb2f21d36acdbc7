//! In-process transport: the host side implements [`Transport`], the other
//! end plays the device.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{ChunkReader, ChunkWriter, Transport, TransportError, TransportHalves};
use crate::protocol::{LineFramer, Utf8Decoder};

type Chunk = Vec<u8>;

/// Host-side handle. Opens once.
pub struct MemoryTransport {
    ends: Mutex<Option<(mpsc::UnboundedSender<Chunk>, mpsc::UnboundedReceiver<Chunk>)>>,
}

/// Device-side handle. Dropping it ends the host's stream.
pub struct DeviceEnd {
    to_host: mpsc::UnboundedSender<Chunk>,
    from_host: mpsc::UnboundedReceiver<Chunk>,
    decoder: Utf8Decoder,
    framer: LineFramer,
    lines: VecDeque<String>,
}

pub fn memory_pair() -> (MemoryTransport, DeviceEnd) {
    let (to_device, from_host) = mpsc::unbounded_channel();
    let (to_host, from_device) = mpsc::unbounded_channel();
    let transport = MemoryTransport {
        ends: Mutex::new(Some((to_device, from_device))),
    };
    let device = DeviceEnd {
        to_host,
        from_host,
        decoder: Utf8Decoder::new(),
        framer: LineFramer::new(),
        lines: VecDeque::new(),
    };
    (transport, device)
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Chunk>,
    leftover: Chunk,
}

struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Chunk>>,
}

#[async_trait]
impl ChunkReader for MemoryReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.leftover.is_empty() {
            match self.rx.recv().await {
                Some(chunk) => self.leftover = chunk,
                None => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

#[async_trait]
impl ChunkWriter for MemoryWriter {
    async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(bytes.to_vec()).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<TransportHalves, TransportError> {
        let (tx, rx) = self.ends.lock().await.take().ok_or(TransportError::AlreadyOpen)?;
        Ok(TransportHalves {
            reader: Box::new(MemoryReader { rx, leftover: Vec::new() }),
            writer: Box::new(MemoryWriter { tx: Some(tx) }),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl DeviceEnd {
    /// Next complete line written by the host, `None` once the host closed.
    pub async fn recv_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Some(line);
            }
            let chunk = self.from_host.recv().await?;
            let text = self.decoder.decode(&chunk);
            self.lines.extend(self.framer.feed(&text));
        }
    }

    /// Next line if one is already buffered or waiting in the channel.
    pub fn try_recv_line(&mut self) -> Option<String> {
        while self.lines.is_empty() {
            let chunk = self.from_host.try_recv().ok()?;
            let text = self.decoder.decode(&chunk);
            self.lines.extend(self.framer.feed(&text));
        }
        self.lines.pop_front()
    }

    /// Send one newline-terminated line. `false` once the host is gone.
    pub fn send_line(&self, line: &str) -> bool {
        self.send_raw(format!("{}\n", line).as_bytes())
    }

    /// Send bytes exactly as given, for exercising chunk boundaries.
    pub fn send_raw(&self, bytes: &[u8]) -> bool {
        self.to_host.send(bytes.to_vec()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        let (transport, mut device) = memory_pair();
        let mut halves = transport.open().await.unwrap();

        halves.writer.write_chunk(b"1:5").await.unwrap();
        halves.writer.write_chunk(b"00\nh\n").await.unwrap();
        assert_eq!(device.recv_line().await.as_deref(), Some("1:500"));
        assert_eq!(device.recv_line().await.as_deref(), Some("h"));

        assert!(device.send_line(r#"{"code":211}"#));
        let mut buf = [0u8; 4];
        let n = halves.reader.read_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"co");
    }

    #[tokio::test]
    async fn test_opens_once() {
        let (transport, _device) = memory_pair();
        let _halves = transport.open().await.unwrap();
        assert!(matches!(transport.open().await, Err(TransportError::AlreadyOpen)));
    }

    #[tokio::test]
    async fn test_dropping_device_ends_stream() {
        let (transport, device) = memory_pair();
        let mut halves = transport.open().await.unwrap();
        drop(device);
        let mut buf = [0u8; 16];
        assert_eq!(halves.reader.read_chunk(&mut buf).await.unwrap(), 0);
        assert!(halves.writer.write_chunk(b"s\n").await.is_err());
    }

    #[tokio::test]
    async fn test_closing_writer_ends_device_lines() {
        let (transport, mut device) = memory_pair();
        let mut halves = transport.open().await.unwrap();
        halves.writer.close().await.unwrap();
        drop(halves);
        assert_eq!(device.recv_line().await, None);
    }
}
