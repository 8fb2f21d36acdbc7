//! The session: one connection to the controller, the command queue that
//! serializes traffic over it, and the state learned from its replies.
//!
//! All mutable state sits behind a single async mutex. The reader task takes
//! it once per inbound line; callers take it to enqueue or write. Queued
//! commands resolve through a oneshot channel each.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, SessionConfig};
use crate::protocol::{
    Action, CommandParseError, LineFramer, Message, ToolDescriptor, Utf8Decoder, classify, parse_command,
};
use crate::transport::{ChunkReader, ChunkWriter, Transport};

pub mod error;
pub mod expectation;
pub mod motors;
pub mod queue;
pub mod state;
pub mod tool;

pub use error::SessionError;
pub use expectation::{Evaluation, Expectation};
pub use queue::{CommandResult, QueueEntry, QueueSnapshot};
pub use state::{MotorState, MotorStatus, StateStore};
pub use tool::ToolInfo;

use queue::{CommandQueue, QueuedCommand, Resolution};

const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Added { id: Uuid, command: String },
    Processing { id: Uuid, command: String },
    Completed { id: Uuid },
    Failed { id: Uuid, error: SessionError },
    /// Backlog flushed by a stop command.
    Cleared { discarded: Vec<Uuid> },
}

/// Notifications for observers. Lagging receivers lose the oldest events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Every complete, non-empty inbound line, JSON or not.
    Line(String),
    Message(Message),
    Queue(QueueEvent),
    ToolUpdated(ToolDescriptor),
    Disconnected(String),
}

struct WriteRequest {
    line: String,
    ack: Option<oneshot::Sender<Result<(), SessionError>>>,
}

struct Link {
    generation: u64,
    tx: mpsc::UnboundedSender<WriteRequest>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct PendingDiscovery {
    id: u64,
    responder: oneshot::Sender<Result<ToolDescriptor, SessionError>>,
}

struct Inner {
    queue: CommandQueue,
    store: StateStore,
    discovery: Option<PendingDiscovery>,
    link: Option<Link>,
}

struct Shared {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    axes: Vec<String>,
    settings: SessionConfig,
    refresh: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    discovery_ids: AtomicU64,
}

/// Cloneable handle to one controller session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let axes = config.motion.axes.clone();
        let (events, _) = broadcast::channel(config.session.event_capacity.max(1));
        let inner = Inner {
            queue: CommandQueue::new(),
            store: StateStore::new(&axes),
            discovery: None,
            link: None,
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                events,
                axes,
                settings: config.session.clone(),
                refresh: Mutex::new(None),
                generation: AtomicU64::new(0),
                discovery_ids: AtomicU64::new(0),
            }),
        }
    }

    pub fn axis_names(&self) -> &[String] {
        &self.shared.axes
    }

    pub fn axis_count(&self) -> usize {
        self.shared.axes.len()
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.shared.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Open `transport` and start the reader and writer tasks.
    pub async fn connect(&self, transport: &dyn Transport) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.link.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let halves = transport
            .open()
            .await
            .map_err(|e| SessionError::TransportLost(e.to_string()))?;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(halves.writer, rx, self.shared.clone(), generation));
        let reader = tokio::spawn(read_loop(halves.reader, self.shared.clone(), generation));
        inner.link = Some(Link {
            generation,
            tx,
            reader,
            writer,
        });
        tracing::info!("Connected to {}", transport.describe());
        Ok(())
    }

    /// Close the connection. Commands still waiting fail with `Closed`.
    pub async fn disconnect(&self) {
        self.stop_tool_refresh().await;
        let link = {
            let mut inner = self.shared.inner.lock().await;
            let Some(link) = inner.link.take() else {
                return;
            };
            self.shared.fail_everything(&mut inner, SessionError::Closed);
            link
        };
        link.reader.abort();
        // Dropping the sender lets the writer flush and close its half.
        drop(link.tx);
        let _ = link.writer.await;
        tracing::info!("Disconnected");
        self.shared.emit(SessionEvent::Disconnected("closed by host".to_string()));
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.inner.lock().await.link.is_some()
    }

    /// Queue `text` and return the receiver its result will arrive on.
    pub async fn enqueue(&self, text: &str) -> Result<oneshot::Receiver<CommandResult>, SessionError> {
        let command = parse_command(text, self.axis_count())?;
        if command.action == Action::ToolQuery {
            return Err(CommandParseError::NotQueueable(text.trim().to_string()).into());
        }
        let expectation = command.expectation(self.axis_count());
        let mut inner = self.shared.inner.lock().await;
        if inner.link.is_none() {
            return Err(SessionError::NotConnected);
        }
        let (entry, rx) = QueuedCommand::new(text.trim().to_string(), expectation);
        tracing::debug!(
            "Queued '{}' ({:?}, {} replies)",
            entry.command,
            entry.expectation.kind,
            entry.expectation.remaining
        );
        self.shared.emit(SessionEvent::Queue(QueueEvent::Added {
            id: entry.id,
            command: entry.command.clone(),
        }));
        inner.queue.push(entry);
        self.shared.drain(&mut inner);
        Ok(rx)
    }

    /// Queue `text` and wait for the reply that completes it.
    pub async fn send(&self, text: &str) -> Result<Message, SessionError> {
        let rx = self.enqueue(text).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Write `text` now, ahead of the queue. Stop commands also discard the
    /// backlog; the command in flight still waits for its own replies.
    pub async fn send_immediate(&self, text: &str) -> Result<(), SessionError> {
        let command = parse_command(text, self.axis_count())?;
        let ack = {
            let mut inner = self.shared.inner.lock().await;
            let Some(link) = inner.link.as_ref() else {
                return Err(SessionError::NotConnected);
            };
            let tx = link.tx.clone();
            if command.is_stop() {
                let discarded = inner.queue.discard_backlog();
                if !discarded.is_empty() {
                    tracing::info!("Stop discarded {} queued command(s)", discarded.len());
                }
                self.shared.emit(SessionEvent::Queue(QueueEvent::Cleared { discarded }));
            }
            let (ack_tx, ack_rx) = oneshot::channel();
            tx.send(WriteRequest {
                line: text.trim().to_string(),
                ack: Some(ack_tx),
            })
            .map_err(|_| SessionError::NotConnected)?;
            ack_rx
        };
        ack.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.shared.inner.lock().await.queue.snapshot()
    }

    /// Copy of the current state store.
    pub async fn state(&self) -> StateStore {
        self.shared.inner.lock().await.store.clone()
    }
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Start the next queued command if nothing is in flight.
    fn drain(&self, inner: &mut Inner) {
        while let Some((id, command)) = inner.queue.start_next() {
            self.emit(SessionEvent::Queue(QueueEvent::Processing {
                id,
                command: command.clone(),
            }));
            let sent = inner.link.as_ref().is_some_and(|link| {
                link.tx
                    .send(WriteRequest {
                        line: command.clone(),
                        ack: None,
                    })
                    .is_ok()
            });
            if sent {
                return;
            }
            let error = SessionError::NotConnected;
            if let Some(id) = inner.queue.fail_current(error.clone()) {
                self.emit(SessionEvent::Queue(QueueEvent::Failed { id, error }));
            }
        }
    }

    fn fail_everything(&self, inner: &mut Inner, error: SessionError) {
        for id in inner.queue.fail_all(error.clone()) {
            self.emit(SessionEvent::Queue(QueueEvent::Failed {
                id,
                error: error.clone(),
            }));
        }
        if let Some(pending) = inner.discovery.take() {
            let _ = pending.responder.send(Err(error));
        }
    }

    async fn handle_line(&self, line: String) {
        tracing::debug!("RX: {}", line);
        self.emit(SessionEvent::Line(line.clone()));

        let message = match classify(&line) {
            Ok(message) => message,
            Err(noise) => {
                tracing::debug!("Ignoring line '{}': {}", line, noise);
                return;
            }
        };
        self.emit(SessionEvent::Message(message.clone()));

        let mut inner = self.inner.lock().await;
        for update in message.motor_updates() {
            inner.store.apply_motor_update(&update.motor, &update.fields);
        }

        if let Some(catalog) = message.catalog() {
            if let Some(pending) = inner.discovery.take() {
                tracing::debug!("Tool discovery {} answered by '{}'", pending.id, catalog.name);
                let _ = pending.responder.send(Ok(catalog.clone()));
            }
        }

        match inner.queue.resolve(&message) {
            Resolution::Untouched => {}
            Resolution::Progress { id, remaining } => {
                tracing::trace!("Command {} waiting for {} more repl(ies)", id, remaining);
            }
            Resolution::Completed { id } => {
                self.emit(SessionEvent::Queue(QueueEvent::Completed { id }));
                self.drain(&mut inner);
            }
            Resolution::Failed { id, error } => {
                tracing::warn!("Command {} failed: {}", id, error);
                self.emit(SessionEvent::Queue(QueueEvent::Failed { id, error }));
                self.drain(&mut inner);
            }
        }
    }

    /// Tear down after the reader or writer hit the end of the stream.
    async fn connection_lost(&self, generation: u64, reason: String) {
        let link = {
            let mut inner = self.inner.lock().await;
            if !inner.link.as_ref().is_some_and(|link| link.generation == generation) {
                return;
            }
            let link = inner.link.take();
            self.fail_everything(&mut inner, SessionError::TransportLost(reason.clone()));
            link
        };
        tracing::error!("Connection lost: {}", reason);
        self.emit(SessionEvent::Disconnected(reason));
        if let Some(link) = link {
            link.reader.abort();
        }
    }
}

async fn read_loop(mut reader: Box<dyn ChunkReader>, shared: Arc<Shared>, generation: u64) {
    let mut decoder = Utf8Decoder::new();
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let reason = loop {
        match reader.read_chunk(&mut buf).await {
            Ok(0) => break "end of stream".to_string(),
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                for line in framer.feed(&text) {
                    shared.handle_line(line).await;
                }
            }
            Err(e) => break e.to_string(),
        }
    };
    shared.connection_lost(generation, reason).await;
}

async fn write_loop(
    mut writer: Box<dyn ChunkWriter>,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(WriteRequest { line, ack }) = rx.recv().await {
        tracing::debug!("TX: {}", line);
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        match writer.write_chunk(&bytes).await {
            Ok(()) => {
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                let reason = e.to_string();
                if let Some(ack) = ack {
                    let _ = ack.send(Err(SessionError::TransportLost(reason.clone())));
                }
                shared.connection_lost(generation, reason).await;
                return;
            }
        }
    }
    if let Err(e) = writer.close().await {
        tracing::warn!("Error closing transport: {}", e);
    }
}
