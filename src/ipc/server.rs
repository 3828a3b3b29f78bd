//! Unix domain socket broadcast server.
//!
//! Clients connect to a well-known socket path and receive every message
//! broadcast while they are connected. Anything a client sends is surfaced
//! as a [`ServerEvent::Data`] and otherwise ignored.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{BroadcastMessage, BroadcastSink};
use crate::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 1024;

/// Identifier of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Events emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client connected.
    Connected(ClientId),
    /// A client went away.
    Disconnected(ClientId),
    /// A client sent something.
    Data { client: ClientId, data: Bytes },
    /// A transport error that did not stop the server.
    Error(String),
}

/// One registered client.
struct ClientConnection {
    /// Outbound frame queue, drained by the writer task.
    tx: mpsc::UnboundedSender<Bytes>,
    /// Task reading inbound data.
    reader: JoinHandle<()>,
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

type ClientMap = Arc<RwLock<HashMap<ClientId, ClientConnection>>>;

/// Broadcast server listening on a Unix domain socket.
pub struct IpcServer {
    path: PathBuf,
    clients: ClientMap,
    event_tx: broadcast::Sender<ServerEvent>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IpcServer {
    /// Bind the socket at `path` and start accepting clients.
    ///
    /// A stale socket file left behind by a previous run is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the socket cannot be bound.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::transport(
                    format!("removing stale socket {}", path.display()),
                    e,
                ))
            }
        }

        let listener = UnixListener::bind(&path)
            .map_err(|e| Error::transport(format!("binding {}", path.display()), e))?;

        info!("Listening on {}", path.display());

        let (event_tx, _) = broadcast::channel(256);
        let clients: ClientMap = Arc::new(RwLock::new(HashMap::new()));

        let accept_handle = tokio::spawn(accept_loop(listener, clients.clone(), event_tx.clone()));

        Ok(Self {
            path,
            clients,
            event_tx,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    /// Path of the listening socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Subscribe to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// Stop accepting, drop every client and remove the socket file.
    pub fn shutdown(&self) {
        if let Some(handle) = self.accept_handle.lock().take() {
            handle.abort();
        }

        let dropped = std::mem::take(&mut *self.clients.write());
        if !dropped.is_empty() {
            debug!("Dropping {} clients", dropped.len());
        }
        drop(dropped);

        remove_socket_file(&self.path);
        info!("Closed {}", self.path.display());
    }
}

impl BroadcastSink for IpcServer {
    fn broadcast(&self, message: &BroadcastMessage) -> usize {
        let frame = message.encode();
        let mut gone = Vec::new();

        let mut clients = self.clients.write();
        clients.retain(|id, client| {
            if client.tx.send(frame.clone()).is_ok() {
                true
            } else {
                gone.push(*id);
                false
            }
        });
        let delivered = clients.len();
        drop(clients);

        for id in gone {
            debug!("Dropped {} with a closed queue", id);
            let _ = self.event_tx.send(ServerEvent::Disconnected(id));
        }

        trace!("{} queued for {} clients", message.tag, delivered);
        delivered
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Some(handle) = self.accept_handle.lock().take() {
            handle.abort();
            remove_socket_file(&self.path);
        }
    }
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn accept_loop(
    listener: UnixListener,
    clients: ClientMap,
    event_tx: broadcast::Sender<ServerEvent>,
) {
    let next_id = AtomicU64::new(1);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let id = ClientId(next_id.fetch_add(1, Ordering::SeqCst));
                register_client(id, stream, &clients, &event_tx);
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                let _ = event_tx.send(ServerEvent::Error(format!("accept: {}", e)));
            }
        }
    }
}

fn register_client(
    id: ClientId,
    stream: UnixStream,
    clients: &ClientMap,
    event_tx: &broadcast::Sender<ServerEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    let writer_events = event_tx.clone();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                warn!("Write to {} failed: {}", id, e);
                let _ = writer_events.send(ServerEvent::Error(format!("{}: {}", id, e)));
                break;
            }
        }
    });

    // Held while the reader is spawned so it cannot remove itself before
    // it is registered.
    let mut registry = clients.write();

    let reader_clients = clients.clone();
    let reader_events = event_tx.clone();
    let reader = tokio::spawn(async move {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    trace!("{} bytes from {}", n, id);
                    let _ = reader_events.send(ServerEvent::Data { client: id, data });
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", id, e);
                    let _ = reader_events.send(ServerEvent::Error(format!("{}: {}", id, e)));
                    break;
                }
            }
        }

        let _ = reader_events.send(ServerEvent::Disconnected(id));
        // Dropping the entry aborts this task, so nothing may follow.
        let removed = reader_clients.write().remove(&id);
        drop(removed);
    });

    registry.insert(id, ClientConnection { tx, reader });
    drop(registry);

    let _ = event_tx.send(ServerEvent::Connected(id));
}
