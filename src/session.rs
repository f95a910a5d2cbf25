use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::core_fs::ResolvedPath;
use crate::core_ftpcommand::ftpcommand::FtpCommand;
use crate::core_ftpcommand::reply::Reply;
use crate::core_network::network;
use crate::core_transfer::TransferLink;
use crate::helpers::send_response;
use crate::server::ServerContext;

pub type SessionId = u64;

/// Write side of the control connection, shared with the session's transfer task.
pub type ControlWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Bounded queue into the session task. A full queue stops the control reader.
pub type EventSender = mpsc::Sender<SessionEvent>;

/// Everything the session task reacts to besides accepts and sweep signals.
#[derive(Debug)]
pub enum SessionEvent {
    Command(String),
    PeerClosed,
    ControlError(io::Error),
    TransferFinished,
}

/// State shared between a session task and the session table.
///
/// The table never touches the `Session` itself: it reads these fields,
/// sets `marked_for_close` and wakes the session through the two notifiers.
#[derive(Debug, Default)]
pub struct SessionShared {
    marked_for_close: AtomicBool,
    awaiting_since: StdMutex<Option<Instant>>,
    pub(crate) shutdown: Notify,
    pub(crate) data_timeout: Notify,
}

impl SessionShared {
    pub fn mark_for_close(&self) {
        self.marked_for_close.store(true, Ordering::SeqCst);
    }

    pub fn is_marked_for_close(&self) -> bool {
        self.marked_for_close.load(Ordering::SeqCst)
    }

    fn set_awaiting_since(&self, since: Option<Instant>) {
        *self
            .awaiting_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = since;
    }

    pub fn awaiting_since(&self) -> Option<Instant> {
        *self
            .awaiting_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The per-session data connection. Only one can exist at a time.
#[derive(Debug, Default)]
pub enum DataChannel {
    #[default]
    Idle,
    AwaitingConnection {
        listener: TcpListener,
        since: Instant,
    },
    Connected {
        stream: TcpStream,
    },
    Transferring {
        task: JoinHandle<()>,
    },
}

impl DataChannel {
    fn awaiting_since(&self) -> Option<Instant> {
        match self {
            DataChannel::AwaitingConnection { since, .. } => Some(*since),
            _ => None,
        }
    }

    fn is_live(&self) -> bool {
        match self {
            DataChannel::Idle => false,
            DataChannel::Transferring { task } => !task.is_finished(),
            _ => true,
        }
    }

    /// Releases the listener, socket or running transfer.
    fn teardown(self) {
        if let DataChannel::Transferring { task } = self {
            // dropping the task drops its context together with the socket
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Idle,
    AwaitingData,
    DataReady,
    Transferring,
}

/// A data command received before its data connection was ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: FtpCommand,
    pub arg: String,
}

pub struct Session {
    pub id: SessionId,
    pub peer: SocketAddr,
    /// Address advertised in PASV replies.
    pub pasv_ip: Option<Ipv4Addr>,
    pub ctx: Arc<ServerContext>,
    pub writer: ControlWriter,
    pub username: Option<String>,
    pub authenticated: bool,
    pub current_dir: String,
    pub restart_offset: u64,
    pub pending_command: Option<PendingCommand>,
    pub rename_from: Option<ResolvedPath>,
    pub data: DataChannel,
    pub shared: Arc<SessionShared>,
    events: EventSender,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        pasv_ip: Option<Ipv4Addr>,
        ctx: Arc<ServerContext>,
        writer: ControlWriter,
        shared: Arc<SessionShared>,
        events: EventSender,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            peer,
            pasv_ip,
            ctx,
            writer,
            username: None,
            authenticated: false,
            current_dir: String::from("/"),
            restart_offset: 0,
            pending_command: None,
            rename_from: None,
            data: DataChannel::Idle,
            shared,
            events,
            reader: Some(reader),
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        if !self.authenticated {
            return SessionState::Unauthenticated;
        }
        match &self.data {
            DataChannel::Idle => SessionState::Idle,
            DataChannel::AwaitingConnection { .. } => SessionState::AwaitingData,
            DataChannel::Connected { .. } => SessionState::DataReady,
            DataChannel::Transferring { task } if task.is_finished() => SessionState::Idle,
            DataChannel::Transferring { .. } => SessionState::Transferring,
        }
    }

    pub fn mark_for_close(&self) {
        self.shared.mark_for_close();
    }

    pub fn is_marked_for_close(&self) -> bool {
        self.shared.is_marked_for_close()
    }

    pub async fn reply(&self, code: u16, text: &str) -> Result<(), io::Error> {
        self.send_reply(&Reply::new(code, text)).await
    }

    pub async fn send_reply(&self, reply: &Reply) -> Result<(), io::Error> {
        debug!("[{}] RESP: {} {}", self.peer, reply.code(), reply.text());
        send_response(&self.writer, reply.to_string().as_bytes()).await
    }

    /// Handle given to a transfer task so it can report back exactly once.
    pub fn transfer_link(&self) -> TransferLink {
        TransferLink::new(
            self.peer,
            Arc::clone(&self.writer),
            Arc::clone(&self.shared),
            self.events.clone(),
        )
    }

    fn replace_data(&mut self, next: DataChannel) {
        let previous = std::mem::replace(&mut self.data, next);
        if previous.is_live() {
            debug!("[{}] Closing data connection", self.peer);
        }
        previous.teardown();
        self.shared.set_awaiting_since(self.data.awaiting_since());
    }

    /// Tears down whatever data connection exists and drops the pending
    /// command bound to it. Safe to call in any state.
    pub fn close_data_channel(&mut self) {
        self.pending_command = None;
        self.replace_data(DataChannel::Idle);
    }

    pub fn await_data_connection(&mut self, listener: TcpListener) {
        self.close_data_channel();
        self.replace_data(DataChannel::AwaitingConnection {
            listener,
            since: Instant::now(),
        });
    }

    /// Adopts the accepted data socket; the listener is retired.
    pub fn adopt_data_connection(&mut self, stream: TcpStream) {
        self.replace_data(DataChannel::Connected { stream });
    }

    pub fn has_connected_data(&self) -> bool {
        matches!(self.data, DataChannel::Connected { .. })
    }

    pub fn is_awaiting_data(&self) -> bool {
        matches!(self.data, DataChannel::AwaitingConnection { .. })
    }

    /// Moves the connected data socket out, leaving the channel idle.
    pub fn take_data_stream(&mut self) -> Option<TcpStream> {
        match std::mem::take(&mut self.data) {
            DataChannel::Connected { stream } => {
                self.shared.set_awaiting_since(None);
                Some(stream)
            }
            other => {
                self.data = other;
                None
            }
        }
    }

    pub fn start_transfer(&mut self, task: JoinHandle<()>) {
        self.replace_data(DataChannel::Transferring { task });
    }

    /// Stops a transfer that is still running and reports it as aborted.
    ///
    /// The control writer is held while the task is cancelled, so the task
    /// either sent its whole final reply before or sends nothing at all.
    pub async fn abort_transfer(&mut self) -> Result<(), io::Error> {
        let task = match std::mem::take(&mut self.data) {
            DataChannel::Transferring { task } if !task.is_finished() => task,
            other => {
                self.data = other;
                return Ok(());
            }
        };
        let writer = Arc::clone(&self.writer);
        let guard = writer.lock().await;
        task.abort();
        let replied = match task.await {
            Ok(()) => true,
            Err(e) if e.is_cancelled() => false,
            Err(e) => {
                warn!("[{}] Transfer task failed: {}", self.peer, e);
                false
            }
        };
        drop(guard);
        if replied {
            return Ok(());
        }
        info!("[{}] Transfer aborted by a new data connection request", self.peer);
        self.reply(426, "Connection closed; transfer aborted").await
    }

    pub fn on_transfer_finished(&mut self) {
        if matches!(&self.data, DataChannel::Transferring { task } if task.is_finished()) {
            self.data = DataChannel::Idle;
        }
    }

    /// Drops a data channel that waited longer than `timeout` for its
    /// connection. The control session stays open.
    pub async fn on_data_timeout(&mut self, timeout: Duration) -> Result<(), io::Error> {
        let expired = matches!(
            &self.data,
            DataChannel::AwaitingConnection { since, .. } if since.elapsed() >= timeout
        );
        if !expired {
            return Ok(());
        }
        warn!("[{}] Data connection timeout", self.peer);
        let had_pending = self.pending_command.is_some();
        self.close_data_channel();
        if had_pending {
            self.reply(421, "Data connection timeout").await?;
        }
        Ok(())
    }

    /// Releases every socket and transfer of this session. Idempotent.
    pub async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_data_channel();
        self.rename_from = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("[{}] Control shutdown failed: {}", self.peer, e);
        }
    }
}

struct SessionEntry {
    peer: SocketAddr,
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reaped: usize,
    pub timed_out: usize,
}

/// Owns every live session. Sessions leave the table only through [`SessionTable::sweep`].
#[derive(Default)]
pub struct SessionTable {
    sessions: StdMutex<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
}

const REAP_GRACE: Duration = Duration::from_secs(5);

impl SessionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a freshly accepted control connection and starts its session task.
    pub fn accept(
        &self,
        ctx: Arc<ServerContext>,
        socket: TcpStream,
        peer: SocketAddr,
    ) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::new(SessionShared::default());
        let task = tokio::spawn(network::handle_connection(
            id,
            socket,
            peer,
            ctx,
            Arc::clone(&shared),
        ));
        self.lock().insert(id, SessionEntry { peer, shared, task });
        info!("Client connected: {} (session {})", peer, id);
        id
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.lock().keys().copied().collect()
    }

    /// Asks the sweep to close one session. Returns false for unknown ids.
    #[cfg(test)]
    pub fn mark_for_close(&self, id: SessionId) -> bool {
        match self.lock().get(&id) {
            Some(entry) => {
                entry.shared.mark_for_close();
                true
            }
            None => false,
        }
    }

    pub fn mark_all_for_close(&self) {
        for entry in self.lock().values() {
            entry.shared.mark_for_close();
        }
    }

    /// Reaps sessions marked for close and signals data-channel timeouts.
    ///
    /// Reaped sessions are removed from the table and their task is awaited,
    /// so their sockets and transfers are released when this returns.
    pub async fn sweep(&self, data_timeout: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let mut reaped = Vec::new();
        {
            let mut sessions = self.lock();
            let marked: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| entry.shared.is_marked_for_close())
                .map(|(id, _)| *id)
                .collect();
            for id in marked {
                if let Some(entry) = sessions.remove(&id) {
                    entry.shared.shutdown.notify_one();
                    reaped.push((id, entry));
                }
            }

            let now = Instant::now();
            for entry in sessions.values() {
                if let Some(since) = entry.shared.awaiting_since() {
                    if now.duration_since(since) >= data_timeout {
                        entry.shared.data_timeout.notify_one();
                        report.timed_out += 1;
                    }
                }
            }
        }

        report.reaped = reaped.len();
        for (id, entry) in reaped {
            let abort = entry.task.abort_handle();
            match tokio::time::timeout(REAP_GRACE, entry.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!("Session {} task failed: {}", id, e),
                Err(_) => {
                    warn!("Session {} did not shut down in time, aborting", id);
                    abort.abort();
                }
            }
            info!("Client disconnected: {} (session {})", entry.peer, id);
        }
        report
    }
}
