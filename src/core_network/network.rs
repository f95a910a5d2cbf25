use log::{debug, error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::constants::{CONTROL_EVENT_QUEUE, MAX_COMMAND_LEN};
use crate::core_ftpcommand::handlers::dispatch;
use crate::core_network::pasv::{accept_pasv_connection, handle_data_accept};
use crate::helpers::{format_greeting, local_ipv4, send_response};
use crate::server::ServerContext;
use crate::session::{
    ControlWriter, EventSender, Session, SessionEvent, SessionId, SessionShared, SessionTable,
};

/// Accept loop of the control listener. Runs until the task is aborted.
pub async fn start_server(listener: TcpListener, ctx: Arc<ServerContext>, table: Arc<SessionTable>) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                debug!("New connection from {:?}", addr);
                table.accept(Arc::clone(&ctx), socket, addr);
            }
            Err(e) => {
                error!("Failed to accept control connection: {}", e);
                // usually out of descriptors; give the sweep a chance to free some
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Session task: owns the session and serializes everything that happens
/// to it, from commands to data accepts and sweep signals.
pub async fn handle_connection(
    id: SessionId,
    socket: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    shared: Arc<SessionShared>,
) {
    let pasv_ip = ctx.pasv_ip.or_else(|| local_ipv4(&socket));
    if let Err(e) = socket.set_nodelay(true) {
        debug!("[{}] Failed to set TCP_NODELAY: {}", peer, e);
    }
    let (read_half, write_half) = socket.into_split();
    let writer: ControlWriter = Arc::new(Mutex::new(write_half));
    let (events_tx, mut events) = mpsc::channel(CONTROL_EVENT_QUEUE);
    let reader = tokio::spawn(read_control_lines(read_half, events_tx.clone()));

    let data_timeout = ctx.config.server.data_timeout();
    let greeting = format_greeting(ctx.banner.as_deref(), &ctx.config.server.greeting);
    let mut session = Session::new(
        id,
        peer,
        pasv_ip,
        ctx,
        writer,
        Arc::clone(&shared),
        events_tx,
        reader,
    );

    if let Err(e) = send_response(&session.writer, greeting.as_bytes()).await {
        error!("[{}] Failed to send greeting: {}", peer, e);
        session.mark_for_close();
    }

    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => break,
            _ = shared.data_timeout.notified() => {
                if let Err(e) = session.on_data_timeout(data_timeout).await {
                    error!("[{}] Failed to report data timeout: {}", peer, e);
                    session.mark_for_close();
                }
            }
            accepted = accept_pasv_connection(&session.data), if !session.is_marked_for_close() => {
                if let Err(e) = handle_data_accept(&mut session, accepted).await {
                    error!("[{}] Error handling data connection: {}", peer, e);
                    session.mark_for_close();
                }
            }
            Some(event) = events.recv(), if !session.is_marked_for_close() => {
                handle_event(&mut session, event).await;
            }
        }
    }

    session.teardown().await;
    info!("Connection closed for {:?} (session {})", peer, session.id);
}

async fn handle_event(session: &mut Session, event: SessionEvent) {
    match event {
        SessionEvent::Command(line) => dispatch(session, &line).await,
        SessionEvent::TransferFinished => session.on_transfer_finished(),
        SessionEvent::PeerClosed => {
            info!("[{}] Client closed the control connection", session.peer);
            session.mark_for_close();
        }
        SessionEvent::ControlError(e) => {
            error!("[{}] Control connection error: {}", session.peer, e);
            session.mark_for_close();
        }
    }
}

/// Reads control lines and forwards them to the session task. Stops reading
/// while the session's queue is full.
async fn read_control_lines(read_half: OwnedReadHalf, events: EventSender) {
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::with_capacity(MAX_COMMAND_LEN);
    loop {
        line.clear();
        let event = match read_bounded_line(&mut reader, &mut line).await {
            Ok(0) => SessionEvent::PeerClosed,
            Ok(_) => SessionEvent::Command(String::from_utf8_lossy(&line).into_owned()),
            Err(e) => SessionEvent::ControlError(e),
        };
        let last = !matches!(event, SessionEvent::Command(_));
        if events.send(event).await.is_err() || last {
            break;
        }
    }
}

/// Reads one line of at most `MAX_COMMAND_LEN` bytes into `line`. The rest
/// of a longer line is read and dropped. Returns 0 at end of stream.
pub async fn read_bounded_line<R>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(MAX_COMMAND_LEN as u64)
        .read_until(b'\n', line)
        .await?;
    if n == MAX_COMMAND_LEN && line.last() != Some(&b'\n') {
        let mut overflow = Vec::new();
        loop {
            overflow.clear();
            let m = (&mut *reader)
                .take(MAX_COMMAND_LEN as u64)
                .read_until(b'\n', &mut overflow)
                .await?;
            if m == 0 || overflow.last() == Some(&b'\n') {
                break;
            }
        }
        debug!("Discarded the tail of an overlong command line");
    }
    Ok(n)
}
