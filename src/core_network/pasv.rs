use log::{debug, error, info, warn};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};

use crate::core_ftpcommand::handlers::run_data_command;
use crate::core_ftpcommand::reply::Reply;
use crate::session::{DataChannel, Session};

/// Hands out passive ports from a fixed range, wrapping around.
///
/// A range of `0..=0` lets the OS pick the port.
#[derive(Debug)]
pub struct PortAllocator {
    bind_ip: IpAddr,
    min: u16,
    max: u16,
    cursor: AtomicUsize,
}

impl PortAllocator {
    pub fn new(bind_ip: IpAddr, min: u16, max: u16) -> Self {
        Self {
            bind_ip,
            min,
            max,
            cursor: AtomicUsize::new(0),
        }
    }

    fn span(&self) -> usize {
        usize::from(self.max.saturating_sub(self.min)) + 1
    }

    pub fn next_port(&self) -> u16 {
        let offset = self.cursor.fetch_add(1, Ordering::Relaxed) % self.span();
        // offset < span, so this stays inside the range
        self.min + offset as u16
    }

    /// Binds a listener on the next free port of the range. Ports that are
    /// busy are skipped; the whole range is tried once.
    pub async fn bind(&self) -> Result<TcpListener, io::Error> {
        if self.max == 0 {
            return TcpListener::bind((self.bind_ip, 0)).await;
        }
        let mut last_error = None;
        for _ in 0..self.span() {
            let port = self.next_port();
            match TcpListener::bind((self.bind_ip, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => {
                    debug!("Passive port {} unavailable: {}", port, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(ErrorKind::AddrNotAvailable, "no passive port available")
        }))
    }
}

pub fn pasv_reply(ip: Ipv4Addr, port: u16) -> Reply {
    let [h1, h2, h3, h4] = ip.octets();
    Reply::new(
        227,
        format!(
            "Entering Passive Mode ({},{},{},{},{},{})",
            h1,
            h2,
            h3,
            h4,
            port >> 8,
            port & 0xff
        ),
    )
}

pub fn epsv_reply(port: u16) -> Reply {
    Reply::new(229, format!("Entering Extended Passive Mode (|||{}|)", port))
}

/// Sets up a passive listener and tells the client where to connect.
/// Any previous data connection of the session is torn down first; a
/// transfer still running on it is reported with 426.
pub async fn handle_pasv_command(session: &mut Session, _arg: &str) -> Result<(), io::Error> {
    session.abort_transfer().await?;
    let Some(pasv_ip) = session.pasv_ip else {
        session.close_data_channel();
        warn!("[{}] No IPv4 address to advertise for PASV", session.peer);
        return session.reply(425, "Can't open data connection").await;
    };
    match setup_pasv_listener(session).await {
        Some(port) => session.send_reply(&pasv_reply(pasv_ip, port)).await,
        None => session.reply(425, "Can't open data connection").await,
    }
}

pub async fn handle_epsv_command(session: &mut Session, _arg: &str) -> Result<(), io::Error> {
    session.abort_transfer().await?;
    match setup_pasv_listener(session).await {
        Some(port) => session.send_reply(&epsv_reply(port)).await,
        None => session.reply(425, "Can't open data connection").await,
    }
}

async fn setup_pasv_listener(session: &mut Session) -> Option<u16> {
    session.close_data_channel();
    let listener = match session.ctx.ports.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!("[{}] Failed to open passive listener: {}", session.peer, e);
            return None;
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            error!("[{}] Passive listener has no address: {}", session.peer, e);
            return None;
        }
    };
    debug!("[{}] PASV listener set up on port {}", session.peer, port);
    session.await_data_connection(listener);
    Some(port)
}

/// Resolves when the passive listener of `data` accepts a connection.
/// Never resolves when the session is not waiting for one.
pub async fn accept_pasv_connection(data: &DataChannel) -> io::Result<(TcpStream, SocketAddr)> {
    match data {
        DataChannel::AwaitingConnection { listener, .. } => listener.accept().await,
        _ => std::future::pending().await,
    }
}

/// Adopts an accepted data connection and runs the command that was waiting for it.
pub async fn handle_data_accept(
    session: &mut Session,
    accepted: io::Result<(TcpStream, SocketAddr)>,
) -> Result<(), io::Error> {
    match accepted {
        Ok((stream, addr)) => {
            debug!("[{}] Accepted data connection from: {}", session.peer, addr);
            let pending = session.pending_command.take();
            session.adopt_data_connection(stream);
            if let Some(pending) = pending {
                info!(
                    "[{}] Running pending {:?} on new data connection",
                    session.peer, pending.command
                );
                run_data_command(session, pending.command, &pending.arg, true).await?;
            }
            Ok(())
        }
        Err(e) => {
            error!("[{}] Failed to accept data connection: {}", session.peer, e);
            let had_pending = session.pending_command.is_some();
            session.close_data_channel();
            if had_pending {
                session.reply(425, "Can't open data connection").await?;
            }
            Ok(())
        }
    }
}
