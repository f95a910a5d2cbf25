//! Data-connection transfers: file downloads, uploads and directory listings.
//!
//! Each transfer runs in its own task that owns the data socket and the open
//! file. It reports its outcome on the control connection through a
//! [`TransferLink`] and then tells the session it is done.

pub mod download;
pub mod listing;
pub mod upload;

use log::{debug, error};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

use crate::core_ftpcommand::reply::Reply;
use crate::helpers::send_response;
use crate::session::{ControlWriter, EventSender, SessionEvent, SessionShared};

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Local file error: {0}")]
    File(io::Error),

    #[error("Data connection error: {0}")]
    Socket(io::Error),
}

impl TransferError {
    pub fn to_ftp_response(&self) -> Reply {
        match self {
            TransferError::File(_) => {
                Reply::new(451, "Requested action aborted. Local error in processing")
            }
            TransferError::Socket(_) => Reply::new(426, "Connection closed; transfer aborted"),
        }
    }
}

/// What a transfer task needs to report back to its session.
pub struct TransferLink {
    peer: SocketAddr,
    writer: ControlWriter,
    shared: Arc<SessionShared>,
    events: EventSender,
}

impl TransferLink {
    pub fn new(
        peer: SocketAddr,
        writer: ControlWriter,
        shared: Arc<SessionShared>,
        events: EventSender,
    ) -> Self {
        Self {
            peer,
            writer,
            shared,
            events,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends the final reply of the transfer and hands control back to the session.
    pub async fn finish(self, reply: Reply) {
        if let Err(e) = send_response(&self.writer, reply.to_string().as_bytes()).await {
            error!("[{}] Failed to send transfer reply: {}", self.peer, e);
            self.shared.mark_for_close();
        }
        // no await after the reply: a cancelled transfer has sent nothing
        match self.events.try_send(SessionEvent::TransferFinished) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                debug!("[{}] Session queue full, finished transfer left for the session to find", self.peer);
            }
        }
    }
}
