// Filesystem errors and their FTP replies
use std::io::{self, ErrorKind};
use thiserror::Error;

use crate::core_ftpcommand::reply::Reply;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path is outside of the allowed area: {0}")]
    OutsideRoot(String),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FsError {
    /// Tags an I/O error with the logical path it happened on.
    pub fn from_io(err: io::Error, logical: &str) -> Self {
        match err.kind() {
            ErrorKind::NotFound => FsError::NotFound(logical.to_string()),
            ErrorKind::AlreadyExists => FsError::AlreadyExists(logical.to_string()),
            _ => FsError::Io(err),
        }
    }

    pub fn to_ftp_response(&self) -> Reply {
        match self {
            FsError::OutsideRoot(_) => Reply::new(550, "Path is outside of the allowed area"),
            FsError::NotFound(_) => Reply::new(550, "File or directory not found"),
            FsError::AlreadyExists(_) => Reply::new(550, "File already exists"),
            FsError::NotEmpty(_) => Reply::new(550, "Directory not empty"),
            FsError::NotADirectory(_) => Reply::new(550, "Not a directory"),
            FsError::NotAFile(_) => Reply::new(550, "Not a regular file"),
            FsError::Io(e) if e.kind() == ErrorKind::PermissionDenied => {
                Reply::new(550, "Permission denied")
            }
            FsError::Io(_) => Reply::new(451, "Requested action aborted. Local error in processing"),
        }
    }
}
