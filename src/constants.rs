// src/constants.rs

/// Longest control line processed; the rest of an overlong line is discarded.
pub const MAX_COMMAND_LEN: usize = 256;

/// Control events queued for a session before its reader stops reading the socket.
pub const CONTROL_EVENT_QUEUE: usize = 32;

/// One TCP segment worth of file data per download step.
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 1460;
pub const DEFAULT_UPLOAD_BUFFER_SIZE: usize = 8192;

/// Listing lines written between two explicit flushes of the data socket.
pub const LIST_FLUSH_EVERY: usize = 8;

pub const DEFAULT_PASV_PORT_MIN: u16 = 60000;
pub const DEFAULT_PASV_PORT_MAX: u16 = 61000;

pub const DEFAULT_DATA_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5000;

pub const LIST_DIR_SIZE: u64 = 4096;
pub const LIST_FALLBACK_DATE: &str = "Jan 01 2020";
pub const LIST_OWNER: &str = "ftp";

pub const FEATURES: [&str; 3] = ["SIZE", "REST STREAM", "UTF8"];
