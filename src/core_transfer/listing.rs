use chrono::{DateTime, Local};
use log::{error, info};
use std::time::SystemTime;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use super::{TransferError, TransferLink};
use crate::constants::{LIST_DIR_SIZE, LIST_FALLBACK_DATE, LIST_FLUSH_EVERY, LIST_OWNER};
use crate::core_fs::{DirEntryInfo, EntryStat};
use crate::core_ftpcommand::reply::Reply;

fn format_mtime(modified: Option<SystemTime>) -> String {
    match modified {
        Some(time) => DateTime::<Local>::from(time).format("%b %d %H:%M").to_string(),
        None => LIST_FALLBACK_DATE.to_string(),
    }
}

/// One `ls -l` style line. Entries without metadata are shown as empty files.
pub fn format_entry(name: &str, stat: Option<&EntryStat>) -> String {
    let (kind, size, modified) = match stat {
        Some(stat) if stat.is_dir => ('d', LIST_DIR_SIZE, stat.modified),
        Some(stat) => ('-', stat.size, stat.modified),
        None => ('-', 0, None),
    };
    format!(
        "{}rwxr-xr-x 1 {} {} {:>8} {} {}\r\n",
        kind,
        LIST_OWNER,
        LIST_OWNER,
        size,
        format_mtime(modified),
        name
    )
}

fn dot_entries() -> [String; 2] {
    let stat = EntryStat {
        is_dir: true,
        size: LIST_DIR_SIZE,
        modified: None,
    };
    [format_entry(".", Some(&stat)), format_entry("..", Some(&stat))]
}

/// Writes the listing: `.` and `..` first, then one line per entry. Lines
/// are batched and flushed every few entries.
pub async fn send_listing<W>(sink: &mut W, entries: &[DirEntryInfo]) -> Result<usize, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(sink);
    for line in dot_entries() {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(TransferError::Socket)?;
    }
    for (index, entry) in entries.iter().enumerate() {
        let line = format_entry(&entry.name, entry.stat.as_ref());
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(TransferError::Socket)?;
        if (index + 1) % LIST_FLUSH_EVERY == 0 {
            writer.flush().await.map_err(TransferError::Socket)?;
        }
    }
    writer.flush().await.map_err(TransferError::Socket)?;
    Ok(entries.len())
}

/// Body of a LIST/NLST transfer task.
pub async fn run_listing(entries: Vec<DirEntryInfo>, mut stream: TcpStream, link: TransferLink) {
    let outcome = match send_listing(&mut stream, &entries).await {
        Ok(count) => stream
            .shutdown()
            .await
            .map(|_| count)
            .map_err(TransferError::Socket),
        Err(e) => Err(e),
    };
    drop(stream);

    let reply = match outcome {
        Ok(count) => {
            info!("[{}] Listing sent, {} entries", link.peer(), count);
            Reply::new(226, "Directory send OK")
        }
        Err(e) => {
            error!("[{}] Listing failed: {}", link.peer(), e);
            Reply::new(426, "Connection closed; transfer aborted")
        }
    };
    link.finish(reply).await;
}
