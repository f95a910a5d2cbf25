use anyhow::{Context, Result};
use log::{error, info};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::Config;

/// Sends a response to the client.
pub async fn send_response(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    message: &[u8],
) -> Result<(), std::io::Error> {
    let mut writer = writer.lock().await;
    writer.write_all(message).await?;
    writer.flush().await?;
    Ok(())
}

// Helper function to log configuration options
pub fn log_config(config: &Config) {
    let server = &config.server;
    info!("  Listen Address: {}:{}", server.listen_address, server.listen_port);
    info!("  Root Directory: {}", server.root_dir);
    info!(
        "  PASV Address: {}",
        server.pasv_address.as_deref().unwrap_or("(control connection address)")
    );
    info!(
        "  PASV Port Range: {}-{}",
        server.pasv_port_min, server.pasv_port_max
    );
    info!("  Data Timeout: {}s", server.data_timeout_secs);
    info!("  Sweep Interval: {}ms", server.sweep_interval_ms);
    info!("  Download Chunk Size: {} bytes", server.download_chunk_size);
    info!("  Upload Buffer Size: {} bytes", server.upload_buffer_size);
}

/// Reads the banner file shown before the greeting line.
pub fn load_banner(path: &str) -> Result<String> {
    let banner = fs::read_to_string(path)
        .map_err(|e| {
            error!("Failed to read banner file: {}: {}", path, e);
            anyhow::Error::new(e)
        })
        .with_context(|| format!("Failed to read banner file: {}", path))?;

    if banner.trim().is_empty() {
        error!("Banner file is empty: {}", path);
        return Err(anyhow::Error::msg("Banner file is empty."));
    }

    info!("Banner file loaded successfully: {}", path);
    Ok(banner)
}

/// Builds the 220 greeting, with banner lines as `220-` continuation lines.
pub fn format_greeting(banner: Option<&str>, greeting: &str) -> String {
    let mut response = String::new();
    if let Some(banner) = banner {
        for line in banner.lines() {
            response.push_str(&format!("220-{}\r\n", line.trim_end()));
        }
    }
    response.push_str(&format!("220 {}\r\n", greeting));
    response
}

/// IPv4 address of the local end of the control connection, if it has one.
pub fn local_ipv4(socket: &TcpStream) -> Option<Ipv4Addr> {
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}
