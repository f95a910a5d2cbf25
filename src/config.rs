use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::constants::{
    DEFAULT_DATA_TIMEOUT_SECS, DEFAULT_DOWNLOAD_CHUNK_SIZE, DEFAULT_PASV_PORT_MAX,
    DEFAULT_PASV_PORT_MIN, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_UPLOAD_BUFFER_SIZE,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub root_dir: String,
    /// Address advertised in PASV replies. Falls back to the local end of the
    /// control connection when unset.
    pub pasv_address: Option<String>,
    pub pasv_port_min: u16,
    pub pasv_port_max: u16,
    pub data_timeout_secs: u64,
    pub sweep_interval_ms: u64,
    pub download_chunk_size: usize,
    pub upload_buffer_size: usize,
    pub greeting: String,
    pub banner_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: String::from("0.0.0.0"),
            listen_port: 21,
            root_dir: String::from("/sdcard"),
            pasv_address: None,
            pasv_port_min: DEFAULT_PASV_PORT_MIN,
            pasv_port_max: DEFAULT_PASV_PORT_MAX,
            data_timeout_secs: DEFAULT_DATA_TIMEOUT_SECS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
            upload_buffer_size: DEFAULT_UPLOAD_BUFFER_SIZE,
            greeting: String::from("Welcome to the FTP server"),
            banner_file: None,
        }
    }
}

impl ServerConfig {
    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn listen_ip(&self) -> Result<IpAddr> {
        self.listen_address
            .parse()
            .with_context(|| format!("Invalid listen_address: {}", self.listen_address))
    }

    /// Parses `pasv_address`, ignoring it when it is unset or unspecified.
    pub fn pasv_ipv4(&self) -> Result<Option<Ipv4Addr>> {
        match self.pasv_address.as_deref() {
            None | Some("") => Ok(None),
            Some(addr) => {
                let ip: Ipv4Addr = addr
                    .parse()
                    .with_context(|| format!("Invalid pasv_address: {}", addr))?;
                Ok((!ip.is_unspecified()).then_some(ip))
            }
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path))
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.pasv_port_min > server.pasv_port_max {
            bail!(
                "pasv_port_min ({}) is greater than pasv_port_max ({})",
                server.pasv_port_min,
                server.pasv_port_max
            );
        }
        if server.download_chunk_size == 0 {
            bail!("download_chunk_size must be greater than zero");
        }
        if server.upload_buffer_size == 0 {
            bail!("upload_buffer_size must be greater than zero");
        }
        if server.sweep_interval_ms == 0 {
            bail!("sweep_interval_ms must be greater than zero");
        }
        server.listen_ip()?;
        server.pasv_ipv4()?;
        Ok(())
    }
}
