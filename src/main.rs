mod config;
mod constants;
mod core_cli;
mod core_fs;
mod core_ftpcommand;
mod core_log;
mod core_network;
mod core_transfer;
mod helpers;
mod server;
mod session;
mod watchdog;

use crate::config::Config;
use crate::core_cli::Cli;
use crate::core_log::logger::init_logger;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    init_logger(args.verbose);

    // Determine the default config path based on the OS
    let default_config_path = if cfg!(target_os = "windows") {
        "C:\\sdftpd\\sdftpd.conf"
    } else {
        "/etc/sdftpd.conf"
    };

    // An explicit path must exist; the default one is optional
    let mut config = match args.config.as_deref() {
        Some(path) => Config::load_from_file(path)?,
        None if Path::new(default_config_path).exists() => {
            Config::load_from_file(default_config_path)?
        }
        None => {
            info!(
                "No configuration file at {}, using defaults",
                default_config_path
            );
            Config::default()
        }
    };

    if let Some(port) = args.port {
        config.server.listen_port = port;
    }
    if let Some(root) = args.root {
        config.server.root_dir = root;
    }

    // Run the FTP server
    server::run(config).await
}
