use anyhow::{Context, Result};
use log::{debug, error, info};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::core_fs::RootedFs;
use crate::core_network::network;
use crate::core_network::pasv::PortAllocator;
use crate::helpers::{load_banner, log_config};
use crate::session::{SessionId, SessionTable};
use crate::watchdog::start_watchdog;

/// Read-only state shared by every session.
pub struct ServerContext {
    pub config: Config,
    pub fs: RootedFs,
    pub ports: PortAllocator,
    /// Configured PASV address; sessions fall back to their control socket address.
    pub pasv_ip: Option<Ipv4Addr>,
    pub banner: Option<String>,
}

impl ServerContext {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let server = &config.server;
        let fs = RootedFs::new(&server.root_dir)
            .with_context(|| format!("Invalid root directory: {}", server.root_dir))?;
        info!("Serving files from {}", fs.root().display());
        let ports = PortAllocator::new(server.listen_ip()?, server.pasv_port_min, server.pasv_port_max);
        let pasv_ip = server.pasv_ipv4()?;
        let banner = match server.banner_file.as_deref() {
            Some(path) => Some(load_banner(path)?),
            None => None,
        };
        Ok(Self {
            config,
            fs,
            ports,
            pasv_ip,
            banner,
        })
    }
}

/// A running FTP server: the control listener, its sessions and the sweep.
pub struct FtpServer {
    local_addr: SocketAddr,
    table: Arc<SessionTable>,
    ctx: Arc<ServerContext>,
    running: AtomicBool,
    accept_task: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl FtpServer {
    /// Binds the control listener and starts accepting clients.
    pub async fn start(config: Config) -> Result<Self> {
        let ctx = Arc::new(ServerContext::new(config)?);
        let server = &ctx.config.server;
        let listener = TcpListener::bind((server.listen_ip()?, server.listen_port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind {}:{}",
                    server.listen_address, server.listen_port
                )
            })?;
        let local_addr = listener.local_addr()?;

        let table = Arc::new(SessionTable::default());
        let watchdog = start_watchdog(
            Arc::clone(&table),
            server.sweep_interval(),
            server.data_timeout(),
        );
        let accept_task = tokio::spawn(network::start_server(
            listener,
            Arc::clone(&ctx),
            Arc::clone(&table),
        ));
        info!("Server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            table,
            ctx,
            running: AtomicBool::new(true),
            accept_task,
            watchdog,
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of sessions not yet reaped by the sweep.
    pub fn client_count(&self) -> usize {
        self.table.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.table.session_ids()
    }

    /// Marks one session for close; the next sweep releases it.
    #[cfg(test)]
    pub fn request_close(&self, id: SessionId) -> bool {
        self.table.mark_for_close(id)
    }

    /// Stops accepting clients and closes every session. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.accept_task.abort();
        self.watchdog.abort();
        self.table.mark_all_for_close();
        let report = self.table.sweep(self.ctx.config.server.data_timeout()).await;
        info!(
            "Server on {} stopped, {} session(s) closed",
            self.local_addr, report.reaped
        );
    }
}

/// Runs the FTP server until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    info!("Starting server with config:");
    log_config(&config);

    let server = match FtpServer::start(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {:#}", e);
            return Err(e);
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!(
        "Shutdown requested, {} client(s) connected",
        server.client_count()
    );
    debug!("Open sessions: {:?}", server.session_ids());
    server.stop().await;
    Ok(())
}
