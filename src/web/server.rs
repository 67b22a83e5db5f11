//! Web server for nimbus.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::archive::ArchiveSupervisor;
use crate::config::{ArchiveConfig, Config, ServerConfig};
use crate::storage::{StorageRoot, StorageService};
use crate::{NimbusError, Result};

use super::handlers::AppState;
use super::router::{create_health_router, create_router, create_static_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Server configuration.
    server_config: ServerConfig,
    /// Archive configuration (sweep timing).
    archive_config: ArchiveConfig,
}

impl WebServer {
    /// Create a new web server around existing services.
    pub fn new(
        config: &Config,
        storage: StorageService,
        archives: Arc<ArchiveSupervisor>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| NimbusError::Config(format!("invalid server address: {e}")))?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(storage, archives)),
            server_config: config.server.clone(),
            archive_config: config.archive.clone(),
        })
    }

    /// Create a web server, opening the storage root and archive scratch
    /// directory named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let root = StorageRoot::open(&config.storage.root)?;
        tracing::info!("Storage root: {}", root.path().display());

        let archives = Arc::new(ArchiveSupervisor::from_config(&config.archive)?);
        // Artifacts stay outside the storage root.
        if root.contains(archives.scratch_dir())? {
            return Err(NimbusError::Config(format!(
                "archive scratch directory {} must be outside the storage root {}",
                archives.scratch_dir().display(),
                root.path().display()
            )));
        }
        tracing::info!(
            "Archive scratch directory: {}",
            archives.scratch_dir().display()
        );

        let storage =
            StorageService::new(root).with_max_upload_size(config.storage.max_upload_size_bytes());

        Self::new(config, storage, archives)
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Application state shared by all handlers.
    pub fn app_state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    fn build_router(&self) -> Router {
        let mut router = create_router(
            Arc::clone(&self.app_state),
            &self.server_config.cors_origins,
        )
        .merge(create_health_router());

        if self.server_config.serve_static {
            if let Some(static_router) = create_static_router(&self.server_config.static_path) {
                router = router.merge(static_router);
            }
        }

        router
    }

    fn start_sweep_task(&self) {
        let interval = Duration::from_secs(self.archive_config.sweep_interval_secs);
        let ttl = Duration::from_secs(self.archive_config.stale_job_ttl_secs);

        if interval.is_zero() {
            tracing::info!("Stale archive sweep disabled");
            return;
        }

        self.app_state.archives.start_sweep_task(interval, ttl);
        tracing::info!(
            "Stale archive sweep started (every {}s, ttl {}s)",
            interval.as_secs(),
            ttl.as_secs()
        );
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = self.build_router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        // Start after a successful bind
        self.start_sweep_task();

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let router = self.build_router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        self.start_sweep_task();

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
