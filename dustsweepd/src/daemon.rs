//! Daemon: Main runtime.
//!
//! The Daemon ties together all components:
//! - Quote aggregator over the configured route providers
//! - Batch orchestrator (fees, insertion planning, ledger)
//! - Context store (intents parked between intake and stream)
//! - API Server (intake + SSE stream)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Wire providers, oracle and registry
//! 3. Start API server
//! 4. Purge expired contexts periodically
//! 5. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use dustsweep_connectors::{BinancePriceOracle, LifiClient, OdosClient};
use dustsweep_exec::{
    BatchOrchestrator, MemoryContextStore, OrchestratorConfig, PriceOracle, QuoteAggregator,
    RouteProvider, StaticTokenRegistry, StubPriceOracle, StubRouteProvider,
};

use crate::api::{create_router, ApiState, SweepOrchestrator};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::stream::StreamingProtocolAdapter;

/// Interval between expired-context sweeps.
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Daemon
// =============================================================================

/// The main dustsweep daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Shared API state
    state: Arc<ApiState>,
    /// Cancels background tasks on shutdown
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a new daemon with stub providers (for testing/development).
    pub fn new_stub(config: Config) -> Self {
        let providers: Vec<Arc<dyn RouteProvider>> = vec![
            Arc::new(StubRouteProvider::new("stub-alpha", dec!(9.80), dec!(0.20))) as Arc<dyn RouteProvider>,
            Arc::new(StubRouteProvider::new("stub-beta", dec!(9.60), dec!(0.15))) as Arc<dyn RouteProvider>,
        ];
        let oracle: Arc<dyn PriceOracle> = Arc::new(StubPriceOracle::with_defaults());

        Self::new(config, providers, oracle)
    }

    /// Create a daemon from configuration.
    ///
    /// Every configured route provider is quoted; runs on stubs when none is.
    pub fn from_config(config: Config) -> Self {
        if config.uses_stub_providers() {
            info!("No route provider configured, using stubs");
            return Self::new_stub(config);
        }

        let timeout = config.providers.retry.request_timeout;
        let mut providers: Vec<Arc<dyn RouteProvider>> = Vec::new();
        if let Some(url) = &config.providers.lifi_base_url {
            let lifi = LifiClient::with_base_url(url.clone(), config.providers.lifi_api_key.clone()).with_timeout(timeout);
            providers.push(Arc::new(lifi));
        }
        if let Some(url) = &config.providers.odos_base_url {
            providers.push(Arc::new(OdosClient::with_base_url(url.clone()).with_timeout(timeout)));
        }

        let oracle: Arc<dyn PriceOracle> =
            Arc::new(BinancePriceOracle::with_base_url(config.providers.binance_base_url.clone()));

        Self::new(config, providers, oracle)
    }

    /// Create a new daemon with provided components.
    pub fn new(config: Config, providers: Vec<Arc<dyn RouteProvider>>, oracle: Arc<dyn PriceOracle>) -> Self {
        let registry = Arc::new(StaticTokenRegistry::with_defaults());
        let aggregator = Arc::new(QuoteAggregator::new(providers, config.providers.retry.clone()));

        let orchestrator: Arc<SweepOrchestrator> = Arc::new(BatchOrchestrator::new(
            aggregator,
            oracle,
            Arc::clone(&registry),
            OrchestratorConfig {
                treasury_address: config.sweep.treasury_address.clone(),
                insertion: config.sweep.insertion,
            },
        ));

        let state = Arc::new(ApiState {
            orchestrator,
            contexts: Arc::new(MemoryContextStore::new()),
            registry,
            adapter: StreamingProtocolAdapter::new(),
            sweep: config.sweep.clone(),
        });

        Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon.
    ///
    /// This method blocks until SIGINT or until the shutdown token is cancelled.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            treasury = %self.config.sweep.treasury_address,
            providers = self.state.orchestrator.provider_count(),
            "Starting dustsweep daemon"
        );

        // 1. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 2. Expired context sweeper
        let purge = tokio::spawn(purge_loop(Arc::clone(&self.state.contexts), self.shutdown.clone()));

        // 3. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 4. Graceful shutdown
        self.shutdown.cancel();
        if let Err(e) = purge.await {
            error!(error = %e, "Context purge task failed");
        }
        let pending_intents = self.state.contexts.len().await;
        info!(pending_intents, "Shutdown complete");

        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let router = create_router(Arc::clone(&self.state));
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        let shutdown = self.shutdown.clone();

        // Spawn the server task
        tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }
}

/// Drop expired contexts until cancelled.
async fn purge_loop(contexts: Arc<MemoryContextStore>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = contexts.purge_expired(Utc::now()).await;
                if removed > 0 {
                    debug!(removed, "Expired intents dropped");
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
