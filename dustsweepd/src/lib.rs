//! Dustsweep Daemon Library
//!
//! Runtime for the dust sweep execution engine.
//!
//! # Architecture
//!
//! ```text
//! POST /intents ──► Context Store (TTL)
//!                        │ read once
//! GET /intents/:id/stream ──► Batch Orchestrator ──► Quote Aggregator ──► Route Providers
//!         ▲                        │
//!         └── SSE ◄── Streaming Protocol Adapter
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime (wiring, API server, context purge)
//! - **Streaming Protocol Adapter**: Orchestrator events → push-channel messages
//! - **API**: Intake and SSE endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use dustsweepd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::from_config(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod stream;

// Re-exports for convenience
pub use api::{create_router, ApiState, SweepOrchestrator};
pub use config::{ApiConfig, Config, Environment, ProviderConfig, SweepConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use stream::{StreamMessage, StreamingProtocolAdapter};
