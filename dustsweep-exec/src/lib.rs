//! Dustsweep Execution Layer
//!
//! Runs sweeps against external route providers and price feeds.
//!
//! # Architecture
//!
//! ```text
//! ExecutionContext → BatchOrchestrator → QuoteAggregator → RouteProvider × N
//!                          │
//!                          └→ BatchEvent stream (per token, then terminal)
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for route providers, price oracle, token registry, context store
//! - **Retry**: Per-provider timeout, backoff and retry predicate
//! - **Aggregator**: Concurrent fan-out and second-best route selection
//! - **Orchestrator**: State machine producing the transaction ledger
//! - **Stub**: Test implementations for development
//!
//! # Example
//!
//! ```rust,ignore
//! use dustsweep_exec::{BatchOrchestrator, QuoteAggregator, RetryPolicy, StubPriceOracle, StaticTokenRegistry};
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! let aggregator = Arc::new(QuoteAggregator::new(providers, RetryPolicy::default()));
//! let orchestrator = Arc::new(BatchOrchestrator::new(
//!     aggregator,
//!     Arc::new(StubPriceOracle::with_defaults()),
//!     Arc::new(StaticTokenRegistry::with_defaults()),
//!     config,
//! ));
//!
//! let mut events = Box::pin(orchestrator.execute(context));
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

#![warn(clippy::all)]

pub mod aggregator;
pub mod context_store;
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod stub;

// Re-exports
pub use aggregator::{rank_quotes, select_quote, QuoteAggregator, RouteSelection};
pub use context_store::MemoryContextStore;
pub use error::{ExecError, ExecResult, ProviderError, ProviderErrorKind};
pub use orchestrator::{
    BatchEvent, BatchOrchestrator, BatchState, BatchSummary, InsertionSummary, OrchestratorConfig,
};
pub use ports::{ExecutionContextStore, PriceOracle, RouteParams, RouteProvider, TokenRegistry};
pub use registry::StaticTokenRegistry;
pub use retry::RetryPolicy;
pub use stub::{StubPriceOracle, StubRouteProvider};
