//! Execution layer error types.

use std::fmt;

use thiserror::Error;

/// Classification of a route-provider failure.
///
/// The retry predicate is a pure function of the kind (and message), so
/// adapters must map their wire errors onto these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Provider found no route or liquidity for the pair
    NoRoute,
    /// Request was malformed (4xx other than auth/rate-limit)
    BadRequest,
    /// API key missing or rejected
    Unauthorized,
    /// Provider is throttling us (429)
    RateLimited,
    /// Request did not complete in time
    Timeout,
    /// Connection-level failure
    Network,
    /// Provider-side failure with HTTP status
    Server(u16),
    /// Response body did not match the expected shape
    Decode,
    /// Anything else
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::NoRoute => write!(f, "no_route"),
            ProviderErrorKind::BadRequest => write!(f, "bad_request"),
            ProviderErrorKind::Unauthorized => write!(f, "unauthorized"),
            ProviderErrorKind::RateLimited => write!(f, "rate_limited"),
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::Network => write!(f, "network"),
            ProviderErrorKind::Server(status) => write!(f, "server_{}", status),
            ProviderErrorKind::Decode => write!(f, "decode"),
            ProviderErrorKind::Other => write!(f, "other"),
        }
    }
}

/// A single failed call to a route provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} ({kind}): {message}")]
pub struct ProviderError {
    /// Provider name
    pub provider: String,
    /// Failure class
    pub kind: ProviderErrorKind,
    /// Provider-supplied or local message
    pub message: String,
}

impl ProviderError {
    /// Create a provider error.
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Unauthorized,
            404 => ProviderErrorKind::NoRoute,
            429 => ProviderErrorKind::RateLimited,
            400..=499 => ProviderErrorKind::BadRequest,
            500..=599 => ProviderErrorKind::Server(status),
            _ => ProviderErrorKind::Other,
        };
        Self::new(provider, kind, format!("HTTP {}: {}", status, body.into()))
    }
}

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Every provider failed for one token
    #[error("No quotes available for {token}: {} provider(s) failed", failures.len())]
    NoQuotesAvailable {
        /// Token symbol or address
        token: String,
        /// Final error of each provider
        failures: Vec<ProviderError>,
    },

    /// Malformed run input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No wrapped native / native symbol known for the chain
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    /// Price oracle failure
    #[error("Price oracle error: {0}")]
    PriceOracle(String),

    /// Execution context store failure
    #[error("Context store error: {0}")]
    ContextStore(String),

    /// Invariant violated during a run
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] dustsweep_domain::DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] dustsweep_engine::EngineError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
