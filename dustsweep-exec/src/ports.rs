//! Execution layer port definitions.
//!
//! Ports define the interfaces for external collaborators (route providers,
//! price oracle, token registry, context store). Adapters implement these
//! ports for specific services (LI.FI, stub, in-memory, etc.).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dustsweep_domain::value_objects::u128_string;
use dustsweep_domain::{Address, ExecutionContext, IntentId, Price, Quote};

use crate::error::{ExecResult, ProviderError};

// =============================================================================
// Route Provider Port
// =============================================================================

/// Everything a provider needs to quote one token's swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParams {
    /// EVM chain id
    pub chain_id: u64,
    /// Token being sold
    pub from_token: Address,
    /// Symbol of the token being sold (logging only)
    pub from_symbol: String,
    /// Amount sold, smallest units
    #[serde(with = "u128_string")]
    pub from_amount: u128,
    /// Token being bought
    pub to_token: Address,
    /// Decimals of the token being bought
    pub to_decimals: u8,
    /// Wallet executing the swap
    pub user_address: Address,
    /// Max slippage as a fraction
    pub slippage: Decimal,
}

/// Port for a swap-route provider.
///
/// Implementations:
/// - `StubRouteProvider` - Scripted quotes and failures for testing
/// - `LifiClient` - LI.FI quote API
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Provider name, used as the key for its retry policy.
    fn name(&self) -> &str;

    /// Request a single route quote.
    ///
    /// Failures must be classified into a `ProviderErrorKind` so the
    /// aggregator can decide whether to retry.
    async fn quote(&self, params: &RouteParams) -> Result<Quote, ProviderError>;
}

// =============================================================================
// Price Oracle Port
// =============================================================================

/// Port for USD spot prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current USD price for `symbol` (e.g., "ETH").
    async fn get_price(&self, symbol: &str) -> ExecResult<Price>;
}

// =============================================================================
// Token Registry Port
// =============================================================================

/// Static per-chain token lookups.
pub trait TokenRegistry: Send + Sync {
    /// Wrapped native asset contract for `chain_id`, if known.
    fn get_wrapped_native_address(&self, chain_id: u64) -> Option<Address>;

    /// Price-oracle symbol of the native asset for `chain_id`, if known.
    fn native_symbol(&self, chain_id: u64) -> Option<String>;
}

// =============================================================================
// Execution Context Store Port
// =============================================================================

/// TTL-bound storage of execution contexts between intake and streaming.
#[async_trait]
pub trait ExecutionContextStore: Send + Sync {
    /// Store a context under its intent id.
    async fn put(&self, context: ExecutionContext) -> ExecResult<()>;

    /// Fetch a context; expired contexts read as `None`.
    async fn get(&self, intent_id: IntentId) -> ExecResult<Option<ExecutionContext>>;

    /// Remove a context. Returns whether it was present.
    async fn delete(&self, intent_id: IntentId) -> ExecResult<bool>;

    /// Remove and return a live context in one step.
    ///
    /// At most one caller gets `Some` for a given intent. An expired
    /// context is removed and reads as `None`.
    async fn take(&self, intent_id: IntentId) -> ExecResult<Option<ExecutionContext>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_route_params_serialization() {
        let params = RouteParams {
            chain_id: 8453,
            from_token: Address::parse("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap(),
            from_symbol: "USDC".to_string(),
            from_amount: 123_456_789_012_345_678_901_234_567_890,
            to_token: Address::parse("0x4200000000000000000000000000000000000006").unwrap(),
            to_decimals: 18,
            user_address: Address::parse("0x000000000000000000000000000000000000dEaD").unwrap(),
            slippage: dec!(0.005),
        };

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["fromAmount"], "123456789012345678901234567890");

        let parsed: RouteParams = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, params);
    }
}
