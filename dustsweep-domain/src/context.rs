//! Execution Context for a Sweep Intent
//!
//! An intake layer validates a sweep request and parks it here under an
//! opaque intent id until the streaming phase picks it up. The context is
//! read once, then deleted on completion or expiry.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::DustToken;
use crate::value_objects::{Address, DomainError};

/// Unique identifier for a sweep intent
pub type IntentId = Uuid;

/// Everything the streaming phase needs to run one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Opaque id the client streams against
    pub intent_id: IntentId,
    /// Wallet whose balances are swept
    pub user_address: Address,
    /// EVM chain id
    pub chain_id: u64,
    /// Token being swept into
    pub to_token_address: Address,
    /// Decimals of the target token
    pub to_token_decimals: u8,
    /// Optional referrer receiving part of the fee
    pub referral_address: Option<Address>,
    /// Max slippage as a fraction (0.005 = 0.5%)
    pub slippage: Option<Decimal>,
    /// Dust tokens, chunked in input order
    pub batches: Vec<Vec<DustToken>>,
    /// When the context was created
    pub created_at: DateTime<Utc>,
    /// When the context stops being readable
    pub expires_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Build a context, chunking `dust_tokens` into batches of `batch_size`.
    ///
    /// Input order is preserved across batches.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidContext` if `batch_size` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_address: Address,
        chain_id: u64,
        dust_tokens: Vec<DustToken>,
        to_token_address: Address,
        to_token_decimals: u8,
        referral_address: Option<Address>,
        slippage: Option<Decimal>,
        batch_size: usize,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        if batch_size == 0 {
            return Err(DomainError::InvalidContext("batch size must be positive".to_string()));
        }

        let batches = dust_tokens.chunks(batch_size).map(<[DustToken]>::to_vec).collect();
        let created_at = Utc::now();

        Ok(Self {
            intent_id: Uuid::now_v7(),
            user_address,
            chain_id,
            to_token_address,
            to_token_decimals,
            referral_address,
            slippage,
            batches,
            created_at,
            expires_at: created_at + ttl,
        })
    }

    /// Total number of dust tokens across batches.
    pub fn token_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Tokens in input order.
    pub fn tokens(&self) -> impl Iterator<Item = &DustToken> {
        self.batches.iter().flatten()
    }

    /// Whether the context has passed its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Tests
// =============================================================================
