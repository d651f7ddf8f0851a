//! Stub implementations for testing.
//!
//! These implementations simulate route providers and price feeds
//! without making real API calls.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use dustsweep_domain::{Address, Price, Quote};

use crate::error::{ExecError, ExecResult, ProviderError, ProviderErrorKind};
use crate::ports::{PriceOracle, RouteParams, RouteProvider};

/// Router used as approve and call target by stub quotes (`0x1111…1111`).
pub fn stub_router_address() -> Address {
    Address::from_bytes([0x11; 20])
}

// =============================================================================
// Stub Route Provider
// =============================================================================

/// Stub route provider for testing.
///
/// Quotes a fixed output for every token unless a failure has been
/// configured for that token. Scripted responses, if queued, are returned
/// first.
pub struct StubRouteProvider {
    /// Provider name
    name: String,
    /// Output value of every quote
    to_usd: Decimal,
    /// Gas cost of every quote
    gas_cost_usd: Decimal,
    /// Tokens (lowercase address) that always fail, with the failure kind
    failing_tokens: RwLock<HashMap<String, ProviderErrorKind>>,
    /// One-shot responses consumed before the default behaviour
    scripted: Mutex<VecDeque<Result<Quote, ProviderError>>>,
    /// Number of `quote` calls received
    calls: AtomicUsize,
}

impl StubRouteProvider {
    /// Create a provider quoting `to_usd` output at `gas_cost_usd` gas.
    pub fn new(name: impl Into<String>, to_usd: Decimal, gas_cost_usd: Decimal) -> Self {
        Self {
            name: name.into(),
            to_usd,
            gas_cost_usd,
            failing_tokens: RwLock::new(HashMap::new()),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every quote for `token` fail with `kind`.
    pub fn fail_token(&self, token: &Address, kind: ProviderErrorKind) {
        let mut failing = self.failing_tokens.write().unwrap_or_else(PoisonError::into_inner);
        failing.insert(token.as_str().to_lowercase(), kind);
    }

    /// Queue a one-shot response.
    pub fn push_response(&self, response: Result<Quote, ProviderError>) {
        let mut scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
        scripted.push_back(response);
    }

    /// Number of `quote` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Build the quote this stub returns by default.
    pub fn default_quote(&self, params: &RouteParams) -> Quote {
        stub_quote(&self.name, params, self.to_usd, self.gas_cost_usd)
    }
}

#[async_trait]
impl RouteProvider for StubRouteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, params: &RouteParams) -> Result<Quote, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(response) = scripted {
            return response;
        }

        let failure = self
            .failing_tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&params.from_token.as_str().to_lowercase())
            .copied();
        if let Some(kind) = failure {
            return Err(ProviderError::new(
                &self.name,
                kind,
                format!("simulated failure for {}", params.from_symbol),
            ));
        }

        Ok(self.default_quote(params))
    }
}

/// A quote routed through [`stub_router_address`].
pub fn stub_quote(provider: &str, params: &RouteParams, to_usd: Decimal, gas_cost_usd: Decimal) -> Quote {
    let router = stub_router_address();
    Quote {
        provider: provider.to_string(),
        to_amount_raw: params.from_amount.to_string(),
        to_usd,
        gas_cost_usd,
        approve_target: router.clone(),
        call_target: router,
        call_data: "0x12aa3caf".to_string(),
        value: 0,
        gas_limit: 250_000,
    }
}

// =============================================================================
// Stub Price Oracle
// =============================================================================

/// Stub price oracle with settable prices.
pub struct StubPriceOracle {
    /// Prices by uppercase symbol
    prices: RwLock<HashMap<String, Decimal>>,
    /// Whether lookups should fail
    unavailable: RwLock<bool>,
}

impl StubPriceOracle {
    /// Create an oracle with no prices.
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            unavailable: RwLock::new(false),
        }
    }

    /// Create an oracle with common native asset prices.
    pub fn with_defaults() -> Self {
        let oracle = Self::new();
        oracle.set_price("ETH", Decimal::from(3000));
        oracle.set_price("MATIC", Decimal::new(75, 2));
        oracle
    }

    /// Set price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(symbol.to_uppercase(), price);
    }

    /// Make every lookup fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap_or_else(PoisonError::into_inner) = unavailable;
    }
}

impl Default for StubPriceOracle {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl PriceOracle for StubPriceOracle {
    async fn get_price(&self, symbol: &str) -> ExecResult<Price> {
        if *self.unavailable.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(ExecError::PriceOracle("simulated outage".to_string()));
        }

        let price = self
            .prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| ExecError::PriceOracle(format!("no price for {}", symbol)))?;

        Ok(Price::new(price)?)
    }
}

// =============================================================================
// Tests
// =============================================================================
