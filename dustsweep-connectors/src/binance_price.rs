//! Binance spot ticker as a USD price oracle.
//!
//! Native-asset symbols are priced against USDT via the public
//! `GET /api/v3/ticker/price` endpoint; no credentials are needed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use dustsweep_domain::Price;
use dustsweep_exec::{ExecError, ExecResult, PriceOracle};

/// Binance REST API base URL (Spot)
pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Quote asset every symbol is priced against
const QUOTE_ASSET: &str = "USDT";

/// Public ticker client implementing [`PriceOracle`].
pub struct BinancePriceOracle {
    /// HTTP client
    client: Client,
    /// API base URL, without trailing slash
    base_url: String,
    /// Symbol renames where the Binance ticker differs from the chain's symbol
    aliases: HashMap<String, String>,
}

impl BinancePriceOracle {
    /// Create an oracle against the public API.
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_API_URL)
    }

    /// Create an oracle against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut aliases = HashMap::new();
        // Polygon's native asset trades as POL since the migration
        aliases.insert("MATIC".to_string(), "POL".to_string());

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            aliases,
        }
    }

    /// Binance pair for an asset symbol (e.g., "eth" → "ETHUSDT").
    pub fn pair_for(&self, symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        let base = self.aliases.get(&upper).cloned().unwrap_or(upper);
        format!("{}{}", base, QUOTE_ASSET)
    }
}

impl Default for BinancePriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

/// Ticker price response.
#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: Decimal,
}

/// Binance error body.
#[derive(Debug, Deserialize)]
struct BinanceErrorResponse {
    code: i64,
    msg: String,
}

fn parse_ticker(body: &str) -> ExecResult<Price> {
    let response: TickerPriceResponse = serde_json::from_str(body)
        .map_err(|e| ExecError::PriceOracle(format!("Failed to parse response: {}", e)))?;

    Price::new(response.price)
        .map_err(|e| ExecError::PriceOracle(format!("Invalid price in response: {}", e)))
}

#[async_trait]
impl PriceOracle for BinancePriceOracle {
    async fn get_price(&self, symbol: &str) -> ExecResult<Price> {
        let pair = self.pair_for(symbol);
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let response = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.get(&url).query(&[("symbol", pair.as_str())]).send(),
        )
        .await
        .map_err(|_| ExecError::PriceOracle("Request timed out".to_string()))?
        .map_err(|e| ExecError::PriceOracle(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecError::PriceOracle(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceErrorResponse>(&body) {
                return Err(ExecError::PriceOracle(format!(
                    "Binance API error for {}: {} - {}",
                    pair, err.code, err.msg
                )));
            }
            return Err(ExecError::PriceOracle(format!("HTTP {}: {}", status, body)));
        }

        let price = parse_ticker(&body)?;
        debug!(%pair, price = %price.as_decimal(), "Fetched native asset price");
        Ok(price)
    }
}

// =============================================================================
// Tests
// =============================================================================
