//! Odos Smart Order Router Client
//!
//! Implements [`RouteProvider`] over the Odos two-step flow:
//! `POST /sor/quote/v2` prices a path, `POST /sor/assemble` turns the
//! returned `pathId` into a router transaction. The router is both the
//! approve target and the call target.
//!
//! Errors follow the same taxonomy as the LI.FI client: HTTP status first,
//! then a "no viable path" body on a 4xx is reclassified as `NoRoute`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use dustsweep_domain::{Address, Quote};
use dustsweep_exec::{ProviderError, ProviderErrorKind, RouteParams, RouteProvider};

// =============================================================================
// Constants
// =============================================================================

/// Odos API base URL
pub const ODOS_API_URL: &str = "https://api.odos.xyz";

/// Provider name used in quotes and retry policy lookup
pub const PROVIDER_NAME: &str = "odos";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Gas limit used when neither step reports one.
const DEFAULT_SWAP_GAS_LIMIT: u64 = 500_000;

// =============================================================================
// Client
// =============================================================================

/// Odos quote + assemble client.
pub struct OdosClient {
    /// HTTP client
    client: Client,
    /// API base URL, without trailing slash
    base_url: String,
    /// Referral code registered with Odos (0 = none)
    referral_code: u32,
    /// Transport-level timeout, applied to each step
    request_timeout: Duration,
}

impl OdosClient {
    /// Create a client against the public API.
    pub fn new() -> Self {
        Self::with_base_url(ODOS_API_URL)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            referral_code: 0,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Override the transport-level timeout.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Body of the quote step.
    fn quote_request(&self, params: &RouteParams) -> QuoteRequest {
        QuoteRequest {
            chain_id: params.chain_id,
            input_tokens: vec![InputToken {
                token_address: params.from_token.to_string(),
                amount: params.from_amount.to_string(),
            }],
            output_tokens: vec![OutputToken {
                token_address: params.to_token.to_string(),
                proportion: 1,
            }],
            user_addr: params.user_address.to_string(),
            // Odos takes slippage in percent
            slippage_limit_percent: (params.slippage * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.5),
            referral_code: self.referral_code,
            compact: true,
        }
    }

    /// POST a JSON body and decode a 2xx response.
    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.post(&url).json(body);

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| ProviderError::new(PROVIDER_NAME, ProviderErrorKind::Timeout, "request timed out"))?
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| decode_error(format!("{} body: {}", path, e)))
    }
}

impl Default for OdosClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteProvider for OdosClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn quote(&self, params: &RouteParams) -> Result<Quote, ProviderError> {
        debug!(token = %params.from_symbol, chain_id = params.chain_id, "Requesting Odos quote");

        let quote: QuoteResponse = self.post("/sor/quote/v2", &self.quote_request(params)).await?;
        let assembled: AssembleResponse = self
            .post(
                "/sor/assemble",
                &AssembleRequest {
                    user_addr: params.user_address.to_string(),
                    path_id: quote.path_id.clone(),
                    simulate: false,
                },
            )
            .await?;

        build_quote(quote, assembled)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    chain_id: u64,
    input_tokens: Vec<InputToken>,
    output_tokens: Vec<OutputToken>,
    user_addr: String,
    slippage_limit_percent: f64,
    referral_code: u32,
    compact: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputToken {
    token_address: String,
    amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputToken {
    token_address: String,
    proportion: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssembleRequest {
    user_addr: String,
    path_id: String,
    simulate: bool,
}

/// Quote step response (fields we use).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    path_id: String,
    out_amounts: Vec<String>,
    #[serde(default)]
    out_values: Vec<Decimal>,
    #[serde(default)]
    gas_estimate: Option<Decimal>,
    #[serde(default)]
    gas_estimate_value: Option<Decimal>,
}

/// Assemble step response (fields we use).
#[derive(Debug, Deserialize)]
struct AssembleResponse {
    transaction: AssembledTransaction,
}

#[derive(Debug, Deserialize)]
struct AssembledTransaction {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<i64>,
}

/// Odos error body.
#[derive(Debug, Deserialize)]
struct OdosErrorResponse {
    detail: String,
}

// =============================================================================
// Response Parsing
// =============================================================================

fn decode_error(message: impl Into<String>) -> ProviderError {
    ProviderError::new(PROVIDER_NAME, ProviderErrorKind::Decode, message)
}

/// Gas limit from the assembled tx, else the quote estimate rounded up.
fn gas_limit(tx_gas: Option<i64>, estimate: Option<Decimal>) -> u64 {
    // Unsimulated assembly reports gas as -1
    if let Some(gas) = tx_gas.filter(|g| *g > 0) {
        return gas.unsigned_abs();
    }
    estimate
        .filter(|e| *e > Decimal::ZERO)
        .and_then(|e| e.ceil().to_u64())
        .unwrap_or(DEFAULT_SWAP_GAS_LIMIT)
}

/// Combine both steps into a [`Quote`].
fn build_quote(priced: QuoteResponse, assembled: AssembleResponse) -> Result<Quote, ProviderError> {
    let to_amount_raw = priced
        .out_amounts
        .first()
        .cloned()
        .ok_or_else(|| decode_error("quote has no output amount"))?;
    let to_usd = priced.out_values.first().copied().unwrap_or(Decimal::ZERO);
    let gas_cost_usd = priced.gas_estimate_value.unwrap_or(Decimal::ZERO);

    let tx = assembled.transaction;
    let value = match tx.value.as_deref() {
        Some(raw) if !raw.is_empty() => raw
            .parse::<u128>()
            .map_err(|e| decode_error(format!("value '{}': {}", raw, e)))?,
        _ => 0,
    };
    let router = Address::parse(&tx.to).map_err(|e| decode_error(e.to_string()))?;

    let quote = Quote {
        provider: PROVIDER_NAME.to_string(),
        to_amount_raw,
        to_usd,
        gas_cost_usd,
        approve_target: router.clone(),
        call_target: router,
        call_data: tx.data,
        value,
        gas_limit: gas_limit(tx.gas, priced.gas_estimate),
    };

    debug!(path_id = %priced.path_id, net_value_usd = %quote.net_value(), "Parsed Odos quote");
    Ok(quote)
}

/// Map a non-2xx response onto the provider error taxonomy.
fn classify_failure(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<OdosErrorResponse>(body)
        .map(|e| e.detail)
        .unwrap_or_else(|_| body.to_string());

    let mut error = ProviderError::from_status(PROVIDER_NAME, status, message.clone());
    let lowered = message.to_lowercase();
    if (400..500).contains(&status) && (lowered.contains("no viable path") || lowered.contains("no route")) {
        error.kind = ProviderErrorKind::NoRoute;
    }
    error
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        ProviderErrorKind::Network
    } else if e.is_decode() || e.is_body() {
        ProviderErrorKind::Decode
    } else {
        ProviderErrorKind::Other
    };
    ProviderError::new(PROVIDER_NAME, kind, e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
