//! LI.FI Quote API Client
//!
//! Implements [`RouteProvider`] over the LI.FI `GET /v1/quote` endpoint.
//!
//! # Error mapping
//!
//! | Response                        | Kind            |
//! |---------------------------------|-----------------|
//! | 401 / 403                       | `Unauthorized`  |
//! | 404, or body says "no route"    | `NoRoute`       |
//! | 429                             | `RateLimited`   |
//! | other 4xx                       | `BadRequest`    |
//! | 5xx                             | `Server(status)`|
//! | transport timeout               | `Timeout`       |
//! | connection failure              | `Network`       |
//! | unexpected body shape           | `Decode`        |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use dustsweep_domain::{decode_hex_amount, Address, Quote};
use dustsweep_exec::{ProviderError, ProviderErrorKind, RouteParams, RouteProvider};

// =============================================================================
// Constants
// =============================================================================

/// LI.FI API base URL
pub const LIFI_API_URL: &str = "https://li.quest/v1";

/// Provider name used in quotes and retry policy lookup
pub const PROVIDER_NAME: &str = "lifi";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Client
// =============================================================================

/// LI.FI quote client.
pub struct LifiClient {
    /// HTTP client
    client: Client,
    /// API base URL, without trailing slash
    base_url: String,
    /// Optional API key sent as `x-lifi-api-key`
    api_key: Option<String>,
    /// Integrator tag sent with every quote
    integrator: String,
    /// Transport-level timeout
    request_timeout: Duration,
}

impl LifiClient {
    /// Create a client against the public API.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(LIFI_API_URL, api_key)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            integrator: "dustsweep".to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Override the transport-level timeout.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Query parameters for a quote request.
    fn quote_query(&self, params: &RouteParams) -> Vec<(&'static str, String)> {
        vec![
            ("fromChain", params.chain_id.to_string()),
            ("toChain", params.chain_id.to_string()),
            ("fromToken", params.from_token.to_string()),
            ("toToken", params.to_token.to_string()),
            ("fromAmount", params.from_amount.to_string()),
            ("fromAddress", params.user_address.to_string()),
            ("slippage", params.slippage.normalize().to_string()),
            ("integrator", self.integrator.clone()),
        ]
    }
}

#[async_trait]
impl RouteProvider for LifiClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn quote(&self, params: &RouteParams) -> Result<Quote, ProviderError> {
        let url = format!("{}/quote", self.base_url);
        let mut request = self.client.get(&url).query(&self.quote_query(params));
        if let Some(key) = &self.api_key {
            request = request.header("x-lifi-api-key", key);
        }

        debug!(token = %params.from_symbol, chain_id = params.chain_id, "Requesting LI.FI quote");

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| ProviderError::new(PROVIDER_NAME, ProviderErrorKind::Timeout, "request timed out"))?
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &body));
        }

        parse_quote(&body)
    }
}

// =============================================================================
// Response Parsing
// =============================================================================

/// LI.FI quote response (fields we use).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiQuoteResponse {
    tool: Option<String>,
    estimate: LifiEstimate,
    transaction_request: LifiTransactionRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    approval_address: String,
    to_amount: String,
    #[serde(rename = "toAmountUSD")]
    to_amount_usd: Option<String>,
    #[serde(default)]
    gas_costs: Vec<LifiGasCost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiGasCost {
    #[serde(rename = "amountUSD")]
    amount_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransactionRequest {
    to: String,
    data: String,
    value: Option<String>,
    gas_limit: Option<String>,
}

/// LI.FI error body.
#[derive(Debug, Deserialize)]
struct LifiErrorResponse {
    message: String,
}

/// Gas limit used when the response omits one.
const DEFAULT_SWAP_GAS_LIMIT: u64 = 500_000;

fn decode_error(message: impl Into<String>) -> ProviderError {
    ProviderError::new(PROVIDER_NAME, ProviderErrorKind::Decode, message)
}

fn parse_usd(field: &str, raw: Option<&str>) -> Result<Decimal, ProviderError> {
    match raw {
        None => Ok(Decimal::ZERO),
        Some(s) => s
            .parse::<Decimal>()
            .map_err(|e| decode_error(format!("{} '{}': {}", field, s, e))),
    }
}

/// Parse a successful quote body.
fn parse_quote(body: &str) -> Result<Quote, ProviderError> {
    let response: LifiQuoteResponse =
        serde_json::from_str(body).map_err(|e| decode_error(format!("quote body: {}", e)))?;

    let estimate = response.estimate;
    let tx = response.transaction_request;

    let to_usd = parse_usd("toAmountUSD", estimate.to_amount_usd.as_deref())?;
    let mut gas_cost_usd = Decimal::ZERO;
    for cost in &estimate.gas_costs {
        gas_cost_usd += parse_usd("gasCosts.amountUSD", cost.amount_usd.as_deref())?;
    }

    let value = match tx.value.as_deref() {
        Some(raw) => decode_hex_amount(raw).map_err(|e| decode_error(e.to_string()))?,
        None => 0,
    };
    let gas_limit = match tx.gas_limit.as_deref() {
        Some(raw) => {
            let wide = decode_hex_amount(raw).map_err(|e| decode_error(e.to_string()))?;
            u64::try_from(wide).map_err(|_| decode_error(format!("gas limit {} out of range", raw)))?
        }
        None => DEFAULT_SWAP_GAS_LIMIT,
    };

    let quote = Quote {
        provider: PROVIDER_NAME.to_string(),
        to_amount_raw: estimate.to_amount,
        to_usd,
        gas_cost_usd,
        approve_target: Address::parse(&estimate.approval_address).map_err(|e| decode_error(e.to_string()))?,
        call_target: Address::parse(&tx.to).map_err(|e| decode_error(e.to_string()))?,
        call_data: tx.data,
        value,
        gas_limit,
    };

    debug!(tool = ?response.tool, net_value_usd = %quote.net_value(), "Parsed LI.FI quote");
    Ok(quote)
}

/// Map a non-2xx response onto the provider error taxonomy.
fn classify_failure(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<LifiErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string());

    let mut error = ProviderError::from_status(PROVIDER_NAME, status, message.clone());
    let lowered = message.to_lowercase();
    if (400..500).contains(&status)
        && (lowered.contains("no route") || lowered.contains("no available quotes"))
    {
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const QUOTE_BODY: &str = r#"{
        "id": "7d0b2c0e",
        "type": "lifi",
        "tool": "1inch",
        "estimate": {
            "tool": "1inch",
            "approvalAddress": "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE",
            "toAmountMin": "4975000",
            "toAmount": "5000000",
            "fromAmountUSD": "5.01",
            "toAmountUSD": "4.99",
            "gasCosts": [
                { "type": "SEND", "amount": "100000000000000", "amountUSD": "0.25" },
                { "type": "SEND", "amount": "20000000000000", "amountUSD": "0.05" }
            ]
        },
        "transactionRequest": {
            "to": "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE",
            "data": "0x4630a0d8000000",
            "value": "0x0",
            "gasLimit": "0x3d090",
            "chainId": 1
        }
    }"#;

    fn params() -> RouteParams {
        RouteParams {
            chain_id: 1,
            from_token: Address::parse("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap(),
            from_symbol: "DAI".to_string(),
            from_amount: 5_000_000_000_000_000_000,
            to_token: Address::parse("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap(),
            to_decimals: 6,
            user_address: Address::parse("0x000000000000000000000000000000000000bEEF").unwrap(),
            slippage: dec!(0.005),
        }
    }

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote(QUOTE_BODY).unwrap();

        assert_eq!(quote.provider, "lifi");
        assert_eq!(quote.to_amount_raw, "5000000");
        assert_eq!(quote.to_usd, dec!(4.99));
        assert_eq!(quote.gas_cost_usd, dec!(0.30));
        assert_eq!(quote.net_value(), dec!(4.69));
        assert_eq!(quote.value, 0);
        assert_eq!(quote.gas_limit, 250_000);
        assert_eq!(quote.call_target.as_str(), "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE");
    }

    #[test]
    fn test_parse_quote_rejects_bad_body() {
        let err = parse_quote(r#"{"estimate": {}}"#).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Decode);

        let bad_target = QUOTE_BODY.replace(
            "\"to\": \"0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE\"",
            "\"to\": \"not-an-address\"",
        );
        assert_eq!(parse_quote(&bad_target).unwrap_err().kind, ProviderErrorKind::Decode);
    }

    #[test]
    fn test_classify_failure() {
        let no_quotes = r#"{"message":"No available quotes for the requested transfer","code":1002}"#;
        assert_eq!(classify_failure(400, no_quotes).kind, ProviderErrorKind::NoRoute);
        assert_eq!(classify_failure(404, "").kind, ProviderErrorKind::NoRoute);
        assert_eq!(classify_failure(400, r#"{"message":"Invalid fromToken"}"#).kind, ProviderErrorKind::BadRequest);
        assert_eq!(classify_failure(401, "").kind, ProviderErrorKind::Unauthorized);
        assert_eq!(classify_failure(429, "slow down").kind, ProviderErrorKind::RateLimited);
        assert_eq!(classify_failure(502, "<html>").kind, ProviderErrorKind::Server(502));

        let err = classify_failure(400, r#"{"message":"Invalid fromToken"}"#);
        assert!(err.message.contains("Invalid fromToken"));
    }

    #[test]
    fn test_quote_query() {
        let client = LifiClient::with_base_url("http://localhost:9/v1/", None);
        assert_eq!(client.base_url, "http://localhost:9/v1");

        let query = client.quote_query(&params());
        let get = |key: &str| query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone()).unwrap();

        assert_eq!(get("fromChain"), "1");
        assert_eq!(get("toChain"), "1");
        assert_eq!(get("fromAmount"), "5000000000000000000");
        assert_eq!(get("slippage"), "0.005");
        assert_eq!(get("fromAddress"), "0x000000000000000000000000000000000000bEEF");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is closed on test hosts
        let client = LifiClient::with_base_url("http://127.0.0.1:9/v1", None)
            .with_timeout(Duration::from_secs(2));

        let err = client.quote(&params()).await.unwrap_err();
        assert!(matches!(err.kind, ProviderErrorKind::Network | ProviderErrorKind::Timeout));
    }
}
