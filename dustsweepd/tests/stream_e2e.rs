//! E2E tests: a sweep streamed from intake to terminal message.
//!
//! Flow:
//! 1. Build an execution context for three dust tokens
//! 2. Run the orchestrator through the streaming adapter
//! 3. Verify: per-token messages in order, one terminal message, fees once
//! 4. Same flow over HTTP: POST /intents then GET /intents/:id/stream (SSE)

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use dustsweep_domain::{Address, DustToken, ExecutionContext, TransactionDescriptor};
use dustsweep_engine::InsertionOptions;
use dustsweep_exec::{
    BatchOrchestrator, MemoryContextStore, OrchestratorConfig, PriceOracle, ProviderErrorKind,
    QuoteAggregator, RetryPolicy, RouteProvider, StaticTokenRegistry, StubPriceOracle,
    StubRouteProvider,
};
use dustsweepd::{create_router, ApiState, StreamMessage, StreamingProtocolAdapter, SweepConfig, SweepOrchestrator};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const TOKENS: [&str; 3] = [
    "0x6B175474E89094C44Da98b954EedeAC495271d0F",
    "0xdAC17F958D2ee523a2206206994597C13D831ec7",
    "0x514910771AF9Ca656af840dff83E8264EcF986CA",
];
const USER: &str = "0x000000000000000000000000000000000000bEEF";
const REFERRER: &str = "0x00000000000000000000000000000000000Cafe0";
const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

// =============================================================================
// Helpers
// =============================================================================

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

/// 100 whole tokens at $1.
fn dust(address: &str, symbol: &str) -> DustToken {
    DustToken {
        address: addr(address),
        symbol: symbol.to_string(),
        decimals: 18,
        raw_amount_hex: format!("0x{:x}", 100u128 * 10u128.pow(18)),
        price: dec!(1),
    }
}

/// Two providers; the second token has no route on either.
fn providers() -> Vec<Arc<dyn RouteProvider>> {
    let alpha = Arc::new(StubRouteProvider::new("alpha", dec!(99.5), dec!(0.5)));
    let beta = Arc::new(StubRouteProvider::new("beta", dec!(97.5), dec!(0.5)));
    alpha.fail_token(&addr(TOKENS[1]), ProviderErrorKind::NoRoute);
    beta.fail_token(&addr(TOKENS[1]), ProviderErrorKind::NoRoute);

    vec![alpha as Arc<dyn RouteProvider>, beta as Arc<dyn RouteProvider>]
}

fn orchestrator() -> Arc<SweepOrchestrator> {
    let policy = RetryPolicy {
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(2),
        ..RetryPolicy::default()
    };
    let oracle: Arc<dyn PriceOracle> = Arc::new(StubPriceOracle::with_defaults());

    Arc::new(BatchOrchestrator::new(
        Arc::new(QuoteAggregator::new(providers(), policy)),
        oracle,
        Arc::new(StaticTokenRegistry::with_defaults()),
        OrchestratorConfig {
            treasury_address: SweepConfig::default().treasury_address,
            insertion: InsertionOptions::default(),
        },
    ))
}

fn is_fee(tx: &TransactionDescriptor) -> bool {
    matches!(
        tx.description.as_str(),
        "Wrap native fee" | "Referrer fee" | "Protocol fee"
    )
}

// =============================================================================
// Test: Partial failure through the streaming adapter
// =============================================================================

#[tokio::test]
async fn test_partial_failure_streams_fees_exactly_once() {
    let context = ExecutionContext::new(
        addr(USER),
        1,
        vec![dust(TOKENS[0], "DAI"), dust(TOKENS[1], "USDT"), dust(TOKENS[2], "LINK")],
        addr(USDC),
        6,
        Some(addr(REFERRER)),
        None,
        2,
        ChronoDuration::minutes(5),
    )
    .unwrap();
    let intent_id = context.intent_id;

    let events = orchestrator().execute(context);
    let mut rx = StreamingProtocolAdapter::new().open(intent_id, 3, events);

    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }

    let kinds: Vec<&str> = messages.iter().map(StreamMessage::kind).collect();
    assert_eq!(
        kinds,
        vec!["connected", "token_ready", "token_failed", "token_ready", "complete"]
    );

    // Progress strictly increases, one message per token
    let progress: Vec<f64> = messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::TokenReady { progress, .. } | StreamMessage::TokenFailed { progress, .. } => {
                Some(*progress)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress[2], 1.0);

    // Second-ranked route is selected
    match &messages[1] {
        StreamMessage::TokenReady { provider, .. } => assert_eq!(provider, "beta"),
        other => panic!("expected token_ready, got {:?}", other),
    }

    let (result, summary) = match messages.last() {
        Some(StreamMessage::Complete { result, summary, .. }) => (result, summary),
        other => panic!("expected complete, got {:?}", other),
    };

    assert_eq!(result.successful.len(), 2);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].token_index, 1);
    assert!(result.failed[0].error.contains("No quotes available"));

    // wrap + referrer + treasury, each exactly once
    let fees: Vec<&str> = result
        .transactions
        .iter()
        .filter(|tx| is_fee(tx))
        .map(|tx| tx.description.as_str())
        .collect();
    assert_eq!(fees, vec!["Wrap native fee", "Referrer fee", "Protocol fee"]);
    assert_eq!(result.transactions.len(), 2 * 2 + 3);
    assert_eq!(summary.transaction_count, result.transactions.len());
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);

    // Fees streamed per token plus fees inserted at finalization add up
    let streamed_fees: usize = messages
        .iter()
        .map(|m| match m {
            StreamMessage::TokenReady { transactions, .. } | StreamMessage::TokenFailed { transactions, .. } => {
                transactions.iter().filter(|tx| is_fee(tx)).count()
            }
            _ => 0,
        })
        .sum();
    assert_eq!(
        streamed_fees + summary.insertion.inserted_at_finalization,
        summary.insertion.fee_tx_count
    );

    // Signing the streamed transactions in order replays the ledger
    let streamed: Vec<&TransactionDescriptor> = messages
        .iter()
        .flat_map(|m| match m {
            StreamMessage::TokenReady { transactions, .. } | StreamMessage::TokenFailed { transactions, .. } => {
                transactions.iter().collect::<Vec<_>>()
            }
            _ => Vec::new(),
        })
        .collect();
    let ledger: Vec<&TransactionDescriptor> = result.transactions.iter().collect();
    assert_eq!(ledger[..streamed.len()], streamed[..]);
    assert!(ledger[streamed.len()..].iter().all(|tx| is_fee(tx)));
}

// =============================================================================
// Test: SSE over HTTP
// =============================================================================

async fn spawn_server() -> std::net::SocketAddr {
    let registry = Arc::new(StaticTokenRegistry::with_defaults());
    let state = Arc::new(ApiState {
        orchestrator: orchestrator(),
        contexts: Arc::new(MemoryContextStore::new()),
        registry,
        adapter: StreamingProtocolAdapter::new(),
        sweep: SweepConfig::default(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    addr
}

/// Parse an SSE body into (event, data) pairs.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = serde_json::from_str(rest.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

#[tokio::test]
async fn test_sse_stream_end_to_end() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let intake = json!({
        "userAddress": USER,
        "chainId": 1,
        "params": {
            "dustTokens": TOKENS.iter().zip(["DAI", "USDT", "LINK"]).map(|(address, symbol)| json!({
                "address": address,
                "symbol": symbol,
                "decimals": 18,
                "rawAmountHex": format!("0x{:x}", 100u128 * 10u128.pow(18)),
                "price": "1"
            })).collect::<Vec<_>>(),
            "toTokenAddress": USDC,
            "toTokenDecimals": 6,
            "slippage": "0.01"
        }
    });

    let response = client
        .post(format!("http://{}/intents", addr))
        .json(&intake)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["tokenCount"], 3);
    let intent_id = created["intentId"].as_str().unwrap().to_string();

    let stream_url = format!("http://{}/intents/{}/stream", addr, intent_id);
    let response = client.get(&stream_url).send().await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let body = response.text().await.unwrap();
    let events = parse_sse(&body);
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["connected", "token_ready", "token_failed", "token_ready", "complete"]
    );

    for (name, data) in &events {
        assert_eq!(data["type"], name.as_str());
        assert!(data["timestamp"].is_string());
    }

    let (_, connected) = &events[0];
    assert_eq!(connected["intentId"], intent_id.as_str());
    assert_eq!(connected["tokenCount"], 3);

    let (_, complete) = &events[4];
    assert_eq!(complete["summary"]["successCount"], 2);
    assert_eq!(complete["summary"]["failureCount"], 1);
    // No referral: wrap + treasury transfer
    assert_eq!(complete["summary"]["insertion"]["feeTxCount"], 2);

    // Context is read once
    let response = client.get(&stream_url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
