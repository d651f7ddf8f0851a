//! Streaming protocol adapter.
//!
//! Turns the orchestrator's event stream into the push-channel protocol:
//!
//! ```text
//! connected → (token_ready | token_failed)* → (complete | error)
//! ```
//!
//! Exactly one terminal message is delivered per run, even when the
//! producer panics or its stream ends early. A consumer that goes away is
//! not an error: the producer stops at its next send.

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error};

use dustsweep_domain::{BatchResult, DustToken, IntentId, TradingLoss, TransactionDescriptor};
use dustsweep_exec::{BatchEvent, BatchState, BatchSummary};

/// Channel capacity between the producer task and the consumer.
const DEFAULT_BUFFER: usize = 32;

// =============================================================================
// Messages
// =============================================================================

/// One message on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Sent once when the channel opens
    #[serde(rename_all = "camelCase")]
    Connected {
        intent_id: IntentId,
        token_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A token's transactions are ready
    #[serde(rename_all = "camelCase")]
    TokenReady {
        token_index: usize,
        token: DustToken,
        provider: String,
        transactions: Vec<TransactionDescriptor>,
        trading_loss: TradingLoss,
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// A token could not be swapped
    #[serde(rename_all = "camelCase")]
    TokenFailed {
        token_index: usize,
        token: DustToken,
        error: String,
        transactions: Vec<TransactionDescriptor>,
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// Terminal: full ledger and summary
    #[serde(rename_all = "camelCase")]
    Complete {
        result: BatchResult,
        summary: BatchSummary,
        timestamp: DateTime<Utc>,
    },

    /// Terminal: the run aborted
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<BatchState>,
        timestamp: DateTime<Utc>,
    },
}

impl StreamMessage {
    /// Wire name of the message, also used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Connected { .. } => "connected",
            StreamMessage::TokenReady { .. } => "token_ready",
            StreamMessage::TokenFailed { .. } => "token_failed",
            StreamMessage::Complete { .. } => "complete",
            StreamMessage::Error { .. } => "error",
        }
    }

    /// Whether this message closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Complete { .. } | StreamMessage::Error { .. })
    }

    /// An `error` message raised outside the orchestrator.
    pub fn error(error: impl Into<String>) -> Self {
        StreamMessage::Error {
            error: error.into(),
            state: None,
            timestamp: Utc::now(),
        }
    }

    fn from_event(event: BatchEvent, timestamp: DateTime<Utc>) -> Self {
        match event {
            BatchEvent::TokenReady {
                token_index,
                token,
                provider,
                transactions,
                trading_loss,
                progress,
            } => StreamMessage::TokenReady {
                token_index,
                token,
                provider,
                transactions,
                trading_loss,
                progress,
                timestamp,
            },
            BatchEvent::TokenFailed {
                token_index,
                token,
                error,
                transactions,
                progress,
            } => StreamMessage::TokenFailed {
                token_index,
                token,
                error,
                transactions,
                progress,
                timestamp,
            },
            BatchEvent::Completed { result, summary } => StreamMessage::Complete {
                result,
                summary,
                timestamp,
            },
            BatchEvent::Failed { error, state } => StreamMessage::Error {
                error,
                state: Some(state),
                timestamp,
            },
        }
    }
}

impl From<BatchEvent> for StreamMessage {
    fn from(event: BatchEvent) -> Self {
        Self::from_event(event, Utc::now())
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// How the producer task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// A terminal message was delivered
    Terminated,
    /// The source ended without a terminal event
    Exhausted,
    /// The consumer went away
    Disconnected,
}

/// Bridges an orchestrator event stream onto an mpsc channel.
#[derive(Debug, Clone)]
pub struct StreamingProtocolAdapter {
    buffer: usize,
}

impl StreamingProtocolAdapter {
    /// Create an adapter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Create an adapter with a custom channel capacity (minimum 1).
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    /// Open a channel for one run.
    ///
    /// Spawns a producer task that sends `connected`, then forwards
    /// `events` until a terminal event. A supervisor task awaits the
    /// producer and sends an `error` message if it panicked or ended
    /// without a terminal event. Must be called within a Tokio runtime.
    pub fn open<S>(&self, intent_id: IntentId, token_count: usize, events: S) -> mpsc::Receiver<StreamMessage>
    where
        S: Stream<Item = BatchEvent> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let producer_tx = tx.clone();

        let producer = tokio::spawn(async move {
            let connected = StreamMessage::Connected {
                intent_id,
                token_count,
                timestamp: Utc::now(),
            };
            if producer_tx.send(connected).await.is_err() {
                return Delivery::Disconnected;
            }

            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                let terminal = event.is_terminal();
                if producer_tx.send(StreamMessage::from(event)).await.is_err() {
                    return Delivery::Disconnected;
                }
                if terminal {
                    return Delivery::Terminated;
                }
            }
            Delivery::Exhausted
        });

        tokio::spawn(async move {
            if let Some(message) = fallback_error(intent_id, producer.await) {
                // Consumer may already be gone
                let _ = tx.send(StreamMessage::error(message)).await;
            }
        });

        rx
    }
}

/// Error message owed to the consumer for how the producer stopped, if any.
fn fallback_error(intent_id: IntentId, outcome: Result<Delivery, JoinError>) -> Option<&'static str> {
    match outcome {
        Ok(Delivery::Terminated) => None,
        Ok(Delivery::Disconnected) => {
            debug!(%intent_id, "Stream consumer disconnected");
            None
        }
        Ok(Delivery::Exhausted) => {
            error!(%intent_id, "Sweep ended without a terminal event");
            Some("Sweep ended unexpectedly")
        }
        Err(e) if e.is_panic() => {
            error!(%intent_id, "Sweep producer panicked");
            Some("Internal error while processing sweep")
        }
        Err(e) => {
            error!(%intent_id, error = %e, "Sweep producer cancelled");
            Some("Sweep was cancelled")
        }
    }
}

impl Default for StreamingProtocolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dustsweep_domain::Address;
    use futures_util::stream;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Poll;
    use uuid::Uuid;

    fn token() -> DustToken {
        DustToken {
            address: Address::parse("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap(),
            symbol: "DAI".to_string(),
            decimals: 18,
            raw_amount_hex: "0x0de0b6b3a7640000".to_string(),
            price: dec!(1),
        }
    }

    fn failed(index: usize, progress: f64) -> BatchEvent {
        BatchEvent::TokenFailed {
            token_index: index,
            token: token(),
            error: "No quotes available".to_string(),
            transactions: vec![],
            progress,
        }
    }

    fn aborted() -> BatchEvent {
        BatchEvent::Failed {
            error: "Unsupported chain: 56".to_string(),
            state: BatchState::PlanningFees,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamMessage>) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        messages
    }

    fn kinds(messages: &[StreamMessage]) -> Vec<&'static str> {
        messages.iter().map(StreamMessage::kind).collect()
    }

    #[tokio::test]
    async fn test_lifecycle_ends_with_one_terminal() {
        let events = stream::iter(vec![failed(0, 0.5), failed(1, 1.0), aborted()]);
        let rx = StreamingProtocolAdapter::new().open(Uuid::now_v7(), 2, events);

        let messages = drain(rx).await;

        assert_eq!(kinds(&messages), vec!["connected", "token_failed", "token_failed", "error"]);
        assert_eq!(messages.iter().filter(|m| m.is_terminal()).count(), 1);
        match &messages[0] {
            StreamMessage::Connected { token_count, .. } => assert_eq!(*token_count, 2),
            other => panic!("expected connected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_after_terminal_are_not_forwarded() {
        let events = stream::iter(vec![aborted(), failed(0, 1.0)]);
        let rx = StreamingProtocolAdapter::new().open(Uuid::now_v7(), 1, events);

        let messages = drain(rx).await;

        assert_eq!(kinds(&messages), vec!["connected", "error"]);
    }

    #[tokio::test]
    async fn test_panicking_producer_still_sends_error() {
        let events = stream::iter(vec![failed(0, 0.5)]).chain(stream::poll_fn(
            |_| -> Poll<Option<BatchEvent>> { panic!("route table corrupted") },
        ));
        let rx = StreamingProtocolAdapter::new().open(Uuid::now_v7(), 2, events);

        let messages = drain(rx).await;

        assert_eq!(kinds(&messages), vec!["connected", "token_failed", "error"]);
        match messages.last() {
            Some(StreamMessage::Error { state, .. }) => assert!(state.is_none()),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_stream_gets_error() {
        let events = stream::iter(vec![failed(0, 1.0)]);
        let rx = StreamingProtocolAdapter::new().open(Uuid::now_v7(), 1, events);

        let messages = drain(rx).await;

        assert_eq!(kinds(&messages), vec!["connected", "token_failed", "error"]);
    }

    #[tokio::test]
    async fn test_consumer_disconnect_stops_producer() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let events = stream::iter(0..100).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            failed(i, (i + 1) as f64 / 100.0)
        });
        let mut rx = StreamingProtocolAdapter::with_buffer(1).open(Uuid::now_v7(), 100, events);

        assert_eq!(rx.recv().await.map(|m| m.kind()), Some("connected"));
        drop(rx);

        // The producer notices at its next send and stops pulling events
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stopped_at = pulled.load(Ordering::SeqCst);
        assert!(stopped_at < 100, "source drained after disconnect: {stopped_at}");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn test_disconnect_owes_no_error() {
        let id = Uuid::now_v7();

        assert_eq!(fallback_error(id, Ok(Delivery::Disconnected)), None);
        assert_eq!(fallback_error(id, Ok(Delivery::Terminated)), None);
        assert_eq!(fallback_error(id, Ok(Delivery::Exhausted)), Some("Sweep ended unexpectedly"));
    }

    #[tokio::test]
    async fn test_cancelled_producer_owes_error() {
        let handle = tokio::spawn(std::future::pending::<Delivery>());
        handle.abort();

        let outcome = handle.await;
        assert_eq!(fallback_error(Uuid::now_v7(), outcome), Some("Sweep was cancelled"));
    }

    #[test]
    fn test_message_json_shape() {
        let message = StreamMessage::from(failed(2, 0.75));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "token_failed");
        assert_eq!(json["tokenIndex"], 2);
        assert_eq!(json["progress"], 0.75);
        assert_eq!(json["token"]["symbol"], "DAI");
        assert!(json["timestamp"].is_string());

        let json = serde_json::to_value(StreamMessage::from(aborted())).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["state"], "PLANNING_FEES");

        let json = serde_json::to_value(StreamMessage::error("boom")).unwrap();
        assert!(json.get("state").is_none());
    }
}
