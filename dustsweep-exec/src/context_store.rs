//! In-memory execution context store.
//!
//! Contexts live between intent intake and stream start. Expired contexts
//! read as absent and are dropped by [`MemoryContextStore::purge_expired`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use dustsweep_domain::{ExecutionContext, IntentId};

use crate::error::ExecResult;
use crate::ports::ExecutionContextStore;

/// TTL-aware in-memory store.
#[derive(Default)]
pub struct MemoryContextStore {
    contexts: RwLock<HashMap<IntentId, ExecutionContext>>,
}

impl MemoryContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every context expired at `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, ctx| !ctx.is_expired(now));
        let removed = before - contexts.len();
        if removed > 0 {
            debug!(removed, remaining = contexts.len(), "Purged expired contexts");
        }
        removed
    }

    /// Number of stored contexts, expired or not.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}

#[async_trait]
impl ExecutionContextStore for MemoryContextStore {
    async fn put(&self, context: ExecutionContext) -> ExecResult<()> {
        self.contexts.write().await.insert(context.intent_id, context);
        Ok(())
    }

    async fn get(&self, intent_id: IntentId) -> ExecResult<Option<ExecutionContext>> {
        let contexts = self.contexts.read().await;
        Ok(contexts
            .get(&intent_id)
            .filter(|ctx| !ctx.is_expired(Utc::now()))
            .cloned())
    }

    async fn delete(&self, intent_id: IntentId) -> ExecResult<bool> {
        Ok(self.contexts.write().await.remove(&intent_id).is_some())
    }

    async fn take(&self, intent_id: IntentId) -> ExecResult<Option<ExecutionContext>> {
        let mut contexts = self.contexts.write().await;
        Ok(contexts
            .remove(&intent_id)
            .filter(|ctx| !ctx.is_expired(Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dustsweep_domain::{Address, DustToken};
    use rust_decimal_macros::dec;

    fn context(ttl: Duration) -> ExecutionContext {
        let token = DustToken {
            address: Address::parse("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap(),
            symbol: "DAI".to_string(),
            decimals: 18,
            raw_amount_hex: "0xde0b6b3a7640000".to_string(),
            price: dec!(1),
        };
        ExecutionContext::new(
            Address::parse("0x000000000000000000000000000000000000bEEF").unwrap(),
            1,
            vec![token],
            Address::parse("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap(),
            6,
            None,
            None,
            10,
            ttl,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryContextStore::new();
        let ctx = context(Duration::minutes(5));
        let id = ctx.intent_id;

        store.put(ctx.clone()).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(ctx));

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_is_read_once() {
        let store = MemoryContextStore::new();
        let ctx = context(Duration::minutes(5));
        let id = ctx.intent_id;
        store.put(ctx.clone()).await.unwrap();

        assert_eq!(store.take(id).await.unwrap(), Some(ctx));
        assert!(store.take(id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_one_context() {
        let store = std::sync::Arc::new(MemoryContextStore::new());
        let ctx = context(Duration::minutes(5));
        let id = ctx.intent_id;
        store.put(ctx).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.take(id).await.unwrap() })
            })
            .collect();

        let mut taken = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                taken += 1;
            }
        }
        assert_eq!(taken, 1);
    }

    #[tokio::test]
    async fn test_take_drops_expired() {
        let store = MemoryContextStore::new();
        let stale = context(Duration::seconds(-1));
        let id = stale.intent_id;
        store.put(stale).await.unwrap();

        assert!(store.take(id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_reads_as_absent_and_purges() {
        let store = MemoryContextStore::new();
        let live = context(Duration::minutes(5));
        let stale = context(Duration::seconds(-1));
        let stale_id = stale.intent_id;

        store.put(live).await.unwrap();
        store.put(stale).await.unwrap();

        assert!(store.get(stale_id).await.unwrap().is_none());
        assert_eq!(store.len().await, 2);

        assert_eq!(store.purge_expired(Utc::now()).await, 1);
        assert_eq!(store.len().await, 1);
    }
}
