//! Quote aggregation across route providers.
//!
//! All providers are queried concurrently, each under its own retry policy.
//! Successful quotes are ranked by net value (`to_usd - gas_cost_usd`,
//! descending, ties in provider order).
//!
//! # Selection rule
//!
//! With two or more successful quotes the second-ranked one is selected;
//! with exactly one, that one. The top quote is often an outlier that fails
//! on-chain, so the runner-up is the conservative pick.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use dustsweep_domain::Quote;

use crate::error::{ExecError, ExecResult, ProviderError};
use crate::ports::{RouteParams, RouteProvider};
use crate::retry::RetryPolicy;

/// Outcome of one aggregation round.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSelection {
    /// The quote to execute
    pub selected: Quote,
    /// Every successful quote, best first
    pub ranked: Vec<Quote>,
    /// Final error of every provider that failed
    pub failures: Vec<ProviderError>,
}

/// Fans a route request out to every provider and picks one quote.
pub struct QuoteAggregator {
    providers: Vec<Arc<dyn RouteProvider>>,
    policies: HashMap<String, RetryPolicy>,
    default_policy: RetryPolicy,
}

impl QuoteAggregator {
    /// Create an aggregator using `default_policy` for every provider.
    pub fn new(providers: Vec<Arc<dyn RouteProvider>>, default_policy: RetryPolicy) -> Self {
        Self {
            providers,
            policies: HashMap::new(),
            default_policy,
        }
    }

    /// Override the policy for the provider named `name`.
    pub fn with_policy(mut self, name: impl Into<String>, policy: RetryPolicy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    /// Number of configured providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Policy applied to `provider`.
    pub fn policy_for(&self, provider: &str) -> &RetryPolicy {
        self.policies.get(provider).unwrap_or(&self.default_policy)
    }

    /// Query every provider and rank the results.
    ///
    /// # Errors
    ///
    /// `NoQuotesAvailable` carrying each provider's final error when no
    /// provider returned a quote (including when none are configured).
    pub async fn get_route_selection(&self, params: &RouteParams) -> ExecResult<RouteSelection> {
        let calls = self.providers.iter().map(|provider| {
            let policy = self.policy_for(provider.name());
            async move {
                policy
                    .run(provider.name(), || provider.quote(params))
                    .await
            }
        });

        let mut quotes = Vec::new();
        let mut failures = Vec::new();
        for result in join_all(calls).await {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(error) => {
                    debug!(provider = %error.provider, kind = %error.kind, "Provider returned no quote");
                    failures.push(error);
                }
            }
        }

        let ranked = rank_quotes(quotes);
        let selected = match select_quote(&ranked) {
            Some(quote) => quote.clone(),
            None => {
                warn!(
                    token = %params.from_symbol,
                    failures = failures.len(),
                    "No provider returned a quote"
                );
                return Err(ExecError::NoQuotesAvailable {
                    token: params.from_symbol.clone(),
                    failures,
                });
            }
        };

        info!(
            token = %params.from_symbol,
            provider = %selected.provider,
            net_value_usd = %selected.net_value(),
            quotes = ranked.len(),
            failures = failures.len(),
            "Route selected"
        );

        Ok(RouteSelection {
            selected,
            ranked,
            failures,
        })
    }

    /// Query every provider and return the selected quote.
    pub async fn get_route(&self, params: &RouteParams) -> ExecResult<Quote> {
        Ok(self.get_route_selection(params).await?.selected)
    }
}

/// Sort quotes by net value, best first. Stable, so ties keep input order.
pub fn rank_quotes(mut quotes: Vec<Quote>) -> Vec<Quote> {
    quotes.sort_by(|a, b| b.net_value().cmp(&a.net_value()));
    quotes
}

/// Second-ranked quote when there are two or more, else the only one.
pub fn select_quote(ranked: &[Quote]) -> Option<&Quote> {
    ranked.get(1).or_else(|| ranked.first())
}

// =============================================================================
// Tests
// =============================================================================
