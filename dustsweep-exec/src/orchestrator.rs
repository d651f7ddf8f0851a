//! Batch orchestrator: drives one sweep from context to ledger.
//!
//! # State machine
//!
//! ```text
//! INIT → ESTIMATING → PLANNING_FEES → PROCESSING_TOKENS → FINALIZING → COMPLETED
//!   \________\_____________\_______________\_________________\______→ FAILED
//! ```
//!
//! A run emits one event per token, then exactly one terminal event
//! (`Completed` or `Failed`). Per-token failures are recorded and the run
//! continues; only setup and ledger errors abort it.
//!
//! # Fee splicing
//!
//! Fee transactions are planned up front as ledger positions. Before each
//! token is processed, every pending fee whose position the ledger has
//! reached is appended at the current tail, so streamed transactions are
//! never reordered and an approve is never separated from its swap. Fees
//! still pending after the last token are appended during finalization.
//! The final ledger is the concatenation of every streamed `transactions`
//! list followed by the finalization tail.

use std::fmt;
use std::sync::Arc;

use async_stream::stream;
use futures_util::Stream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use dustsweep_domain::{
    BatchResult, DustToken, ExecutionContext, FailedToken, FeeBreakdown, InsertionMode,
    InsertionStrategy, IntentId, Placement, SwapOutcome, TradingLoss, TransactionDescriptor,
};
use dustsweep_engine::{FeeCalculator, FeeInsertionPlanner, InsertionOptions, TransactionSequenceBuilder};

use crate::aggregator::QuoteAggregator;
use crate::error::{ExecError, ExecResult};
use crate::ports::{PriceOracle, RouteParams, TokenRegistry};

/// Slippage used when the context does not carry one (0.5%).
pub const DEFAULT_SLIPPAGE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

// =============================================================================
// State & Events
// =============================================================================

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    /// Inputs not yet validated
    Init,
    /// Computing the pre-swap notional
    Estimating,
    /// Computing fees and planning their positions
    PlanningFees,
    /// Quoting and building transactions token by token
    ProcessingTokens,
    /// Inserting remaining fees and checking the ledger
    Finalizing,
    /// Finished with a ledger
    Completed,
    /// Aborted
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Init => "INIT",
            BatchState::Estimating => "ESTIMATING",
            BatchState::PlanningFees => "PLANNING_FEES",
            BatchState::ProcessingTokens => "PROCESSING_TOKENS",
            BatchState::Finalizing => "FINALIZING",
            BatchState::Completed => "COMPLETED",
            BatchState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Where the fee transactions ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionSummary {
    /// Planner mode
    pub mode: InsertionMode,
    /// Placement rule the planner used
    pub placement: Placement,
    /// Earliest allowed insertion position
    pub minimum_threshold: usize,
    /// Fee transactions planned
    pub fee_tx_count: usize,
    /// Fees spliced while tokens were being processed
    pub spliced_during_processing: usize,
    /// Fees inserted at finalization
    pub inserted_at_finalization: usize,
}

/// Aggregate figures reported with the final ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Tokens in the run
    pub token_count: usize,
    /// Tokens that produced transactions
    pub success_count: usize,
    /// Tokens that failed
    pub failure_count: usize,
    /// Transactions in the ledger, fees included
    pub transaction_count: usize,
    /// Pre-swap USD value of all tokens
    pub input_value_usd: Decimal,
    /// Sum of successful output values
    pub output_value_usd: Decimal,
    /// Fee legs
    pub fees: FeeBreakdown,
    /// Fee placement
    pub insertion: InsertionSummary,
}

/// Event emitted by a run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A token's transactions are ready
    TokenReady {
        /// Token position in input order
        token_index: usize,
        /// The token
        token: DustToken,
        /// Provider whose route was selected
        provider: String,
        /// Fee transactions spliced before this token, then approve + swap
        transactions: Vec<TransactionDescriptor>,
        /// Loss figures
        trading_loss: TradingLoss,
        /// Fraction of tokens processed, in (0, 1]
        progress: f64,
    },
    /// A token could not be swapped
    TokenFailed {
        /// Token position in input order
        token_index: usize,
        /// The token
        token: DustToken,
        /// Failure description
        error: String,
        /// Fee transactions spliced before this token
        transactions: Vec<TransactionDescriptor>,
        /// Fraction of tokens processed, in (0, 1]
        progress: f64,
    },
    /// Terminal: the run finished
    Completed {
        /// Final ledger
        result: BatchResult,
        /// Aggregates
        summary: BatchSummary,
    },
    /// Terminal: the run aborted
    Failed {
        /// Failure description
        error: String,
        /// State the run was in when it aborted
        state: BatchState,
    },
}

impl BatchEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchEvent::Completed { .. } | BatchEvent::Failed { .. })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Static configuration of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Recipient of the protocol fee leg
    pub treasury_address: dustsweep_domain::Address,
    /// Fee placement tuning
    pub insertion: InsertionOptions,
}

/// Runs sweeps.
///
/// Generic over the price oracle and token registry so tests can use stubs;
/// trait objects are accepted too.
pub struct BatchOrchestrator<O: PriceOracle + ?Sized, R: TokenRegistry + ?Sized> {
    aggregator: Arc<QuoteAggregator>,
    oracle: Arc<O>,
    registry: Arc<R>,
    fees: FeeCalculator,
    planner: FeeInsertionPlanner,
    config: OrchestratorConfig,
}

impl<O: PriceOracle + ?Sized + 'static, R: TokenRegistry + ?Sized + 'static> BatchOrchestrator<O, R> {
    /// Create a new orchestrator.
    pub fn new(
        aggregator: Arc<QuoteAggregator>,
        oracle: Arc<O>,
        registry: Arc<R>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            aggregator,
            oracle,
            registry,
            fees: FeeCalculator::new(),
            planner: FeeInsertionPlanner::new(),
            config,
        }
    }

    /// Number of route providers quoted per token.
    pub fn provider_count(&self) -> usize {
        self.aggregator.provider_count()
    }

    /// Run a sweep, yielding progress events and one terminal event.
    ///
    /// The stream is lazy: nothing happens until it is polled. Dropping it
    /// abandons the run.
    pub fn execute(self: Arc<Self>, context: ExecutionContext) -> impl Stream<Item = BatchEvent> + Send + 'static {
        stream! {
            let intent_id = context.intent_id;
            let tokens: Vec<DustToken> = context.tokens().cloned().collect();
            let token_count = tokens.len();
            let mut run = SweepRun::new(intent_id);

            info!(%intent_id, chain_id = context.chain_id, token_count, "Sweep started");

            if let Err(e) = self.prepare(&context, &tokens, &mut run).await {
                yield run.abort(e);
                return;
            }

            run.transition(BatchState::ProcessingTokens);

            for (index, token) in tokens.iter().enumerate() {
                let spliced = match run.splice_reached_fees() {
                    Ok(spliced) => spliced,
                    Err(e) => {
                        yield run.abort(e);
                        return;
                    }
                };
                let progress = (index + 1) as f64 / token_count as f64;

                match self.process_token(&context, index, token).await {
                    Ok(outcome) => {
                        debug!(%intent_id, index, symbol = %token.symbol, "Token ready");
                        let provider = outcome.quote.provider.clone();
                        let trading_loss = outcome.trading_loss.clone();
                        let mut transactions = spliced;
                        transactions.extend(outcome.transactions.iter().cloned());
                        run.ledger.record_success(outcome);

                        yield BatchEvent::TokenReady {
                            token_index: index,
                            token: token.clone(),
                            provider,
                            transactions,
                            trading_loss,
                            progress,
                        };
                    }
                    Err(e) => {
                        warn!(%intent_id, index, symbol = %token.symbol, error = %e, "Token failed");
                        run.ledger.record_failure(FailedToken {
                            token_index: index,
                            token: token.clone(),
                            error: e.to_string(),
                        });

                        yield BatchEvent::TokenFailed {
                            token_index: index,
                            token: token.clone(),
                            error: e.to_string(),
                            transactions: spliced,
                            progress,
                        };
                    }
                }
            }

            match run.finalize(token_count) {
                Ok(summary) => {
                    info!(
                        %intent_id,
                        succeeded = summary.success_count,
                        failed = summary.failure_count,
                        transactions = summary.transaction_count,
                        "Sweep completed"
                    );
                    let result = std::mem::take(&mut run.ledger);
                    yield BatchEvent::Completed { result, summary };
                }
                Err(e) => {
                    yield run.abort(e);
                }
            }
        }
    }

    /// INIT → ESTIMATING → PLANNING_FEES.
    async fn prepare(
        &self,
        context: &ExecutionContext,
        tokens: &[DustToken],
        run: &mut SweepRun,
    ) -> ExecResult<()> {
        if tokens.is_empty() {
            return Err(ExecError::InvalidInput("no dust tokens to sweep".to_string()));
        }
        for token in tokens {
            token.validate()?;
        }

        run.transition(BatchState::Estimating);
        let mut input_value_usd = Decimal::ZERO;
        for token in tokens {
            input_value_usd = input_value_usd
                .checked_add(token.value_usd()?)
                .ok_or_else(|| ExecError::InvalidInput("total value overflows".to_string()))?;
        }
        run.input_value_usd = input_value_usd;

        run.transition(BatchState::PlanningFees);
        let chain_id = context.chain_id;
        let native_symbol = self
            .registry
            .native_symbol(chain_id)
            .ok_or(ExecError::UnsupportedChain(chain_id))?;
        let wrapped_native = self.registry.get_wrapped_native_address(chain_id);
        let native_price = self.oracle.get_price(&native_symbol).await?;

        let fees = self.fees.compute_fees(
            input_value_usd,
            native_price.as_decimal(),
            context.referral_address.as_ref(),
        )?;
        let fee_transactions = self.fees.build_fee_transactions(
            &fees,
            chain_id,
            &self.config.treasury_address,
            wrapped_native.as_ref(),
        )?;

        let total_tx_count = tokens.len() * 2;
        let strategy = self.planner.plan(
            &context.batches,
            fees.total_fee_native,
            total_tx_count,
            fee_transactions.len(),
            &self.config.insertion,
        )?;
        if !self.planner.validate(&strategy, total_tx_count) {
            return Err(ExecError::InvalidState(format!(
                "planner produced invalid insertion points {:?}",
                strategy.insertion_points
            )));
        }

        info!(
            intent_id = %run.intent_id,
            input_value_usd = %input_value_usd,
            total_fee_wei = fees.total_fee_wei,
            fee_txs = fee_transactions.len(),
            mode = %strategy.mode,
            "Fees planned"
        );

        run.fees = Some(fees);
        run.fee_transactions = fee_transactions;
        run.strategy = Some(strategy);
        Ok(())
    }

    /// Quote one token and build its approve + swap pair.
    async fn process_token(
        &self,
        context: &ExecutionContext,
        index: usize,
        token: &DustToken,
    ) -> ExecResult<SwapOutcome> {
        let params = RouteParams {
            chain_id: context.chain_id,
            from_token: token.address.clone(),
            from_symbol: token.symbol.clone(),
            from_amount: token.raw_amount()?,
            to_token: context.to_token_address.clone(),
            to_decimals: context.to_token_decimals,
            user_address: context.user_address.clone(),
            slippage: context.slippage.unwrap_or(DEFAULT_SLIPPAGE),
        };

        let quote = self.aggregator.get_route(&params).await?;

        let mut builder = TransactionSequenceBuilder::new();
        builder.add_approve(&token.address, &quote.approve_target, params.from_amount, &token.symbol)?;
        builder.add_swap(&quote, &token.symbol)?;

        let trading_loss = TradingLoss::compute(token.value_usd()?, quote.net_value());

        Ok(SwapOutcome {
            token_index: index,
            token: token.clone(),
            quote,
            transactions: builder.build(),
            trading_loss,
        })
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Mutable state of a single run.
struct SweepRun {
    intent_id: IntentId,
    state: BatchState,
    input_value_usd: Decimal,
    fees: Option<FeeBreakdown>,
    fee_transactions: Vec<TransactionDescriptor>,
    strategy: Option<InsertionStrategy>,
    /// Index of the next fee transaction to place
    fee_cursor: usize,
    spliced_during_processing: usize,
    inserted_at_finalization: usize,
    ledger: BatchResult,
}

impl SweepRun {
    fn new(intent_id: IntentId) -> Self {
        Self {
            intent_id,
            state: BatchState::Init,
            input_value_usd: Decimal::ZERO,
            fees: None,
            fee_transactions: Vec::new(),
            strategy: None,
            fee_cursor: 0,
            spliced_during_processing: 0,
            inserted_at_finalization: 0,
            ledger: BatchResult::new(),
        }
    }

    fn transition(&mut self, next: BatchState) {
        debug!(intent_id = %self.intent_id, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Move to FAILED and build the terminal event.
    fn abort(&mut self, e: ExecError) -> BatchEvent {
        let state = self.state;
        error!(intent_id = %self.intent_id, %state, error = %e, "Sweep failed");
        self.transition(BatchState::Failed);
        BatchEvent::Failed {
            error: e.to_string(),
            state,
        }
    }

    fn planned_points(&self) -> &[usize] {
        self.strategy
            .as_ref()
            .map(|s| s.insertion_points.as_slice())
            .unwrap_or(&[])
    }

    /// Append every pending fee whose planned position the ledger has reached.
    ///
    /// Fees go at the tail: transactions already streamed keep their
    /// positions.
    fn splice_reached_fees(&mut self) -> ExecResult<Vec<TransactionDescriptor>> {
        let mut spliced = Vec::new();

        while let Some(&point) = self.planned_points().get(self.fee_cursor) {
            let tail = self.ledger.transactions.len();
            if point > tail {
                break;
            }

            let fee = self
                .fee_transactions
                .get(self.fee_cursor)
                .cloned()
                .ok_or_else(|| ExecError::InvalidState("more insertion points than fee transactions".to_string()))?;
            TransactionSequenceBuilder::insert_at(&mut self.ledger.transactions, vec![fee.clone()], &[tail])?;

            debug!(intent_id = %self.intent_id, point, at = tail, description = %fee.description, "Fee spliced");
            spliced.push(fee);
            self.fee_cursor += 1;
            self.spliced_during_processing += 1;
        }

        Ok(spliced)
    }

    /// FINALIZING → COMPLETED: place remaining fees and check the ledger.
    fn finalize(&mut self, token_count: usize) -> ExecResult<BatchSummary> {
        self.transition(BatchState::Finalizing);

        let tail = self.ledger.transactions.len();
        let remaining: Vec<TransactionDescriptor> = self.fee_transactions.iter().skip(self.fee_cursor).cloned().collect();
        let indices = vec![tail; remaining.len()];

        self.inserted_at_finalization = remaining.len();
        TransactionSequenceBuilder::insert_at(&mut self.ledger.transactions, remaining, &indices)?;
        self.fee_cursor = self.fee_transactions.len();

        let swap_txs: usize = self.ledger.successful.iter().map(|s| s.transactions.len()).sum();
        let expected = swap_txs + self.fee_transactions.len();
        if self.ledger.transactions.len() != expected {
            return Err(ExecError::InvalidState(format!(
                "ledger holds {} transactions, expected {}",
                self.ledger.transactions.len(),
                expected
            )));
        }

        let fees = self
            .fees
            .clone()
            .ok_or_else(|| ExecError::InvalidState("finalizing without fees".to_string()))?;
        let strategy = self
            .strategy
            .as_ref()
            .ok_or_else(|| ExecError::InvalidState("finalizing without a fee plan".to_string()))?;

        let summary = BatchSummary {
            token_count,
            success_count: self.ledger.successful.len(),
            failure_count: self.ledger.failed.len(),
            transaction_count: self.ledger.transactions.len(),
            input_value_usd: self.input_value_usd,
            output_value_usd: self.ledger.total_value_usd,
            fees,
            insertion: InsertionSummary {
                mode: strategy.mode,
                placement: strategy.metadata.placement,
                minimum_threshold: strategy.minimum_threshold,
                fee_tx_count: self.fee_transactions.len(),
                spliced_during_processing: self.spliced_during_processing,
                inserted_at_finalization: self.inserted_at_finalization,
            },
        };

        self.transition(BatchState::Completed);
        Ok(summary)
    }
}

// =============================================================================
// Tests
// =============================================================================
