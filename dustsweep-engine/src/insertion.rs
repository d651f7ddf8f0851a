//! Fee insertion planning.
//!
//! Fee transactions are spliced into the sweep sequence at unpredictable
//! positions so an observer cannot filter them out by position. Points are
//! drawn from the OS CSPRNG inside a window that starts at a minimum-safe
//! offset:
//!
//! ```text
//! threshold = max(ceil(total * (threshold_pct + safety_buffer)),
//!                 ceil(token_count * token_ratio))
//! window    = [threshold, total)
//! ```
//!
//! | Condition                  | Mode       | Placement           |
//! |----------------------------|------------|---------------------|
//! | `threshold >= total`       | `Fallback` | `Deterministic`     |
//! | `window < fee count`       | `Fallback` | `SequentialJitter`  |
//! | otherwise                  | `Random`   | `Uniform`           |
//!
//! `OsRng` is the only random source used here; never swap it for a seeded
//! generator.

use dustsweep_domain::{DustToken, InsertionMetadata, InsertionMode, InsertionStrategy, Placement};
use rand::rngs::OsRng;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Tunables for the minimum-safe offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionOptions {
    /// Fraction of the sequence that must precede any fee (0.40)
    pub minimum_threshold_pct: Decimal,
    /// Extra fraction added on top of the threshold (0.10)
    pub safety_buffer: Decimal,
    /// Lower bound on the threshold as a fraction of the token count (0.20)
    pub min_token_ratio: Decimal,
}

impl Default for InsertionOptions {
    fn default() -> Self {
        Self {
            minimum_threshold_pct: dec!(0.40),
            safety_buffer: dec!(0.10),
            min_token_ratio: dec!(0.20),
        }
    }
}

impl InsertionOptions {
    fn validate(&self) -> EngineResult<()> {
        let fractions = [
            ("minimum_threshold_pct", self.minimum_threshold_pct),
            ("safety_buffer", self.safety_buffer),
            ("min_token_ratio", self.min_token_ratio),
        ];
        for (name, value) in fractions {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::InvalidInput(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Plans where fee transactions go.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeInsertionPlanner;

impl FeeInsertionPlanner {
    /// Create a planner.
    pub fn new() -> Self {
        Self
    }

    /// Plan insertion points for `fee_tx_count` fee transactions over a
    /// sequence of `total_tx_count` swap transactions.
    ///
    /// `batches` supply the token count; `total_fee_native` is recorded in
    /// the metadata only.
    pub fn plan(
        &self,
        batches: &[Vec<DustToken>],
        total_fee_native: Decimal,
        total_tx_count: usize,
        fee_tx_count: usize,
        options: &InsertionOptions,
    ) -> EngineResult<InsertionStrategy> {
        options.validate()?;

        let token_count: usize = batches.iter().map(Vec::len).sum();
        let minimum_threshold = minimum_threshold(token_count, total_tx_count, options)?;
        let window_size = total_tx_count.saturating_sub(minimum_threshold);

        let (mode, placement, insertion_points) = if minimum_threshold >= total_tx_count {
            (
                InsertionMode::Fallback,
                Placement::Deterministic,
                deterministic_points(total_tx_count, fee_tx_count),
            )
        } else if window_size < fee_tx_count {
            (
                InsertionMode::Fallback,
                Placement::SequentialJitter,
                sequential_jitter_points(minimum_threshold, window_size, fee_tx_count),
            )
        } else {
            (
                InsertionMode::Random,
                Placement::Uniform,
                uniform_points(minimum_threshold, window_size, fee_tx_count),
            )
        };

        debug!(
            %mode,
            ?placement,
            minimum_threshold,
            total_tx_count,
            fee_tx_count,
            "Planned fee insertion"
        );

        Ok(InsertionStrategy {
            minimum_threshold,
            insertion_points,
            mode,
            metadata: InsertionMetadata {
                placement,
                token_count,
                total_tx_count,
                fee_tx_count,
                total_fee_native,
                window_size,
            },
        })
    }

    /// Check a strategy against a sequence of `total_tx_count` swap
    /// transactions.
    ///
    /// - points strictly increasing, one per fee transaction
    /// - the k-th point is spliceable once k fees precede it (`p_k <= total + k`)
    /// - `Random` mode: every point in `[minimum_threshold, total)`
    pub fn validate(&self, strategy: &InsertionStrategy, total_tx_count: usize) -> bool {
        let points = &strategy.insertion_points;

        if points.len() != strategy.metadata.fee_tx_count {
            return false;
        }

        if points.windows(2).any(|pair| pair[0] >= pair[1]) {
            return false;
        }

        if points.iter().enumerate().any(|(k, &p)| p > total_tx_count + k) {
            return false;
        }

        match strategy.mode {
            InsertionMode::Random => points
                .iter()
                .all(|&p| p >= strategy.minimum_threshold && p < total_tx_count),
            InsertionMode::Fallback => true,
        }
    }
}

fn minimum_threshold(
    token_count: usize,
    total_tx_count: usize,
    options: &InsertionOptions,
) -> EngineResult<usize> {
    let by_sequence = (Decimal::from(total_tx_count as u64)
        * (options.minimum_threshold_pct + options.safety_buffer))
        .ceil();
    let by_tokens = (Decimal::from(token_count as u64) * options.min_token_ratio).ceil();

    by_sequence
        .max(by_tokens)
        .to_usize()
        .ok_or_else(|| EngineError::InvalidInput("insertion threshold out of range".to_string()))
}

/// Distinct uniform draws from `[threshold, threshold + window)`.
fn uniform_points(threshold: usize, window: usize, count: usize) -> Vec<usize> {
    let mut points: Vec<usize> = rand::seq::index::sample(&mut OsRng, window, count)
        .into_iter()
        .map(|offset| threshold + offset)
        .collect();
    points.sort_unstable();
    points.dedup();
    points
}

/// Consecutive points from the threshold with 0-1 extra gaps, total slack
/// bounded by the window so each point stays spliceable.
fn sequential_jitter_points(threshold: usize, window: usize, count: usize) -> Vec<usize> {
    let mut slack = window;
    let mut next = threshold;
    let mut points = Vec::with_capacity(count);

    for _ in 0..count {
        if slack > 0 && OsRng.gen_bool(0.5) {
            next += 1;
            slack -= 1;
        }
        points.push(next);
        next += 1;
    }

    points
}

/// Fixed placement ending at the sequence tail.
fn deterministic_points(total: usize, count: usize) -> Vec<usize> {
    let start = total.saturating_sub(count);
    (0..count).map(|k| start + k).collect()
}

// =============================================================================
// Tests
// =============================================================================
