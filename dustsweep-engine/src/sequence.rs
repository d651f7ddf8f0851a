//! Transaction sequence builder.
//!
//! Composes the ordered list of unsigned transactions for a sweep:
//! approve + swap per token, plus the wrap-and-transfer fee legs.
//!
//! # Multi-insert
//!
//! [`TransactionSequenceBuilder::insert_at`] splices several descriptors into
//! an existing sequence in one step. Indices address the sequence as it was
//! *before* the call: pairs are applied from the highest index down, so an
//! insertion never shifts the position a lower index refers to.
//!
//! ```text
//! [a, b, c, d]  insert X@1, Y@3  →  [a, X, b, c, Y, d]
//! ```

use dustsweep_domain::{Address, Quote, TransactionDescriptor};

use crate::abi;
use crate::error::{EngineError, EngineResult};

/// Gas limit for ERC-20 `approve`
pub const APPROVE_GAS_LIMIT: u64 = 60_000;

/// Gas limit for wrapped-native `deposit`
pub const WRAP_GAS_LIMIT: u64 = 50_000;

/// Gas limit for ERC-20 `transfer`
pub const TRANSFER_GAS_LIMIT: u64 = 65_000;

/// Append-only builder for an ordered transaction sequence.
#[derive(Debug, Clone, Default)]
pub struct TransactionSequenceBuilder {
    transactions: Vec<TransactionDescriptor>,
}

impl TransactionSequenceBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `approve(spender, amount)` on `token`.
    pub fn add_approve(
        &mut self,
        token: &Address,
        spender: &Address,
        amount: u128,
        symbol: &str,
    ) -> EngineResult<TransactionDescriptor> {
        let data = abi::approve_calldata(spender, amount)?;
        self.push(TransactionDescriptor::new(
            token.clone(),
            0,
            Some(data),
            format!("Approve {} for swap", symbol),
            APPROVE_GAS_LIMIT,
        ))
    }

    /// Append the swap call described by `quote`.
    pub fn add_swap(&mut self, quote: &Quote, symbol: &str) -> EngineResult<TransactionDescriptor> {
        self.push(TransactionDescriptor::new(
            quote.call_target.clone(),
            quote.value,
            Some(quote.call_data.clone()),
            format!("Swap {} via {}", symbol, quote.provider),
            quote.gas_limit,
        ))
    }

    /// Append a wrapped-native `deposit()` carrying `amount` of native value.
    pub fn add_wrap_deposit(
        &mut self,
        wrapped_native: &Address,
        amount: u128,
    ) -> EngineResult<TransactionDescriptor> {
        self.push(TransactionDescriptor::new(
            wrapped_native.clone(),
            amount,
            Some(abi::deposit_calldata()),
            "Wrap native fee",
            WRAP_GAS_LIMIT,
        ))
    }

    /// Append an ERC-20 `transfer(recipient, amount)` on `token`.
    pub fn add_transfer(
        &mut self,
        token: &Address,
        recipient: &Address,
        amount: u128,
        description: impl Into<String>,
    ) -> EngineResult<TransactionDescriptor> {
        let data = abi::transfer_calldata(recipient, amount)?;
        self.push(TransactionDescriptor::new(
            token.clone(),
            0,
            Some(data),
            description,
            TRANSFER_GAS_LIMIT,
        ))
    }

    /// Transactions built so far.
    pub fn transactions(&self) -> &[TransactionDescriptor] {
        &self.transactions
    }

    /// Number of transactions built so far.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether nothing has been built.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Consume the builder, returning the sequence.
    pub fn build(self) -> Vec<TransactionDescriptor> {
        self.transactions
    }

    /// Splice `items` into `sequence` at `indices` atomically.
    ///
    /// Indices refer to positions in `sequence` before any insertion; an
    /// index equal to the length appends. Equal indices keep the order the
    /// items were given in. Nothing is modified if validation fails.
    ///
    /// # Errors
    /// - `InsertionCountMismatch` if `items.len() != indices.len()`
    /// - `InvalidInsertionIndex` if any index exceeds the current length
    ///
    /// # Example
    /// ```
    /// # use dustsweep_domain::{Address, TransactionDescriptor};
    /// # use dustsweep_engine::TransactionSequenceBuilder;
    /// let to = Address::parse("0x4200000000000000000000000000000000000006").unwrap();
    /// let tx = |d: &str| TransactionDescriptor::new(to.clone(), 0, None, d, 21_000);
    ///
    /// let mut seq = vec![tx("a"), tx("b"), tx("c")];
    /// TransactionSequenceBuilder::insert_at(&mut seq, vec![tx("y"), tx("x")], &[2, 0]).unwrap();
    ///
    /// let order: Vec<_> = seq.iter().map(|t| t.description.as_str()).collect();
    /// assert_eq!(order, ["x", "a", "b", "y", "c"]);
    /// ```
    pub fn insert_at(
        sequence: &mut Vec<TransactionDescriptor>,
        items: Vec<TransactionDescriptor>,
        indices: &[usize],
    ) -> EngineResult<()> {
        if items.len() != indices.len() {
            return Err(EngineError::InsertionCountMismatch {
                items: items.len(),
                indices: indices.len(),
            });
        }

        let len = sequence.len();
        if let Some(&index) = indices.iter().find(|&&index| index > len) {
            return Err(EngineError::InvalidInsertionIndex { index, len });
        }

        for item in &items {
            item.validate()?;
        }

        // Highest index first; among equal indices, last-given first so the
        // given order survives.
        let mut pairs: Vec<(usize, usize, TransactionDescriptor)> = indices
            .iter()
            .copied()
            .zip(items)
            .enumerate()
            .map(|(order, (index, item))| (index, order, item))
            .collect();
        pairs.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        sequence.reserve(pairs.len());
        for (index, _, item) in pairs {
            sequence.insert(index, item);
        }

        Ok(())
    }

    fn push(&mut self, tx: TransactionDescriptor) -> EngineResult<TransactionDescriptor> {
        tx.validate()?;
        self.transactions.push(tx.clone());
        Ok(tx)
    }
}

// =============================================================================
// Tests
// =============================================================================
