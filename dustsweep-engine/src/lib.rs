//! Dustsweep Engine Layer
//!
//! Pure decision logic, no I/O.
//! Fee legs, transaction sequencing, and fee insertion planning.

#![warn(clippy::all)]

pub mod abi;
pub mod error;
pub mod fees;
pub mod insertion;
pub mod sequence;

// Re-exports for convenience
pub use error::{EngineError, EngineResult};
pub use fees::{FeeCalculator, FEE_RATE, NATIVE_DECIMALS};
pub use insertion::{FeeInsertionPlanner, InsertionOptions};
pub use sequence::TransactionSequenceBuilder;
