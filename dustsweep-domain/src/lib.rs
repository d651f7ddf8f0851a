//! Dustsweep Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains value objects, per-request entities, and the execution context.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod context;
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use context::{ExecutionContext, IntentId};
pub use entities::{
    BatchResult, DustToken, FailedToken, FeeBreakdown, InsertionMetadata, InsertionMode,
    InsertionStrategy, Placement, Quote, SwapOutcome, TradingLoss, TransactionDescriptor,
};
pub use value_objects::{decode_hex_amount, scale_amount, Address, DomainError, Price};
