//! Dustsweep Connectors
//!
//! Adapters for external services behind the execution ports.
//!
//! - `lifi`: LI.FI quote API as a `RouteProvider`
//! - `odos`: Odos smart order router as a `RouteProvider`
//! - `binance_price`: Binance spot ticker as a `PriceOracle`

#![warn(clippy::all)]

// Public modules
pub mod binance_price;
pub mod lifi;
pub mod odos;

// Re-exports
pub use binance_price::{BinancePriceOracle, BINANCE_API_URL};
pub use lifi::{LifiClient, LIFI_API_URL};
pub use odos::{OdosClient, ODOS_API_URL};
