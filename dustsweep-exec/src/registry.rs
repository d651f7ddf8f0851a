//! Static token registry.

use std::collections::HashMap;

use dustsweep_domain::Address;

use crate::ports::TokenRegistry;

/// Native asset data for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAssets {
    /// Wrapped native contract
    pub wrapped_native: Address,
    /// Oracle symbol of the native asset
    pub native_symbol: String,
}

/// In-memory chain table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    chains: HashMap<u64, ChainAssets>,
}

impl StaticTokenRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with Ethereum, Optimism, Polygon, Base and Arbitrum.
    pub fn with_defaults() -> Self {
        let table: [(u64, &str, &str); 5] = [
            (1, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "ETH"),
            (10, "0x4200000000000000000000000000000000000006", "ETH"),
            (137, "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270", "MATIC"),
            (8453, "0x4200000000000000000000000000000000000006", "ETH"),
            (42161, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", "ETH"),
        ];

        let mut registry = Self::new();
        for (chain_id, wrapped, symbol) in table {
            if let Ok(wrapped_native) = Address::parse(wrapped) {
                registry.register(chain_id, wrapped_native, symbol);
            }
        }
        registry
    }

    /// Add or replace a chain.
    pub fn register(&mut self, chain_id: u64, wrapped_native: Address, native_symbol: impl Into<String>) {
        self.chains.insert(
            chain_id,
            ChainAssets {
                wrapped_native,
                native_symbol: native_symbol.into(),
            },
        );
    }

    /// Known chain ids.
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl TokenRegistry for StaticTokenRegistry {
    fn get_wrapped_native_address(&self, chain_id: u64) -> Option<Address> {
        self.chains.get(&chain_id).map(|c| c.wrapped_native.clone())
    }

    fn native_symbol(&self, chain_id: u64) -> Option<String> {
        self.chains.get(&chain_id).map(|c| c.native_symbol.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chains() {
        let registry = StaticTokenRegistry::with_defaults();
        assert_eq!(registry.chain_ids(), vec![1, 10, 137, 8453, 42161]);
        assert_eq!(registry.native_symbol(137).as_deref(), Some("MATIC"));
        assert_eq!(
            registry.get_wrapped_native_address(8453).unwrap().as_str(),
            "0x4200000000000000000000000000000000000006"
        );
        assert!(registry.get_wrapped_native_address(56).is_none());
    }
}
