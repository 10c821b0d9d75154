// =============================================================================
// Adapter Registry + Router — symbol to provider resolution
// =============================================================================
//
// Adapters register explicitly at startup. Routing rules, in order:
//   1. Explicit per-symbol override.
//   2. Commodity codes (gold, silver) -> a commodity-or-forex adapter.
//   3. Leading crypto base currency -> a crypto adapter.
//   4. Six-letter pair with a known fiat base -> a forex adapter.
//   5. Otherwise NoRoute.
//
// Adapters iterate in name order, so rule resolution is deterministic no
// matter the registration order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::adapters::{AdapterError, SourceAdapter};
use crate::types::MarketType;

/// Commodity codes routed to a commodity-or-forex provider.
const COMMODITY_SYMBOLS: [&str; 5] = ["XAUUSD", "XAGUSD", "GC", "SI", "GLD"];

/// Known crypto base currencies matched against the symbol prefix.
const CRYPTO_BASES: [&str; 12] = [
    "BTC", "ETH", "SOL", "XRP", "BNB", "ADA", "DOGE", "DOT", "LTC", "LINK", "AVAX", "MATIC",
];

/// Known fiat base currencies for six-letter pairs.
const FIAT_BASES: [&str; 8] = ["EUR", "GBP", "USD", "JPY", "CHF", "AUD", "NZD", "CAD"];

pub struct AdapterRegistry {
    adapters: RwLock<BTreeMap<String, Arc<dyn SourceAdapter>>>,
    routes: RwLock<HashMap<String, String>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) {
        info!(
            name = adapter.name(),
            market = %adapter.market_type(),
            "adapter registered"
        );
        self.adapters
            .write()
            .insert(adapter.name().to_string(), adapter);
    }

    pub fn get_adapter(&self, name: &str) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        self.adapters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AdapterError::NoRoute(format!("adapter '{name}' not registered")))
    }

    /// Manually route a symbol to a specific adapter.
    pub fn set_route(&self, symbol: &str, adapter_name: &str) {
        self.routes
            .write()
            .insert(symbol.to_uppercase(), adapter_name.to_string());
    }

    /// Resolve the primary adapter for a symbol.
    pub fn route_symbol(&self, symbol: &str) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        let symbol = symbol.to_uppercase();

        // 1. Explicit override.
        if let Some(name) = self.routes.read().get(&symbol) {
            return self.get_adapter(name);
        }

        let adapters = self.adapters.read();

        // 2. Commodities route to a commodity-or-forex provider.
        if COMMODITY_SYMBOLS.contains(&symbol.as_str()) {
            if let Some(adapter) = adapters.values().find(|a| {
                matches!(a.market_type(), MarketType::Commodity | MarketType::Forex)
            }) {
                return Ok(adapter.clone());
            }
        }

        // 3. Crypto by base-currency prefix (3 or 4 leading chars).
        let prefix_matches = CRYPTO_BASES
            .iter()
            .any(|base| symbol.starts_with(base));
        if prefix_matches {
            if let Some(adapter) = adapters
                .values()
                .find(|a| a.market_type() == MarketType::Crypto)
            {
                return Ok(adapter.clone());
            }
        }

        // 4. Six-letter alpha pair with a fiat base.
        if symbol.len() == 6
            && symbol.chars().all(|c| c.is_ascii_alphabetic())
            && FIAT_BASES.contains(&&symbol[..3])
        {
            if let Some(adapter) = adapters
                .values()
                .find(|a| a.market_type() == MarketType::Forex)
            {
                return Ok(adapter.clone());
            }
        }

        Err(AdapterError::NoRoute(symbol))
    }

    /// Registered adapters as (name, market type) pairs, name-ordered.
    pub fn list_adapters(&self) -> Vec<(String, MarketType)> {
        self.adapters
            .read()
            .values()
            .map(|a| (a.name().to_string(), a.market_type()))
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
