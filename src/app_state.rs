// =============================================================================
// Central Application State — the Meridian engine's wiring
// =============================================================================
//
// Single source of truth shared across all async tasks via `Arc<AppState>`.
// Registries (adapters, indicators) are populated explicitly here at
// startup; nothing is discovered at runtime.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::info;

use crate::adapters::{
    binance::BinanceAdapter, cryptocompare::CryptoCompareAdapter, oanda::OandaAdapter,
    stooq::StooqAdapter, AdapterRegistry,
};
use crate::indicators::IndicatorEngine;
use crate::ingestion::IngestionPipeline;
use crate::macro_data::MacroCache;
use crate::market_data::CandleStore;
use crate::notifications::NotificationHub;
use crate::predictor::{MomentumPredictor, Predictor};
use crate::runtime_config::RuntimeConfig;
use crate::signal_engine::SignalEngine;
use crate::signal_store::SignalStore;
use crate::types::{Asset, MarketType};

pub struct AppState {
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub candle_store: Arc<CandleStore>,
    pub signal_store: Arc<SignalStore>,
    pub adapters: Arc<AdapterRegistry>,
    pub ingestion: Arc<IngestionPipeline>,
    pub signal_engine: Arc<SignalEngine>,
    pub macro_cache: Arc<MacroCache>,
    pub notifier: Arc<NotificationHub>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the full production engine from a runtime config. Adapter
    /// credentials come from the environment.
    pub fn new(config: RuntimeConfig) -> Self {
        let adapters = Arc::new(AdapterRegistry::new());
        adapters.register(Arc::new(BinanceAdapter::new()));
        adapters.register(Arc::new(CryptoCompareAdapter::from_env()));
        adapters.register(Arc::new(OandaAdapter::from_env()));
        adapters.register(Arc::new(StooqAdapter::new()));
        for (symbol, adapter_name) in &config.adapter_overrides {
            adapters.set_route(symbol, adapter_name);
        }

        let candle_store = Arc::new(CandleStore::new(config.candle_retention));
        for symbol in &config.watched_symbols {
            candle_store.register_asset(default_asset(symbol));
        }

        let ingestion = Arc::new(IngestionPipeline::new(
            adapters.clone(),
            candle_store.clone(),
            config.fallback_adapters.clone(),
        ));

        let indicators = Arc::new(IndicatorEngine::with_default_catalog());
        let predictor: Arc<dyn Predictor> = Arc::new(MomentumPredictor::default());
        let signal_engine = Arc::new(SignalEngine::new(indicators, predictor));

        let notifier = Arc::new(NotificationHub::from_env());
        info!(
            transports = notifier.transport_count(),
            adapters = adapters.list_adapters().len(),
            symbols = config.watched_symbols.len(),
            "application state wired"
        );

        Self {
            runtime_config: Arc::new(RwLock::new(config)),
            candle_store,
            signal_store: Arc::new(SignalStore::new()),
            adapters,
            ingestion,
            signal_engine,
            macro_cache: Arc::new(MacroCache::from_env()),
            notifier,
            start_time: Instant::now(),
        }
    }
}

/// Seed asset metadata for a watched symbol. Market type falls out of the
/// same heuristics the router uses.
fn default_asset(symbol: &str) -> Asset {
    let upper = symbol.to_uppercase();
    let (name, market_type) = match upper.as_str() {
        "XAUUSD" => ("Gold Spot", MarketType::Commodity),
        "XAGUSD" => ("Silver Spot", MarketType::Commodity),
        "BTCUSD" => ("Bitcoin", MarketType::Crypto),
        "ETHUSD" => ("Ethereum", MarketType::Crypto),
        "SOLUSD" => ("Solana", MarketType::Crypto),
        "XRPUSD" => ("Ripple", MarketType::Crypto),
        "ETHBTC" => ("Ethereum / Bitcoin", MarketType::Crypto),
        "EURUSD" => ("Euro / US Dollar", MarketType::Forex),
        "GBPUSD" => ("British Pound / US Dollar", MarketType::Forex),
        "USDJPY" => ("US Dollar / Japanese Yen", MarketType::Forex),
        "AUDUSD" => ("Australian Dollar / US Dollar", MarketType::Forex),
        "USDCAD" => ("US Dollar / Canadian Dollar", MarketType::Forex),
        "NZDUSD" => ("New Zealand Dollar / US Dollar", MarketType::Forex),
        "USDCHF" => ("US Dollar / Swiss Franc", MarketType::Forex),
        "EURGBP" => ("Euro / British Pound", MarketType::Forex),
        "EURJPY" => ("Euro / Japanese Yen", MarketType::Forex),
        "GBPJPY" => ("British Pound / Japanese Yen", MarketType::Forex),
        _ if upper.len() == 6 => (symbol, MarketType::Forex),
        _ => (symbol, MarketType::Index),
    };
    Asset::new(&upper, name, market_type)
}
