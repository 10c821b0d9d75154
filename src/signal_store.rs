// =============================================================================
// Signal Store — in-memory durable queue of signals, partitioned by symbol
// =============================================================================
//
// Signal ids come from a single atomic counter and are globally monotonic.
// Status transitions are validated on replace: the outcome tracker is the
// only component producing updated signals, and an illegal transition is a
// programmer error that is rejected and logged rather than persisted.
//
// Per-symbol async mutexes serialize a symbol's scan with its outcome
// checks; the scheduler acquires the lock for the whole scan pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::signal::Signal;
use crate::types::{SignalStatus, Timeframe};

/// Retention cap per symbol; oldest signals are evicted past this.
const MAX_SIGNALS_PER_SYMBOL: usize = 500;

pub struct SignalStore {
    signals: RwLock<HashMap<String, Vec<Signal>>>,
    next_id: AtomicU64,
    scan_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self {
            signals: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            scan_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Per-symbol lock serializing scan and outcome-check passes. Clones of
    /// the same Arc are returned for the same symbol.
    pub fn symbol_lock(&self, symbol: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.scan_locks.lock();
        locks
            .entry(symbol.to_uppercase())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Persist a new signal, assigning the next monotonic id. Returns the
    /// stored signal.
    pub fn save_signal(&self, mut signal: Signal) -> Signal {
        signal.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let symbol = signal.symbol.to_uppercase();

        info!(
            id = signal.id,
            symbol = %symbol,
            timeframe = %signal.timeframe,
            direction = %signal.direction,
            entry = signal.entry_price,
            sl = signal.stop_loss,
            tp = signal.take_profit,
            confidence = format!("{:.3}", signal.confidence),
            "signal saved"
        );

        let mut map = self.signals.write();
        let list = map.entry(symbol).or_default();
        list.push(signal.clone());
        if list.len() > MAX_SIGNALS_PER_SYMBOL {
            let excess = list.len() - MAX_SIGNALS_PER_SYMBOL;
            list.drain(..excess);
        }
        signal
    }

    /// List signals, optionally filtered by symbol, status, and timeframe.
    /// Without a symbol filter, every partition is scanned.
    pub fn get_signals(
        &self,
        symbol: Option<&str>,
        status: Option<SignalStatus>,
        timeframe: Option<Timeframe>,
    ) -> Vec<Signal> {
        let map = self.signals.read();
        let mut out = Vec::new();

        let matches = |s: &Signal| {
            status.is_none_or(|st| s.status == st) && timeframe.is_none_or(|tf| s.timeframe == tf)
        };

        match symbol {
            Some(sym) => {
                if let Some(list) = map.get(&sym.to_uppercase()) {
                    out.extend(list.iter().filter(|s| matches(s)).cloned());
                }
            }
            None => {
                for list in map.values() {
                    out.extend(list.iter().filter(|s| matches(s)).cloned());
                }
                out.sort_by_key(|s| s.id);
            }
        }

        out
    }

    /// Signals the outcome tracker still watches (pending or active).
    pub fn get_open_signals(&self, symbol: &str) -> Vec<Signal> {
        let map = self.signals.read();
        map.get(&symbol.to_uppercase())
            .map(|list| list.iter().filter(|s| s.status.is_open()).cloned().collect())
            .unwrap_or_default()
    }

    /// Replace a stored signal with an updated version produced by the
    /// outcome tracker (or with loss attachments). Rejects updates whose
    /// status change is not a legal lifecycle transition. Returns the
    /// stored signal, or None if the id is unknown or the update illegal.
    pub fn replace(&self, updated: Signal) -> Option<Signal> {
        let mut map = self.signals.write();
        let list = map.get_mut(&updated.symbol.to_uppercase())?;
        let slot = list.iter_mut().find(|s| s.id == updated.id)?;

        if slot.status != updated.status && !slot.status.can_transition_to(updated.status) {
            warn!(
                id = updated.id,
                from = %slot.status,
                to = %updated.status,
                "illegal status transition rejected"
            );
            return None;
        }

        *slot = updated.clone();
        Some(updated)
    }

    /// Fetch one signal by id, scanning all partitions.
    pub fn get_by_id(&self, id: u64) -> Option<Signal> {
        let map = self.signals.read();
        map.values()
            .flat_map(|list| list.iter())
            .find(|s| s.id == id)
            .cloned()
    }

    /// Symbols with at least one stored signal.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.signals.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}
