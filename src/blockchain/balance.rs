use dashmap::DashMap;

use std::sync::{Arc, PoisonError, RwLock};

use super::chain::Ledger;
use super::crypto::Address;

/// Entries kept for one tip before the cache starts over
const MAX_ENTRIES: usize = 4096;

#[derive(Debug, Clone)]
struct CachedBalance {
    tip_hash: String,
    balance: f64,
}

/// Memoised balances, each tagged with the chain tip it was derived from.
///
/// An entry only answers queries against the same tip, so a stale value can
/// never be returned after the chain grows or is replaced. Moving to a new
/// tip drops every entry of the previous one.
#[derive(Debug, Clone, Default)]
pub struct BalanceCache {
    tip_hash: Arc<RwLock<String>>,
    entries: Arc<DashMap<Address, CachedBalance>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `address` in `ledger`, computed at most once per tip
    pub fn balance(&self, ledger: &Ledger, address: &Address) -> f64 {
        let tip_hash = &ledger.latest_block().hash;

        if let Some(entry) = self.entries.get(address) {
            if &entry.tip_hash == tip_hash {
                return entry.balance;
            }
        }

        let balance = ledger.get_balance(address);
        self.advance_to(tip_hash);
        self.entries.insert(
            address.clone(),
            CachedBalance {
                tip_hash: tip_hash.clone(),
                balance,
            },
        );
        balance
    }

    // Entries of any other tip are misses, so they are dropped wholesale.
    fn advance_to(&self, tip_hash: &str) {
        let mut current = self.tip_hash.write().unwrap_or_else(PoisonError::into_inner);

        if current.as_str() != tip_hash {
            self.entries.clear();
            *current = tip_hash.to_string();
        } else if self.entries.len() >= MAX_ENTRIES {
            self.entries.clear();
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
