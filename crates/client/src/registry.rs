//! The authoritative client-side cache of asset records.
//!
//! The registry is the only mutable shared state in the engine. Two writers
//! exist, with disjoint powers: the refresh pipeline replaces the whole
//! snapshot atomically, and the expiry monitor decrements `time_left_secs`
//! in place. Nothing else writes to cached records.

use parking_lot::RwLock;
use tokio::sync::watch;

use tessera_common::{AssetRecord, CommercialState, TokenId};

pub struct AssetRegistry {
    records: RwLock<Vec<AssetRecord>>,
    /// Bumped on every visible change; receivers re-read the snapshot.
    generation: watch::Sender<u64>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetRegistry {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        AssetRegistry {
            records: RwLock::new(Vec::new()),
            generation,
        }
    }

    /// Replace the whole snapshot as one unit. Readers never observe a
    /// half-updated registry.
    pub fn replace_all(&self, records: Vec<AssetRecord>) {
        *self.records.write() = records;
        self.bump();
    }

    /// Clone of the current snapshot, in ledger listing order.
    pub fn snapshot(&self) -> Vec<AssetRecord> {
        self.records.read().clone()
    }

    pub fn get(&self, id: TokenId) -> Option<AssetRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.token_id == id)
            .cloned()
    }

    /// Cached commercial state of one token, if present.
    pub fn state_of(&self, id: TokenId) -> Option<CommercialState> {
        self.records
            .read()
            .iter()
            .find(|r| r.token_id == id)
            .map(|r| r.state.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// One countdown tick: decrement every active rental's remaining time
    /// by one second, flooring at zero. Returns how many rentals reached
    /// zero on this tick. Never transitions commercial state; that is the
    /// refresh pipeline's job.
    pub fn tick_rentals(&self) -> usize {
        let mut expired = 0usize;
        let mut changed = false;
        {
            let mut records = self.records.write();
            for record in records.iter_mut() {
                if matches!(record.state, CommercialState::Rented { .. })
                    && record.time_left_secs > 0
                {
                    record.time_left_secs -= 1;
                    changed = true;
                    if record.time_left_secs == 0 {
                        expired += 1;
                    }
                }
            }
        }
        if changed {
            self.bump();
        }
        expired
    }

    /// Observe registry changes; the value is an opaque generation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn bump(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}
