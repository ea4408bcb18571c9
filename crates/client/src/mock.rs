//! In-memory mock implementations of the external collaborators.
//!
//! `MockLedger` emulates the marketplace contract well enough to drive the
//! whole reconciliation pipeline without a chain: ownership index, per-token
//! commercial fields, write semantics, and deterministic failure injection
//! keyed by method name and token (no sampling, so tests are reproducible).
//! Used by the test suites and by the agent's `--mock` mode.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use tessera_common::{
    unix_now, Account, AssetInfo, MarketError, Result, TokenId, TraitPair, Wei,
};

use crate::blobs::{BlobStore, MetadataDocument};
use crate::ledger::{Ledger, TransferEvent};

/// A live auction on a mock token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAuction {
    pub end_time: u64,
    pub high_bid: Option<(Account, Wei)>,
}

/// One token's full ledger-side record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockToken {
    pub owner: Account,
    pub info: AssetInfo,
    pub attributes: Vec<TraitPair>,
    pub sale_price: Wei,
    pub rental_price: Wei,
    pub rental_duration_secs: u64,
    pub renter: Option<Account>,
    pub rental_end_time: u64,
    pub auction: Option<MockAuction>,
}

impl MockToken {
    /// A bare token owned by `owner`, nothing offered.
    pub fn bare(owner: Account, name: &str) -> Self {
        MockToken {
            owner,
            info: AssetInfo {
                name: name.to_string(),
                description: String::new(),
                metadata_uri: String::new(),
            },
            attributes: Vec::new(),
            sale_price: Wei::ZERO,
            rental_price: Wei::ZERO,
            rental_duration_secs: 0,
            renter: None,
            rental_end_time: 0,
            auction: None,
        }
    }

    /// The contract keeps a rental "active" until `end-rental` is executed,
    /// even after its end time has passed; liveness also needs the clock.
    fn is_live_rented(&self, now: u64) -> bool {
        self.renter.is_some() && self.rental_end_time > now
    }
}

/// In-memory [`Ledger`] implementation.
pub struct MockLedger {
    tokens: RwLock<BTreeMap<u64, MockToken>>,
    next_id: AtomicU64,
    /// Frozen clock for deterministic tests; `None` means wall clock.
    now_override: RwLock<Option<u64>>,
    /// (method, token id) pairs whose reads fail with a gateway error.
    /// `tokens_by_owner` uses token id 0.
    failing_reads: RwLock<HashSet<(String, u64)>>,
    /// (method, token id) pairs whose writes fail with a gateway error.
    failing_writes: RwLock<HashSet<(String, u64)>>,
    /// Ordered method names of every read and write, for call assertions.
    reads: RwLock<Vec<String>>,
    writes: RwLock<Vec<String>>,
    /// Simulated per-read latency, milliseconds.
    read_latency_ms: AtomicU64,
    transfers: broadcast::Sender<TransferEvent>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        let (transfers, _) = broadcast::channel(32);
        MockLedger {
            tokens: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            now_override: RwLock::new(None),
            failing_reads: RwLock::new(HashSet::new()),
            failing_writes: RwLock::new(HashSet::new()),
            reads: RwLock::new(Vec::new()),
            writes: RwLock::new(Vec::new()),
            read_latency_ms: AtomicU64::new(0),
            transfers,
        }
    }

    // ── test helpers ───────────────────────────────────────────────────

    /// Insert a fully formed token and return its assigned id.
    pub fn insert(&self, token: MockToken) -> TokenId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().insert(id, token);
        TokenId(id)
    }

    /// Mutate an existing token in place. Returns false if unknown.
    pub fn modify(&self, id: TokenId, f: impl FnOnce(&mut MockToken)) -> bool {
        match self.tokens.write().get_mut(&id.0) {
            Some(t) => {
                f(t);
                true
            }
            None => false,
        }
    }

    /// Current ledger-side view of one token.
    pub fn token(&self, id: TokenId) -> Option<MockToken> {
        self.tokens.read().get(&id.0).cloned()
    }

    /// Freeze the mock's clock at `ts` (Unix seconds).
    pub fn set_now(&self, ts: u64) {
        *self.now_override.write() = Some(ts);
    }

    /// Make a read fail for one token (`tokens_by_owner` uses token 0).
    pub fn fail_read(&self, method: &str, id: u64) {
        self.failing_reads.write().insert((method.to_string(), id));
    }

    /// Make a write fail for one token.
    pub fn fail_write(&self, method: &str, id: u64) {
        self.failing_writes.write().insert((method.to_string(), id));
    }

    pub fn clear_failures(&self) {
        self.failing_reads.write().clear();
        self.failing_writes.write().clear();
    }

    pub fn set_read_latency_ms(&self, ms: u64) {
        self.read_latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Method names of all reads so far, in call order.
    pub fn read_log(&self) -> Vec<String> {
        self.reads.read().clone()
    }

    /// Method names of all writes so far, in call order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.read().clone()
    }

    pub fn count_reads(&self, method: &str) -> usize {
        self.reads.read().iter().filter(|m| *m == method).count()
    }

    // ── internals ──────────────────────────────────────────────────────

    fn now(&self) -> u64 {
        (*self.now_override.read()).unwrap_or_else(unix_now)
    }

    async fn before_read(&self, method: &str, id: u64) -> Result<()> {
        let latency = self.read_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
        }
        self.reads.write().push(method.to_string());
        if self.failing_reads.read().contains(&(method.to_string(), id)) {
            debug!("mock ledger: injected {} failure for token {}", method, id);
            return Err(MarketError::Gateway(format!(
                "injected {method} failure for token {id}"
            )));
        }
        Ok(())
    }

    fn before_write(&self, method: &str, id: u64) -> Result<()> {
        self.writes.write().push(method.to_string());
        if self
            .failing_writes
            .read()
            .contains(&(method.to_string(), id))
        {
            debug!("mock ledger: injected {} failure for token {}", method, id);
            return Err(MarketError::Gateway(format!(
                "injected {method} failure for token {id}"
            )));
        }
        Ok(())
    }

    fn read_token<T>(&self, id: TokenId, f: impl FnOnce(&MockToken) -> T) -> Result<T> {
        self.tokens
            .read()
            .get(&id.0)
            .map(f)
            .ok_or_else(|| MarketError::Gateway(format!("unknown token {id}")))
    }

    fn write_token<T>(
        &self,
        id: TokenId,
        f: impl FnOnce(&mut MockToken, u64) -> Result<T>,
    ) -> Result<T> {
        let now = self.now();
        match self.tokens.write().get_mut(&id.0) {
            Some(t) => f(t, now),
            None => Err(MarketError::Gateway(format!("unknown token {id}"))),
        }
    }

    fn emit_transfer(&self, token_id: TokenId, from: Account, to: Account) {
        // no receivers is fine
        let _ = self.transfers.send(TransferEvent { token_id, from, to });
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn tokens_by_owner(&self, owner: &Account) -> Result<Vec<TokenId>> {
        self.before_read("tokens_by_owner", 0).await?;
        Ok(self
            .tokens
            .read()
            .iter()
            .filter(|(_, t)| &t.owner == owner)
            .map(|(id, _)| TokenId(*id))
            .collect())
    }

    async fn asset(&self, id: TokenId) -> Result<AssetInfo> {
        self.before_read("asset", id.0).await?;
        self.read_token(id, |t| t.info.clone())
    }

    async fn attributes(&self, id: TokenId) -> Result<Vec<TraitPair>> {
        self.before_read("attributes", id.0).await?;
        self.read_token(id, |t| t.attributes.clone())
    }

    async fn is_rented(&self, id: TokenId) -> Result<bool> {
        self.before_read("is_rented", id.0).await?;
        self.read_token(id, |t| t.renter.is_some())
    }

    async fn renter(&self, id: TokenId) -> Result<Option<Account>> {
        self.before_read("renter", id.0).await?;
        self.read_token(id, |t| t.renter.clone())
    }

    async fn rental_end_time(&self, id: TokenId) -> Result<u64> {
        self.before_read("rental_end_time", id.0).await?;
        self.read_token(id, |t| t.rental_end_time)
    }

    async fn sale_price(&self, id: TokenId) -> Result<Wei> {
        self.before_read("sale_price", id.0).await?;
        self.read_token(id, |t| t.sale_price)
    }

    async fn rental_price(&self, id: TokenId) -> Result<Wei> {
        self.before_read("rental_price", id.0).await?;
        self.read_token(id, |t| t.rental_price)
    }

    async fn rental_duration(&self, id: TokenId) -> Result<u64> {
        self.before_read("rental_duration", id.0).await?;
        self.read_token(id, |t| t.rental_duration_secs)
    }

    async fn auction_active(&self, id: TokenId) -> Result<bool> {
        self.before_read("auction_active", id.0).await?;
        self.read_token(id, |t| t.auction.is_some())
    }

    async fn auction_end_time(&self, id: TokenId) -> Result<u64> {
        self.before_read("auction_end_time", id.0).await?;
        self.read_token(id, |t| t.auction.as_ref().map(|a| a.end_time).unwrap_or(0))
    }

    async fn highest_bid(&self, id: TokenId) -> Result<Option<Wei>> {
        self.before_read("highest_bid", id.0).await?;
        self.read_token(id, |t| {
            t.auction
                .as_ref()
                .and_then(|a| a.high_bid.as_ref().map(|(_, bid)| *bid))
        })
    }

    async fn create_asset_with_metadata(
        &self,
        from: &Account,
        name: &str,
        description: &str,
        metadata_uri: &str,
        trait_types: &[String],
        values: &[String],
    ) -> Result<TokenId> {
        self.before_write("create_asset_with_metadata", 0)?;
        if trait_types.len() != values.len() {
            return Err(MarketError::Gateway(
                "trait name/value arity mismatch".to_string(),
            ));
        }
        let attributes = trait_types
            .iter()
            .zip(values.iter())
            .map(|(t, v)| TraitPair {
                trait_type: t.clone(),
                value: v.clone(),
            })
            .collect();
        let token = MockToken {
            owner: from.clone(),
            info: AssetInfo {
                name: name.to_string(),
                description: description.to_string(),
                metadata_uri: metadata_uri.to_string(),
            },
            attributes,
            ..MockToken::bare(from.clone(), name)
        };
        Ok(self.insert(token))
    }

    async fn set_sale_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()> {
        self.before_write("set_sale_price", id.0)?;
        self.write_token(id, |t, _| {
            if &t.owner != from {
                return Err(MarketError::Gateway(format!("{from} does not own {id}")));
            }
            t.sale_price = price;
            Ok(())
        })
    }

    async fn confirm_purchase(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        self.before_write("confirm_purchase", id.0)?;
        let (prev, next) = self.write_token(id, |t, now| {
            if t.sale_price.is_unset() {
                return Err(MarketError::Gateway(format!("{id} is not for sale")));
            }
            if payment < t.sale_price {
                return Err(MarketError::Gateway("payment below sale price".to_string()));
            }
            if t.is_live_rented(now) || t.auction.is_some() {
                return Err(MarketError::Gateway(format!("{id} is not transferable")));
            }
            let prev = std::mem::replace(&mut t.owner, from.clone());
            t.sale_price = Wei::ZERO;
            Ok((prev, t.owner.clone()))
        })?;
        self.emit_transfer(id, prev, next);
        Ok(())
    }

    async fn set_rental_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()> {
        self.before_write("set_rental_price", id.0)?;
        self.write_token(id, |t, _| {
            if &t.owner != from {
                return Err(MarketError::Gateway(format!("{from} does not own {id}")));
            }
            t.rental_price = price;
            Ok(())
        })
    }

    async fn set_rental_duration(&self, from: &Account, id: TokenId, secs: u64) -> Result<()> {
        self.before_write("set_rental_duration", id.0)?;
        self.write_token(id, |t, _| {
            if &t.owner != from {
                return Err(MarketError::Gateway(format!("{from} does not own {id}")));
            }
            t.rental_duration_secs = secs;
            Ok(())
        })
    }

    async fn confirm_rent(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        self.before_write("confirm_rent", id.0)?;
        self.write_token(id, |t, now| {
            if t.rental_price.is_unset() {
                return Err(MarketError::Gateway(format!("{id} is not for rent")));
            }
            if t.rental_duration_secs == 0 {
                return Err(MarketError::Gateway(format!(
                    "{id} has no rental duration set"
                )));
            }
            if payment < t.rental_price {
                return Err(MarketError::Gateway(
                    "payment below rental price".to_string(),
                ));
            }
            if t.is_live_rented(now) {
                return Err(MarketError::Gateway(format!("{id} is already rented")));
            }
            if t.auction.is_some() {
                return Err(MarketError::Gateway(format!("{id} is in auction")));
            }
            t.renter = Some(from.clone());
            t.rental_end_time = now + t.rental_duration_secs;
            Ok(())
        })
    }

    async fn end_rental(&self, _from: &Account, id: TokenId) -> Result<()> {
        self.before_write("end_rental", id.0)?;
        self.write_token(id, |t, _| {
            if t.renter.is_none() {
                return Err(MarketError::Gateway(format!("{id} is not rented")));
            }
            // the contract closes the whole rental offer when finalizing
            t.renter = None;
            t.rental_end_time = 0;
            t.rental_price = Wei::ZERO;
            t.rental_duration_secs = 0;
            Ok(())
        })
    }

    async fn create_auction(&self, from: &Account, id: TokenId, duration_secs: u64) -> Result<()> {
        self.before_write("create_auction", id.0)?;
        self.write_token(id, |t, now| {
            if &t.owner != from {
                return Err(MarketError::Gateway(format!("{from} does not own {id}")));
            }
            if t.is_live_rented(now) {
                return Err(MarketError::Gateway(format!("{id} is rented")));
            }
            if t.auction.is_some() {
                return Err(MarketError::Gateway(format!("{id} is already in auction")));
            }
            t.auction = Some(MockAuction {
                end_time: now + duration_secs,
                high_bid: None,
            });
            Ok(())
        })
    }

    async fn place_bid(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        self.before_write("place_bid", id.0)?;
        self.write_token(id, |t, now| {
            let auction = t
                .auction
                .as_mut()
                .ok_or_else(|| MarketError::Gateway(format!("{id} is not in auction")))?;
            if now >= auction.end_time {
                return Err(MarketError::Gateway("auction has ended".to_string()));
            }
            let current = auction.high_bid.as_ref().map(|(_, bid)| *bid);
            if payment.is_unset() || current.is_some_and(|c| payment <= c) {
                return Err(MarketError::Gateway("bid too low".to_string()));
            }
            auction.high_bid = Some((from.clone(), payment));
            Ok(())
        })
    }

    async fn end_auction(&self, _from: &Account, id: TokenId) -> Result<()> {
        self.before_write("end_auction", id.0)?;
        let handover = self.write_token(id, |t, now| {
            let auction = t
                .auction
                .take()
                .ok_or_else(|| MarketError::Gateway(format!("{id} is not in auction")))?;
            if now < auction.end_time {
                t.auction = Some(auction);
                return Err(MarketError::Gateway("auction still running".to_string()));
            }
            match auction.high_bid {
                Some((bidder, _)) => {
                    let prev = std::mem::replace(&mut t.owner, bidder);
                    Ok(Some((prev, t.owner.clone())))
                }
                None => Ok(None),
            }
        })?;
        if let Some((prev, next)) = handover {
            self.emit_transfer(id, prev, next);
        }
        Ok(())
    }

    async fn transfer(&self, from: &Account, to: &Account, id: TokenId) -> Result<()> {
        self.before_write("transfer", id.0)?;
        self.write_token(id, |t, now| {
            if &t.owner != from {
                return Err(MarketError::Gateway(format!("{from} does not own {id}")));
            }
            if t.is_live_rented(now) {
                return Err(MarketError::Gateway(format!(
                    "{id} is rented and cannot be transferred"
                )));
            }
            if t.auction.is_some() {
                return Err(MarketError::Gateway(format!("{id} is in auction")));
            }
            t.owner = to.clone();
            Ok(())
        })?;
        self.emit_transfer(id, from.clone(), to.clone());
        Ok(())
    }

    fn subscribe_transfers(&self) -> Option<broadcast::Receiver<TransferEvent>> {
        Some(self.transfers.subscribe())
    }
}

/// In-memory [`BlobStore`] with failure switches.
#[derive(Default)]
pub struct MockBlobStore {
    images: RwLock<Vec<(String, usize)>>,
    metadata: RwLock<Vec<MetadataDocument>>,
    fail_image: std::sync::atomic::AtomicBool,
    fail_metadata: std::sync::atomic::AtomicBool,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_image_uploads(&self) {
        self.fail_image.store(true, Ordering::SeqCst);
    }

    pub fn fail_metadata_uploads(&self) {
        self.fail_metadata.store(true, Ordering::SeqCst);
    }

    pub fn image_count(&self) -> usize {
        self.images.read().len()
    }

    /// All metadata documents uploaded so far.
    pub fn metadata_log(&self) -> Vec<MetadataDocument> {
        self.metadata.read().clone()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        if self.fail_image.load(Ordering::SeqCst) {
            return Err(MarketError::Upload("injected image upload failure".into()));
        }
        let mut images = self.images.write();
        images.push((filename.to_string(), bytes.len()));
        Ok(format!("mock://images/{}", images.len()))
    }

    async fn upload_metadata(&self, doc: &MetadataDocument) -> Result<String> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(MarketError::Upload(
                "injected metadata upload failure".into(),
            ));
        }
        let mut metadata = self.metadata.write();
        metadata.push(doc.clone());
        Ok(format!("mock://metadata/{}", metadata.len()))
    }
}
