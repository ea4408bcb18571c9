//! Per-asset snapshot assembly.
//!
//! The ledger exposes no batched read, so every record is put together from
//! individual field fetches, each of which can fail on its own. Partial
//! success is the normal case: a failed token is dropped from the cycle's
//! results and the refresh still succeeds with fewer records.

use std::sync::Arc;

use tracing::{info, warn};

use tessera_common::{
    normalize, rental_time_left, unix_now, Account, AssetRecord, CommercialState, MarketError,
    RawAssetFields, Result, TokenId,
};

use crate::ledger::Ledger;

/// Pulls the full field set for every token an account owns.
#[derive(Clone)]
pub struct SnapshotFetcher {
    ledger: Arc<dyn Ledger>,
}

impl SnapshotFetcher {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        SnapshotFetcher { ledger }
    }

    /// Fetch the ordered records currently attributed to `owner`.
    ///
    /// Fails as a whole only if the owner's token listing itself fails;
    /// per-token failures are absorbed (the token is omitted this cycle).
    pub async fn fetch_owned(&self, owner: &Account) -> Result<Vec<AssetRecord>> {
        let ids = self.ledger.tokens_by_owner(owner).await?;
        let mut records = Vec::with_capacity(ids.len());
        let mut dropped = 0usize;
        for id in ids {
            match self.fetch_one(owner, id).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    dropped += 1;
                    warn!("token {} dropped from this refresh: {}", id, e);
                }
            }
        }
        if dropped > 0 {
            info!(
                "refresh for {}: {} records, {} dropped",
                owner,
                records.len(),
                dropped
            );
        }
        Ok(records)
    }

    /// Assemble one record. Any field failure fails the whole record.
    async fn fetch_one(&self, caller: &Account, id: TokenId) -> Result<AssetRecord> {
        let partial = |e: MarketError| MarketError::partial(id, e);

        let info = self.ledger.asset(id).await.map_err(partial)?;
        let attributes = self.ledger.attributes(id).await.map_err(partial)?;

        let mut raw = RawAssetFields {
            sale_price: self.ledger.sale_price(id).await.map_err(partial)?,
            rental_price: self.ledger.rental_price(id).await.map_err(partial)?,
            rental_duration_secs: self.ledger.rental_duration(id).await.map_err(partial)?,
            is_rented: self.ledger.is_rented(id).await.map_err(partial)?,
            auction_active: self.ledger.auction_active(id).await.map_err(partial)?,
            ..RawAssetFields::default()
        };
        if raw.is_rented {
            raw.renter = self.ledger.renter(id).await.map_err(partial)?;
            raw.rental_end_time = self.ledger.rental_end_time(id).await.map_err(partial)?;
        }
        if raw.auction_active {
            raw.auction_end_time = self.ledger.auction_end_time(id).await.map_err(partial)?;
            raw.high_bid = self.ledger.highest_bid(id).await.map_err(partial)?;
        }

        let now = unix_now();
        let mut stale = false;

        // The ledger keeps a lapsed rental flagged as rented until someone
        // finalizes it. Do that here, before the record can reach the cache,
        // so an expired rental is never presented as active.
        if raw.is_rented && rental_time_left(raw.rental_end_time, now) == 0 {
            if let Err(e) = self.finalize_lapsed(caller, id, &mut raw).await {
                warn!("finalize of lapsed rental on {} failed: {}", id, e);
                stale = true;
            }
        }

        let state = normalize(&raw, now);
        let time_left_secs = match &state {
            CommercialState::Rented { end_time, .. } => rental_time_left(*end_time, now),
            _ => 0,
        };
        Ok(AssetRecord {
            token_id: id,
            info,
            attributes,
            state,
            time_left_secs,
            last_synced_at: now,
            stale,
        })
    }

    /// Issue the finalize write and re-read the fields it affects. A
    /// failure may leave `raw` partially re-read; the caller flags the
    /// record stale in that case.
    async fn finalize_lapsed(
        &self,
        caller: &Account,
        id: TokenId,
        raw: &mut RawAssetFields,
    ) -> Result<()> {
        info!("rental on {} lapsed, finalizing against the ledger", id);
        self.ledger.end_rental(caller, id).await?;
        raw.is_rented = self.ledger.is_rented(id).await?;
        if raw.is_rented {
            raw.renter = self.ledger.renter(id).await?;
            raw.rental_end_time = self.ledger.rental_end_time(id).await?;
        } else {
            raw.renter = None;
            raw.rental_end_time = 0;
        }
        raw.rental_price = self.ledger.rental_price(id).await?;
        raw.rental_duration_secs = self.ledger.rental_duration(id).await?;
        Ok(())
    }
}
