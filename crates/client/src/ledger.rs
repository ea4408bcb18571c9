//! Typed gateway over the marketplace ledger contract.
//!
//! [`Ledger`] is the abstraction seam between the reconciliation engine and
//! the chain: one method per contract read/write, no state of its own.
//! [`HttpLedger`] talks to the platform node's HTTP RPC facade; the mock
//! implementation lives in [`crate::mock`].

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::broadcast;

use tessera_common::{Account, AssetInfo, MarketError, Result, TokenId, TraitPair, Wei};

/// A token changed hands on the ledger.
///
/// Delivered only when the gateway exposes the optional transfer
/// subscription; the absence of events must never be relied upon.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub token_id: TokenId,
    pub from: Account,
    pub to: Account,
}

/// The full read/write surface of the ledger contract.
///
/// Reads take a token id or account; writes are attributed to a signing
/// account and may carry a payment in wei. None of the writes are safely
/// idempotent from the client's perspective, so callers never retry them.
#[async_trait]
pub trait Ledger: Send + Sync {
    // ── reads ──────────────────────────────────────────────────────────

    async fn tokens_by_owner(&self, owner: &Account) -> Result<Vec<TokenId>>;
    async fn asset(&self, id: TokenId) -> Result<AssetInfo>;
    async fn attributes(&self, id: TokenId) -> Result<Vec<TraitPair>>;
    async fn is_rented(&self, id: TokenId) -> Result<bool>;
    async fn renter(&self, id: TokenId) -> Result<Option<Account>>;
    async fn rental_end_time(&self, id: TokenId) -> Result<u64>;
    async fn sale_price(&self, id: TokenId) -> Result<Wei>;
    async fn rental_price(&self, id: TokenId) -> Result<Wei>;
    async fn rental_duration(&self, id: TokenId) -> Result<u64>;
    async fn auction_active(&self, id: TokenId) -> Result<bool>;
    async fn auction_end_time(&self, id: TokenId) -> Result<u64>;
    async fn highest_bid(&self, id: TokenId) -> Result<Option<Wei>>;

    // ── writes ─────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn create_asset_with_metadata(
        &self,
        from: &Account,
        name: &str,
        description: &str,
        metadata_uri: &str,
        trait_types: &[String],
        values: &[String],
    ) -> Result<TokenId>;
    async fn set_sale_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()>;
    async fn confirm_purchase(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()>;
    async fn set_rental_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()>;
    async fn set_rental_duration(&self, from: &Account, id: TokenId, secs: u64) -> Result<()>;
    async fn confirm_rent(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()>;
    async fn end_rental(&self, from: &Account, id: TokenId) -> Result<()>;
    async fn create_auction(&self, from: &Account, id: TokenId, duration_secs: u64) -> Result<()>;
    async fn place_bid(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()>;
    async fn end_auction(&self, from: &Account, id: TokenId) -> Result<()>;
    async fn transfer(&self, from: &Account, to: &Account, id: TokenId) -> Result<()>;

    /// Optional token-transferred notifications. Defaults to `None`:
    /// polling and refresh-on-command remain the baseline contract.
    fn subscribe_transfers(&self) -> Option<broadcast::Receiver<TransferEvent>> {
        None
    }
}

/// HTTP implementation of [`Ledger`] against the platform node's RPC facade.
///
/// Reads are GETs under `/asset/{id}/...`; writes are POSTs under `/tx/...`
/// with the signing account and any payment carried in the JSON body.
#[derive(Clone)]
pub struct HttpLedger {
    base: String,
    client: Client,
}

impl HttpLedger {
    pub fn new(base: impl Into<String>, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client");
        HttpLedger {
            base: base.into(),
            client,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(MarketError::gateway)?;
        let status = resp.status();
        if !status.is_success() {
            let t = resp.text().await.unwrap_or_default();
            return Err(MarketError::Gateway(format!("GET {path} failed {status} {t}")));
        }
        resp.json::<T>().await.map_err(MarketError::gateway)
    }

    async fn post_tx<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/tx/{}", self.base, method);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(MarketError::gateway)?;
        let status = resp.status();
        if !status.is_success() {
            let t = resp.text().await.unwrap_or_default();
            return Err(MarketError::Gateway(format!("{method} failed {status} {t}")));
        }
        resp.json::<T>().await.map_err(MarketError::gateway)
    }
}

/// Body shape shared by all write acknowledgements.
#[derive(serde::Deserialize)]
struct TxAck {
    #[allow(dead_code)]
    ok: bool,
}

#[derive(serde::Deserialize)]
struct Minted {
    token_id: TokenId,
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn tokens_by_owner(&self, owner: &Account) -> Result<Vec<TokenId>> {
        self.get_json(&format!("/tokens/{owner}")).await
    }

    async fn asset(&self, id: TokenId) -> Result<AssetInfo> {
        self.get_json(&format!("/asset/{id}")).await
    }

    async fn attributes(&self, id: TokenId) -> Result<Vec<TraitPair>> {
        self.get_json(&format!("/asset/{id}/attributes")).await
    }

    async fn is_rented(&self, id: TokenId) -> Result<bool> {
        self.get_json(&format!("/asset/{id}/rented")).await
    }

    async fn renter(&self, id: TokenId) -> Result<Option<Account>> {
        self.get_json(&format!("/asset/{id}/renter")).await
    }

    async fn rental_end_time(&self, id: TokenId) -> Result<u64> {
        self.get_json(&format!("/asset/{id}/rental-end-time")).await
    }

    async fn sale_price(&self, id: TokenId) -> Result<Wei> {
        self.get_json(&format!("/asset/{id}/sale-price")).await
    }

    async fn rental_price(&self, id: TokenId) -> Result<Wei> {
        self.get_json(&format!("/asset/{id}/rental-price")).await
    }

    async fn rental_duration(&self, id: TokenId) -> Result<u64> {
        self.get_json(&format!("/asset/{id}/rental-duration")).await
    }

    async fn auction_active(&self, id: TokenId) -> Result<bool> {
        self.get_json(&format!("/asset/{id}/auction-active")).await
    }

    async fn auction_end_time(&self, id: TokenId) -> Result<u64> {
        self.get_json(&format!("/asset/{id}/auction-end-time")).await
    }

    async fn highest_bid(&self, id: TokenId) -> Result<Option<Wei>> {
        self.get_json(&format!("/asset/{id}/highest-bid")).await
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
        let minted: Minted = self
            .post_tx(
                "create-asset",
                serde_json::json!({
                    "from": from,
                    "name": name,
                    "description": description,
                    "metadata_uri": metadata_uri,
                    "trait_types": trait_types,
                    "values": values,
                }),
            )
            .await?;
        Ok(minted.token_id)
    }

    async fn set_sale_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "set-sale-price",
                serde_json::json!({ "from": from, "token_id": id, "price": price }),
            )
            .await?;
        Ok(())
    }

    async fn confirm_purchase(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "confirm-purchase",
                serde_json::json!({ "from": from, "token_id": id, "value": payment }),
            )
            .await?;
        Ok(())
    }

    async fn set_rental_price(&self, from: &Account, id: TokenId, price: Wei) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "set-rental-price",
                serde_json::json!({ "from": from, "token_id": id, "price": price }),
            )
            .await?;
        Ok(())
    }

    async fn set_rental_duration(&self, from: &Account, id: TokenId, secs: u64) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "set-rental-duration",
                serde_json::json!({ "from": from, "token_id": id, "duration_secs": secs }),
            )
            .await?;
        Ok(())
    }

    async fn confirm_rent(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "confirm-rent",
                serde_json::json!({ "from": from, "token_id": id, "value": payment }),
            )
            .await?;
        Ok(())
    }

    async fn end_rental(&self, from: &Account, id: TokenId) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "end-rental",
                serde_json::json!({ "from": from, "token_id": id }),
            )
            .await?;
        Ok(())
    }

    async fn create_auction(&self, from: &Account, id: TokenId, duration_secs: u64) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "create-auction",
                serde_json::json!({ "from": from, "token_id": id, "duration_secs": duration_secs }),
            )
            .await?;
        Ok(())
    }

    async fn place_bid(&self, from: &Account, id: TokenId, payment: Wei) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "place-bid",
                serde_json::json!({ "from": from, "token_id": id, "value": payment }),
            )
            .await?;
        Ok(())
    }

    async fn end_auction(&self, from: &Account, id: TokenId) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "end-auction",
                serde_json::json!({ "from": from, "token_id": id }),
            )
            .await?;
        Ok(())
    }

    async fn transfer(&self, from: &Account, to: &Account, id: TokenId) -> Result<()> {
        let _: TxAck = self
            .post_tx(
                "transfer",
                serde_json::json!({ "from": from, "to": to, "token_id": id }),
            )
            .await?;
        Ok(())
    }

    // The HTTP facade exposes no push channel; callers fall back to
    // refresh-on-command, which the contract guarantees is sufficient.
}
