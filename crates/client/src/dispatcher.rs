//! Validated state-changing commands.
//!
//! Every operation follows the same contract: validate inputs before any
//! remote call, perform exactly one attributed ledger write, then trigger a
//! full registry refresh so the confirmed state is reflected. The cache is
//! never mutated optimistically, and nothing here retries: ledger writes
//! carry payments and are not safely idempotent.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tessera_common::{Account, AssetRecord, MarketError, Result, TokenId, TraitPair, Wei};

use crate::blobs::{BlobStore, MetadataDocument};
use crate::ledger::Ledger;
use crate::refresh::Refresher;
use crate::registry::AssetRegistry;

/// The attribute document users paste when creating an asset:
/// `{"attributes": [{"traitType": "Size", "value": "100x100"}]}`.
#[derive(Debug, Deserialize)]
struct AttributesInput {
    attributes: Vec<TraitPair>,
}

pub struct CommandDispatcher {
    ledger: Arc<dyn Ledger>,
    blobs: Arc<dyn BlobStore>,
    registry: Arc<AssetRegistry>,
    refresher: Arc<Refresher>,
    account: Account,
}

impl CommandDispatcher {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<AssetRegistry>,
        refresher: Arc<Refresher>,
        account: Account,
    ) -> Self {
        Self {
            ledger,
            blobs,
            registry,
            refresher,
            account,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    /// Manual refresh, the same pipeline every successful command triggers.
    pub async fn refresh(&self) -> Result<()> {
        self.refresher.refresh().await
    }

    /// Current cached records, for the presentation layer.
    pub fn assets(&self) -> Vec<AssetRecord> {
        self.registry.snapshot()
    }

    // ── operations ─────────────────────────────────────────────────────

    /// List a token for sale. A price of `0` withdraws the offer.
    pub async fn set_sale_price(&self, token: &str, price_eth: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let price = Wei::from_eth_str(price_eth)?;
        self.ledger
            .set_sale_price(&self.account, id, price)
            .await?;
        info!("sale price for {} set to {} ETH", id, price);
        self.refresh_after("set-sale-price").await;
        Ok(())
    }

    /// Buy a listed token, paying its asking price.
    pub async fn confirm_purchase(&self, token: &str, price_eth: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let payment = Self::payment(price_eth)?;
        self.ledger
            .confirm_purchase(&self.account, id, payment)
            .await?;
        info!("purchased {} for {} ETH", id, payment);
        self.refresh_after("confirm-purchase").await;
        Ok(())
    }

    /// Advertise a token for rent. A price of `0` withdraws the offer.
    pub async fn set_rental_price(&self, token: &str, price_eth: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let price = Wei::from_eth_str(price_eth)?;
        self.ledger
            .set_rental_price(&self.account, id, price)
            .await?;
        info!("rental price for {} set to {} ETH", id, price);
        self.refresh_after("set-rental-price").await;
        Ok(())
    }

    pub async fn set_rental_duration(&self, token: &str, seconds: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let secs = seconds
            .trim()
            .parse::<u64>()
            .map_err(|_| MarketError::validation(format!("invalid duration {seconds:?}")))?;
        if secs == 0 {
            return Err(MarketError::validation("rental duration must be positive"));
        }
        self.ledger
            .set_rental_duration(&self.account, id, secs)
            .await?;
        info!("rental duration for {} set to {}s", id, secs);
        self.refresh_after("set-rental-duration").await;
        Ok(())
    }

    /// Rent a token, paying its advertised rental price.
    pub async fn confirm_rent(&self, token: &str, price_eth: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let payment = Self::payment(price_eth)?;
        self.ledger.confirm_rent(&self.account, id, payment).await?;
        info!("rented {} for {} ETH", id, payment);
        self.refresh_after("confirm-rent").await;
        Ok(())
    }

    pub async fn create_auction(&self, token: &str, seconds: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let secs = seconds
            .trim()
            .parse::<u64>()
            .map_err(|_| MarketError::validation(format!("invalid duration {seconds:?}")))?;
        if secs == 0 {
            return Err(MarketError::validation("auction duration must be positive"));
        }
        self.ledger
            .create_auction(&self.account, id, secs)
            .await?;
        info!("auction created for {} ({}s)", id, secs);
        self.refresh_after("create-auction").await;
        Ok(())
    }

    pub async fn place_bid(&self, token: &str, amount_eth: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let payment = Self::payment(amount_eth)?;
        self.ledger.place_bid(&self.account, id, payment).await?;
        info!("bid {} ETH on {}", payment, id);
        self.refresh_after("place-bid").await;
        Ok(())
    }

    pub async fn end_auction(&self, token: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        self.ledger.end_auction(&self.account, id).await?;
        info!("auction on {} ended", id);
        self.refresh_after("end-auction").await;
        Ok(())
    }

    /// Transfer a token to another account.
    ///
    /// Refused locally while the cached state says the token is rented or
    /// in auction, so the user gets an immediate rejection instead of a
    /// reverted transaction. The ledger remains the final enforcer.
    pub async fn transfer(&self, token: &str, to: &str) -> Result<()> {
        let id: TokenId = token.parse()?;
        let to = Account::parse(to)?;
        if let Some(state) = self.registry.state_of(id) {
            if state.blocks_transfer() {
                return Err(MarketError::invariant(format!(
                    "token {id} is {state} and cannot be transferred"
                )));
            }
        }
        self.ledger.transfer(&self.account, &to, id).await?;
        info!("transferred {} to {}", id, to);
        self.refresh_after("transfer").await;
        Ok(())
    }

    /// Mint a new asset.
    ///
    /// Strict ordering: upload the image, then the metadata document that
    /// embeds the image URI, and only then the ledger write that embeds the
    /// metadata URI. Any upload failure aborts before the ledger is touched.
    pub async fn create_asset(
        &self,
        name: &str,
        description: &str,
        image_filename: &str,
        image_bytes: Vec<u8>,
        attributes_json: &str,
    ) -> Result<TokenId> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() {
            return Err(MarketError::validation("asset name must not be empty"));
        }
        if description.is_empty() {
            return Err(MarketError::validation(
                "asset description must not be empty",
            ));
        }
        if image_bytes.is_empty() {
            return Err(MarketError::validation("image must not be empty"));
        }
        let attributes = Self::parse_attributes(attributes_json)?;

        let image_uri = self.blobs.upload_image(image_filename, image_bytes).await?;
        let document = MetadataDocument {
            name: name.to_string(),
            description: description.to_string(),
            image: image_uri,
            attributes: attributes.clone(),
        };
        let metadata_uri = self.blobs.upload_metadata(&document).await?;

        let trait_types: Vec<String> = attributes.iter().map(|a| a.trait_type.clone()).collect();
        let values: Vec<String> = attributes.iter().map(|a| a.value.clone()).collect();
        let id = self
            .ledger
            .create_asset_with_metadata(
                &self.account,
                name,
                description,
                &metadata_uri,
                &trait_types,
                &values,
            )
            .await?;
        info!("asset {} created with metadata {}", id, metadata_uri);
        self.refresh_after("create-asset").await;
        Ok(id)
    }

    /// Listen for the gateway's optional transfer notifications and turn
    /// each into an unsolicited refresh. Returns `None` when the gateway
    /// exposes no push channel; polling remains the baseline either way.
    pub fn spawn_transfer_listener(&self, shutdown: Arc<Notify>) -> Option<JoinHandle<()>> {
        let mut events = self.ledger.subscribe_transfers()?;
        let refresher = self.refresher.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    event = events.recv() => match event {
                        Ok(ev) => {
                            info!("token {} transferred, refreshing", ev.token_id);
                            if let Err(e) = refresher.refresh().await {
                                warn!("refresh after transfer event failed: {}", e);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("transfer events lagged by {}, refreshing once", n);
                            if let Err(e) = refresher.refresh().await {
                                warn!("refresh after transfer event failed: {}", e);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }))
    }

    // ── helpers ────────────────────────────────────────────────────────

    /// Payments must be actual amounts; zero is the "not offered" sentinel
    /// and can never be paid.
    fn payment(amount_eth: &str) -> Result<Wei> {
        let amount = Wei::from_eth_str(amount_eth)?;
        if amount.is_unset() {
            return Err(MarketError::validation("payment must be greater than zero"));
        }
        Ok(amount)
    }

    fn parse_attributes(json: &str) -> Result<Vec<TraitPair>> {
        let json = json.trim();
        if json.is_empty() {
            return Ok(Vec::new());
        }
        let input: AttributesInput = serde_json::from_str(json)
            .map_err(|e| MarketError::validation(format!("invalid attributes document: {e}")))?;
        Ok(input.attributes)
    }

    /// The command itself already succeeded on the ledger; a refresh fault
    /// only delays cache convergence, so it is logged rather than returned.
    async fn refresh_after(&self, op: &str) {
        if let Err(e) = self.refresher.refresh().await {
            warn!("refresh after {} failed: {}", op, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_document_parses_the_pasted_shape() {
        let attrs = CommandDispatcher::parse_attributes(
            r#"{"attributes": [{"traitType": "Size", "value": "100x100"}]}"#,
        )
        .unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].trait_type, "Size");
        assert_eq!(attrs[0].value, "100x100");
    }

    #[test]
    fn empty_attribute_document_means_no_attributes() {
        assert!(CommandDispatcher::parse_attributes("").unwrap().is_empty());
    }

    #[test]
    fn garbage_attribute_document_is_a_validation_error() {
        let err = CommandDispatcher::parse_attributes("not json").unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn zero_payment_is_rejected() {
        let err = CommandDispatcher::payment("0").unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }
}
