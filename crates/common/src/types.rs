//! Core identity and record types for marketplace assets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Wei;
use crate::error::MarketError;
use crate::state::CommercialState;

/// Opaque token identifier assigned by the ledger. Immutable once minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TokenId)
            .map_err(|_| MarketError::validation(format!("invalid token id {s:?}")))
    }
}

/// An on-chain account address: `0x` followed by 40 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    /// Parse and validate a user-supplied address.
    pub fn parse(s: &str) -> Result<Account, MarketError> {
        let s = s.trim();
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| MarketError::validation(format!("address {s:?} must start with 0x")))?;
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MarketError::validation(format!(
                "address {s:?} must be 0x followed by 40 hex characters"
            )));
        }
        Ok(Account(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One attribute of an asset. Field names follow the metadata document
/// format the blob store serves to wallets and galleries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitPair {
    #[serde(rename = "traitType")]
    pub trait_type: String,
    pub value: String,
}

/// Descriptive fields stored on the ledger for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub name: String,
    pub description: String,
    pub metadata_uri: String,
}

/// The raw per-token commercial fields as the ledger reports them.
///
/// The ledger only partially enforces mutual exclusivity between these
/// fields; transient reports may carry several non-default values at once.
/// [`crate::state::normalize`] collapses them into one commercial state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawAssetFields {
    pub sale_price: Wei,
    pub rental_price: Wei,
    pub rental_duration_secs: u64,
    pub is_rented: bool,
    pub renter: Option<Account>,
    pub rental_end_time: u64,
    pub auction_active: bool,
    pub auction_end_time: u64,
    pub high_bid: Option<Wei>,
}

/// One cache entry owned by the asset registry.
///
/// Records are replaced wholesale on every refresh cycle. The only field
/// mutated in place between refreshes is `time_left_secs`, decremented once
/// per second by the expiry monitor so the countdown stays smooth without a
/// per-second ledger round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub token_id: TokenId,
    pub info: AssetInfo,
    pub attributes: Vec<TraitPair>,
    pub state: CommercialState,
    pub time_left_secs: u64,
    pub last_synced_at: u64,
    /// Set when a lapsed rental could not be finalized against the ledger
    /// during the fetch; the values are best-effort until the next refresh.
    pub stale: bool,
}
