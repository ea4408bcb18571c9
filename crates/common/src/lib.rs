//! # Tessera Common Crate
//!
//! Shared domain logic for the Tessera marketplace client.
//!
//! ## Modules
//! - `types`: token, account and asset record types
//! - `amount`: on-chain monetary amounts and ether conversion
//! - `state`: commercial-state normalization
//! - `error`: the common error contract
//! - `config`: configuration management
//!
//! Everything in this crate is pure: no async, no network, no clocks other
//! than the `unix_now` helper callers feed into the normalizer.

pub mod amount;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use amount::Wei;
pub use config::ClientConfig;
pub use error::MarketError;
pub use state::{normalize, rental_time_left, CommercialState};
pub use types::{Account, AssetInfo, AssetRecord, RawAssetFields, TokenId, TraitPair};

pub type Result<T> = std::result::Result<T, MarketError>;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
