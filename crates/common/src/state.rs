//! Commercial-state normalization.
//!
//! The ledger stores sale, rental and auction fields independently and only
//! partially enforces their mutual exclusivity; a transient read may report
//! several of them as non-default at once. [`normalize`] collapses any raw
//! field combination into exactly one [`CommercialState`], so illegal
//! combinations are unrepresentable in the cache even when the ledger
//! momentarily reports them.
//!
//! Priority when several raw flags are simultaneously non-default:
//!
//! ```text
//! Rented > InAuction > ForRent > ForSale > Idle
//! ```
//!
//! A rented flag whose remaining time is zero does NOT produce `Rented`:
//! the rental has lapsed and the fetch pipeline finalizes it against the
//! ledger before the record reaches the cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::Wei;
use crate::types::{Account, RawAssetFields};

/// The single commercial state of one asset, derived, never stored on the
/// ledger as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommercialState {
    Idle,
    ForSale {
        price: Wei,
    },
    ForRent {
        price: Wei,
        duration_secs: u64,
    },
    Rented {
        renter: Account,
        end_time: u64,
    },
    InAuction {
        end_time: u64,
        high_bid: Option<Wei>,
    },
}

impl CommercialState {
    /// Rented and in-auction assets are non-transferable; the client blocks
    /// transfer commands for them before any ledger contact.
    pub fn blocks_transfer(&self) -> bool {
        matches!(
            self,
            CommercialState::Rented { .. } | CommercialState::InAuction { .. }
        )
    }
}

impl fmt::Display for CommercialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommercialState::Idle => f.write_str("idle"),
            CommercialState::ForSale { price } => write!(f, "for sale at {price} ETH"),
            CommercialState::ForRent {
                price,
                duration_secs,
            } => write!(f, "for rent at {price} ETH per {duration_secs}s"),
            CommercialState::Rented { renter, .. } => write!(f, "rented by {renter}"),
            CommercialState::InAuction { high_bid, .. } => match high_bid {
                Some(bid) => write!(f, "in auction, high bid {bid} ETH"),
                None => f.write_str("in auction, no bids"),
            },
        }
    }
}

/// Seconds of rental remaining at `now`, floored at zero.
pub fn rental_time_left(end_time: u64, now: u64) -> u64 {
    end_time.saturating_sub(now)
}

/// Collapse raw ledger fields into exactly one commercial state.
///
/// Pure: identical inputs always yield identical results.
pub fn normalize(raw: &RawAssetFields, now: u64) -> CommercialState {
    if raw.is_rented && rental_time_left(raw.rental_end_time, now) > 0 {
        // A rented flag without a renter is a transient ledger report;
        // treat it like the other expired combinations and fall through.
        if let Some(renter) = &raw.renter {
            return CommercialState::Rented {
                renter: renter.clone(),
                end_time: raw.rental_end_time,
            };
        }
    }
    if raw.auction_active {
        return CommercialState::InAuction {
            end_time: raw.auction_end_time,
            high_bid: raw.high_bid.filter(|bid| !bid.is_unset()),
        };
    }
    if !raw.rental_price.is_unset() {
        return CommercialState::ForRent {
            price: raw.rental_price,
            duration_secs: raw.rental_duration_secs,
        };
    }
    if !raw.sale_price.is_unset() {
        return CommercialState::ForSale {
            price: raw.sale_price,
        };
    }
    CommercialState::Idle
}
