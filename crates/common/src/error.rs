//! The common error contract for marketplace operations.
//!
//! Every failure a caller can observe maps to exactly one of these kinds,
//! so the presentation layer can distinguish a bad input from a remote
//! fault without string matching.

use thiserror::Error;

use crate::types::TokenId;

/// Errors produced by the marketplace client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    /// Bad or missing input, caught before any remote call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ledger read or write failed: network fault, rejected transaction,
    /// or node desync. Aborts only the operation that triggered it.
    #[error("ledger gateway: {0}")]
    Gateway(String),

    /// One token's field set failed during a multi-asset refresh. Non-fatal:
    /// the token is dropped from this cycle's results and the refresh still
    /// succeeds with fewer records.
    #[error("incomplete fetch for token {token}: {reason}")]
    PartialFetch { token: TokenId, reason: String },

    /// An off-chain upload failed before the ledger write was attempted.
    #[error("upload failed: {0}")]
    Upload(String),

    /// A locally detected illegal transition, rejected before any remote
    /// call. The ledger remains the final enforcer.
    #[error("blocked by local invariant: {0}")]
    Invariant(String),
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    pub fn gateway(msg: impl std::fmt::Display) -> Self {
        MarketError::Gateway(msg.to_string())
    }

    pub fn upload(msg: impl std::fmt::Display) -> Self {
        MarketError::Upload(msg.to_string())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        MarketError::Invariant(msg.into())
    }

    pub fn partial(token: TokenId, reason: impl std::fmt::Display) -> Self {
        MarketError::PartialFetch {
            token,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_distinguishable() {
        let kinds = [
            MarketError::validation("x").to_string(),
            MarketError::gateway("x").to_string(),
            MarketError::partial(TokenId(3), "x").to_string(),
            MarketError::upload("x").to_string(),
            MarketError::invariant("x").to_string(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
