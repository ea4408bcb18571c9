//! Client configuration loaded from a TOML file or environment variables.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::MarketError;
use crate::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Base URL of the ledger node's HTTP RPC facade.
    pub ledger_url: Option<String>,

    /// Base URL of the off-chain blob/metadata store.
    pub blob_url: Option<String>,

    /// Connected account (0x + 40 hex chars) that signs every write.
    pub account: Option<String>,

    /// Request timeout for remote calls, milliseconds.
    pub timeout_ms: Option<u64>,

    /// Use the in-memory mock ledger and blob store instead of remote ones.
    pub use_mock: Option<bool>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ledger_url: Some("http://127.0.0.1:8545".to_string()),
            blob_url: Some("http://127.0.0.1:3001".to_string()),
            account: None,
            timeout_ms: Some(10_000),
            use_mock: Some(false),
        }
    }
}

/// Load config from a TOML file path.
/// If the file is missing or fails to parse, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)
        .map_err(|e| MarketError::validation(format!("config {}: {}", p.display(), e)))?;
    let cfg: ClientConfig = toml::from_str(&s)
        .map_err(|e| MarketError::validation(format!("config {}: {}", p.display(), e)))?;
    Ok(cfg)
}

/// Build config from `TESSERA_*` environment variables, falling back to
/// defaults for anything unset.
///
/// - `TESSERA_LEDGER_URL`
/// - `TESSERA_BLOB_URL`
/// - `TESSERA_ACCOUNT`
/// - `TESSERA_TIMEOUT_MS`
/// - `TESSERA_USE_MOCK` ("1" or "true")
pub fn from_env() -> ClientConfig {
    let def = ClientConfig::default();
    ClientConfig {
        ledger_url: env::var("TESSERA_LEDGER_URL").ok().or(def.ledger_url),
        blob_url: env::var("TESSERA_BLOB_URL").ok().or(def.blob_url),
        account: env::var("TESSERA_ACCOUNT").ok().or(def.account),
        timeout_ms: env::var("TESSERA_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(def.timeout_ms),
        use_mock: env::var("TESSERA_USE_MOCK")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .or(def.use_mock),
    }
}
