//! # Tessera Client Crate
//!
//! The asset-lifecycle reconciliation engine: keeps a client-local view of
//! every asset's commercial state consistent with the remote ledger, which
//! is queried asynchronously and guarantees no push notifications.
//!
//! ## Modules
//! - `ledger`: typed gateway trait over the ledger contract + HTTP impl
//! - `blobs`: off-chain image/metadata store client
//! - `mock`: in-memory ledger and blob store for tests and mock mode
//! - `fetcher`: per-asset snapshot assembly tolerating partial failure
//! - `registry`: the authoritative client-side cache of asset records
//! - `refresh`: at-most-one-in-flight refresh coalescing
//! - `monitor`: the 1-second rental countdown worker
//! - `dispatcher`: validated state-changing commands
//!
//! ## Data flow
//! ```text
//! dispatcher ──write──▶ ledger
//!      │ on success
//!      ▼
//! refresher ──▶ fetcher ──▶ normalize ──▶ registry ──▶ presentation
//!      ▲
//! monitor (1s tick, countdown only)
//! ```

pub mod blobs;
pub mod dispatcher;
pub mod fetcher;
pub mod ledger;
pub mod mock;
pub mod monitor;
pub mod refresh;
pub mod registry;

pub use blobs::{BlobStore, HttpBlobStore, MetadataDocument};
pub use dispatcher::CommandDispatcher;
pub use fetcher::SnapshotFetcher;
pub use ledger::{HttpLedger, Ledger, TransferEvent};
pub use mock::{MockBlobStore, MockLedger, MockToken};
pub use monitor::RentalExpiryMonitor;
pub use refresh::Refresher;
pub use registry::AssetRegistry;
