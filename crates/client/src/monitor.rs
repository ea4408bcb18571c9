//! Background worker that keeps rental countdowns ticking.
//!
//! One fixed 1-second timer for the whole registry. Each tick decrements
//! the cached countdowns purely client-side; the tick itself never touches
//! the ledger and never suspends. When a countdown reaches zero the monitor
//! requests a coalesced refresh on a detached task, and the fetch pipeline
//! performs the authoritative finalize. The monitor never rewrites
//! commercial state on its own, so the display and the ledger can never
//! silently diverge for more than one refresh interval.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::refresh::Refresher;
use crate::registry::AssetRegistry;

pub struct RentalExpiryMonitor {
    registry: Arc<AssetRegistry>,
    refresher: Arc<Refresher>,
    shutdown: Arc<Notify>,
}

impl RentalExpiryMonitor {
    pub fn new(
        registry: Arc<AssetRegistry>,
        refresher: Arc<Refresher>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            refresher,
            shutdown,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("rental expiry monitor started: ticking every 1s");
            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        info!("rental expiry monitor shutting down");
                        break;
                    }
                    _ = sleep(Duration::from_secs(1)) => {
                        let expired = self.registry.tick_rentals();
                        if expired > 0 {
                            debug!("{} rental(s) reached zero, requesting refresh", expired);
                            let refresher = self.refresher.clone();
                            tokio::spawn(async move {
                                if let Err(e) = refresher.refresh().await {
                                    warn!("post-expiry refresh failed: {}", e);
                                }
                            });
                        }
                    }
                }
            }
        })
    }
}
