//! Refresh coalescing: at most one refresh in flight.
//!
//! A refresh that arrives while another is running does not start a second
//! fetch pipeline; it marks the running one for a rerun and waits for it to
//! finish. The rerun re-reads the ledger after the joining caller's request,
//! so every caller observes a cache at least as fresh as the ledger was when
//! they asked, and overlapping requests never replace the registry out of
//! order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use tessera_common::{Account, Result};

use crate::fetcher::SnapshotFetcher;
use crate::registry::AssetRegistry;

#[derive(Default)]
struct Gate {
    busy: bool,
    rerun: bool,
}

/// Drives the fetch→normalize→store pipeline with overlap coalescing.
pub struct Refresher {
    fetcher: SnapshotFetcher,
    registry: Arc<AssetRegistry>,
    account: Account,
    gate: Mutex<Gate>,
    done: Notify,
}

impl Refresher {
    pub fn new(fetcher: SnapshotFetcher, registry: Arc<AssetRegistry>, account: Account) -> Self {
        Refresher {
            fetcher,
            registry,
            account,
            gate: Mutex::new(Gate::default()),
            done: Notify::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    /// Refresh the registry from the ledger, coalescing with any refresh
    /// already in flight.
    ///
    /// The caller that starts a cycle gets its result; callers that join a
    /// running cycle are woken when it (and the rerun they triggered)
    /// completes, and read the outcome from the registry. A failed cycle
    /// leaves the registry exactly as it was.
    pub async fn refresh(&self) -> Result<()> {
        // Register interest before looking at the gate: the running cycle
        // only notifies after clearing `busy` under the same lock, so a
        // waiter that saw `busy == true` cannot miss its wakeup.
        let mut waiter = std::pin::pin!(self.done.notified());
        waiter.as_mut().enable();

        let runs_here = {
            let mut gate = self.gate.lock();
            if gate.busy {
                gate.rerun = true;
                false
            } else {
                gate.busy = true;
                true
            }
        };

        if !runs_here {
            debug!("refresh already in flight, joining");
            waiter.await;
            return Ok(());
        }
        self.drive().await
    }

    async fn drive(&self) -> Result<()> {
        let mut result = self.run_once().await;
        loop {
            let again = {
                let mut gate = self.gate.lock();
                if gate.rerun {
                    gate.rerun = false;
                    true
                } else {
                    gate.busy = false;
                    false
                }
            };
            if !again {
                break;
            }
            debug!("rerunning coalesced refresh");
            result = self.run_once().await;
        }
        self.done.notify_waiters();
        result
    }

    /// One fetch→store cycle. The registry is touched only on success, as
    /// one atomic replacement.
    async fn run_once(&self) -> Result<()> {
        let records = self.fetcher.fetch_owned(&self.account).await?;
        self.registry.replace_all(records);
        Ok(())
    }
}
