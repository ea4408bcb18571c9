//! Integration tests for the reconciliation pipeline, driven end to end
//! through the mock ledger and blob store.
//!
//! Covered here:
//! - command → write → refresh → normalized registry state
//! - rent → countdown → finalize on the next refresh
//! - fetch-time finalize of lapsed rentals (and the stale fallback)
//! - partial fetch dropping only the failed token
//! - the client-side transfer guard
//! - refresh coalescing under concurrent callers
//! - the expiry monitor's tick/refresh/shutdown lifecycle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use tessera_client::{
    AssetRegistry, BlobStore, CommandDispatcher, Ledger, MockBlobStore, MockLedger, MockToken,
    Refresher, RentalExpiryMonitor, SnapshotFetcher,
};
use tessera_common::{
    unix_now, Account, AssetInfo, AssetRecord, CommercialState, MarketError, TokenId, Wei,
};

// ── helpers ────────────────────────────────────────────────────────────

fn acct(tag: u8) -> Account {
    Account::parse(&format!("0x{:040x}", tag)).unwrap()
}

const ETH: u128 = 1_000_000_000_000_000_000;

struct Harness {
    ledger: Arc<MockLedger>,
    blobs: Arc<MockBlobStore>,
    registry: Arc<AssetRegistry>,
    refresher: Arc<Refresher>,
    dispatcher: CommandDispatcher,
}

fn harness_on(ledger: Arc<MockLedger>, account: &Account) -> Harness {
    let blobs = Arc::new(MockBlobStore::new());
    let registry = Arc::new(AssetRegistry::new());
    let ledger_dyn: Arc<dyn Ledger> = ledger.clone();
    let blobs_dyn: Arc<dyn BlobStore> = blobs.clone();
    let fetcher = SnapshotFetcher::new(ledger_dyn.clone());
    let refresher = Arc::new(Refresher::new(fetcher, registry.clone(), account.clone()));
    let dispatcher = CommandDispatcher::new(
        ledger_dyn,
        blobs_dyn,
        registry.clone(),
        refresher.clone(),
        account.clone(),
    );
    Harness {
        ledger,
        blobs,
        registry,
        refresher,
        dispatcher,
    }
}

fn harness(account: &Account) -> Harness {
    harness_on(Arc::new(MockLedger::new()), account)
}

fn rented_record(id: u64, renter: Account, time_left: u64) -> AssetRecord {
    AssetRecord {
        token_id: TokenId(id),
        info: AssetInfo {
            name: format!("asset {id}"),
            description: String::new(),
            metadata_uri: String::new(),
        },
        attributes: Vec::new(),
        state: CommercialState::Rented {
            renter,
            end_time: 0,
        },
        time_left_secs: time_left,
        last_synced_at: 0,
        stale: false,
    }
}

// ── sale flow ──────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_a_token_for_sale_shows_in_the_registry() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot 7"));

    h.dispatcher
        .set_sale_price(&id.to_string(), "1.5")
        .await
        .unwrap();

    let record = h.registry.get(id).expect("record present after refresh");
    assert_eq!(
        record.state,
        CommercialState::ForSale {
            price: Wei(3 * ETH / 2),
        }
    );
    assert!(!record.stale);
}

#[tokio::test]
async fn a_bad_amount_never_reaches_the_ledger() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot"));

    let err = h
        .dispatcher
        .set_sale_price(&id.to_string(), "1,5")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Validation(_)));
    assert!(h.ledger.write_log().is_empty());
}

// ── rental flow ────────────────────────────────────────────────────────

#[tokio::test]
async fn rent_then_countdown_then_finalize_on_next_refresh() {
    let owner = acct(1);
    let renter = acct(2);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken {
        rental_price: Wei(ETH / 10),
        rental_duration_secs: 3600,
        ..MockToken::bare(owner.clone(), "plot 12")
    });

    // the renter confirms from their own session against the same ledger
    let renter_side = harness_on(h.ledger.clone(), &renter);
    renter_side
        .dispatcher
        .confirm_rent(&id.to_string(), "0.1")
        .await
        .unwrap();

    // the owner's refresh now reports the rental
    h.dispatcher.refresh().await.unwrap();
    let record = h.registry.get(id).unwrap();
    assert_eq!(
        record.state,
        CommercialState::Rented {
            renter: renter.clone(),
            end_time: h.ledger.token(id).unwrap().rental_end_time,
        }
    );
    assert!((3598..=3600).contains(&record.time_left_secs));

    // local countdown: exactly N decrements across N ticks, floored at 0
    let before = h.registry.get(id).unwrap().time_left_secs;
    for _ in 0..10 {
        h.registry.tick_rentals();
    }
    assert_eq!(h.registry.get(id).unwrap().time_left_secs, before - 10);
    for _ in 0..5000 {
        h.registry.tick_rentals();
    }
    assert_eq!(h.registry.get(id).unwrap().time_left_secs, 0);

    // once the ledger clock passes the end time, the next refresh finalizes
    h.ledger.modify(id, |t| t.rental_end_time = unix_now() - 1);
    h.dispatcher.refresh().await.unwrap();
    let record = h.registry.get(id).unwrap();
    assert_eq!(record.state, CommercialState::Idle);
    assert!(h.ledger.write_log().contains(&"end_rental".to_string()));
    assert!(h.ledger.token(id).unwrap().renter.is_none());
}

#[tokio::test]
async fn lapsed_rental_is_finalized_at_fetch_time() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken {
        renter: Some(acct(2)),
        rental_end_time: unix_now() - 1,
        rental_price: Wei(ETH / 10),
        rental_duration_secs: 60,
        ..MockToken::bare(owner.clone(), "plot")
    });

    h.refresher.refresh().await.unwrap();

    let record = h.registry.get(id).unwrap();
    assert!(!matches!(record.state, CommercialState::Rented { .. }));
    assert!(!record.stale);
    assert!(h.ledger.write_log().contains(&"end_rental".to_string()));
}

#[tokio::test]
async fn failed_finalize_returns_a_stale_best_effort_record() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken {
        renter: Some(acct(2)),
        rental_end_time: unix_now() - 1,
        rental_price: Wei(ETH / 10),
        rental_duration_secs: 60,
        ..MockToken::bare(owner.clone(), "plot")
    });
    h.ledger.fail_write("end_rental", id.0);

    h.refresher.refresh().await.unwrap();

    let record = h.registry.get(id).unwrap();
    assert!(record.stale);
    // never presented as an active rental, even best-effort
    assert!(!matches!(record.state, CommercialState::Rented { .. }));
}

// ── partial fetch ──────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_token_is_dropped_without_failing_the_refresh() {
    let owner = acct(1);
    let h = harness(&owner);
    let t1 = h.ledger.insert(MockToken::bare(owner.clone(), "one"));
    let t2 = h.ledger.insert(MockToken::bare(owner.clone(), "two"));
    let t3 = h.ledger.insert(MockToken::bare(owner.clone(), "three"));
    let t4 = h.ledger.insert(MockToken::bare(owner.clone(), "four"));
    h.ledger.fail_read("attributes", t3.0);

    h.refresher.refresh().await.unwrap();

    let ids: Vec<TokenId> = h.registry.snapshot().iter().map(|r| r.token_id).collect();
    assert_eq!(ids, vec![t1, t2, t4]);
    assert!(h.registry.get(t3).is_none());
}

#[tokio::test]
async fn a_failed_listing_fails_the_refresh_and_keeps_the_old_snapshot() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot"));
    h.refresher.refresh().await.unwrap();
    assert_eq!(h.registry.len(), 1);

    h.ledger.fail_read("tokens_by_owner", 0);
    let err = h.refresher.refresh().await.unwrap_err();
    assert!(matches!(err, MarketError::Gateway(_)));

    // cache untouched by the failed cycle
    assert_eq!(h.registry.get(id).unwrap().info.name, "plot");
}

// ── transfer guard ─────────────────────────────────────────────────────

#[tokio::test]
async fn transferring_a_rented_token_is_refused_before_the_ledger() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken {
        renter: Some(acct(2)),
        rental_end_time: unix_now() + 600,
        ..MockToken::bare(owner.clone(), "plot")
    });
    h.refresher.refresh().await.unwrap();

    let err = h
        .dispatcher
        .transfer(&id.to_string(), acct(3).as_str())
        .await
        .unwrap_err();

    assert!(matches!(err, MarketError::Invariant(_)));
    assert!(h.ledger.write_log().is_empty());
    assert_eq!(h.ledger.token(id).unwrap().owner, owner);
}

#[tokio::test]
async fn transferring_a_token_in_auction_is_refused_before_the_ledger() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot"));
    h.ledger.create_auction(&owner, id, 600).await.unwrap();
    let writes_before = h.ledger.write_log().len();
    h.refresher.refresh().await.unwrap();

    let err = h
        .dispatcher
        .transfer(&id.to_string(), acct(3).as_str())
        .await
        .unwrap_err();

    assert!(matches!(err, MarketError::Invariant(_)));
    assert_eq!(h.ledger.write_log().len(), writes_before);
}

#[tokio::test]
async fn idle_tokens_transfer_normally() {
    let owner = acct(1);
    let recipient = acct(3);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot"));
    h.refresher.refresh().await.unwrap();

    h.dispatcher
        .transfer(&id.to_string(), recipient.as_str())
        .await
        .unwrap();

    assert_eq!(h.ledger.token(id).unwrap().owner, recipient);
    // the follow-up refresh no longer lists the token for the old owner
    assert!(h.registry.get(id).is_none());
}

// ── asset creation ─────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_upload_failure_aborts_before_any_ledger_write() {
    let owner = acct(1);
    let h = harness(&owner);
    h.blobs.fail_metadata_uploads();

    let err = h
        .dispatcher
        .create_asset(
            "plot 9",
            "corner plot",
            "plot9.png",
            vec![0xaa; 64],
            r#"{"attributes": [{"traitType": "Size", "value": "100x100"}]}"#,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MarketError::Upload(_)));
    assert_eq!(h.blobs.image_count(), 1);
    assert!(h.ledger.write_log().is_empty());
}

#[tokio::test]
async fn created_assets_embed_the_uploaded_metadata() {
    let owner = acct(1);
    let h = harness(&owner);

    let id = h
        .dispatcher
        .create_asset(
            "plot 9",
            "corner plot",
            "plot9.png",
            vec![0xaa; 64],
            r#"{"attributes": [{"traitType": "Size", "value": "100x100"}]}"#,
        )
        .await
        .unwrap();

    // upload ordering: image before metadata, metadata before the mint
    let docs = h.blobs.metadata_log();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].image, "mock://images/1");

    let token = h.ledger.token(id).unwrap();
    assert_eq!(token.info.metadata_uri, "mock://metadata/1");
    assert_eq!(token.attributes.len(), 1);

    // and the refresh already shows the new asset
    let record = h.registry.get(id).unwrap();
    assert_eq!(record.info.name, "plot 9");
    assert_eq!(record.state, CommercialState::Idle);
}

// ── coalescing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn overlapping_refreshes_coalesce_into_one_rerun() {
    let owner = acct(1);
    let h = harness(&owner);
    h.ledger.insert(MockToken::bare(owner.clone(), "plot"));
    h.ledger.set_read_latency_ms(50);

    let first = {
        let refresher = h.refresher.clone();
        tokio::spawn(async move { refresher.refresh().await })
    };
    // let the first cycle take the gate before the joiners arrive
    tokio::time::sleep(Duration::from_millis(10)).await;
    let (second, third) = tokio::join!(h.refresher.refresh(), h.refresher.refresh());
    first.await.unwrap().unwrap();
    second.unwrap();
    third.unwrap();

    // one initial cycle plus one coalesced rerun, not three cycles
    assert_eq!(h.ledger.count_reads("tokens_by_owner"), 2);
}

// ── expiry monitor ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn monitor_ticks_down_and_finalizes_through_a_refresh() {
    let owner = acct(1);
    let h = harness(&owner);
    let renter = acct(2);
    // ledger-side the rental has already lapsed; the cache still counts down
    let id = h.ledger.insert(MockToken {
        renter: Some(renter.clone()),
        rental_end_time: unix_now().saturating_sub(1),
        rental_price: Wei(ETH / 10),
        rental_duration_secs: 60,
        ..MockToken::bare(owner.clone(), "plot")
    });
    h.registry
        .replace_all(vec![rented_record(id.0, renter, 2)]);

    let shutdown = Arc::new(Notify::new());
    let monitor = Arc::new(RentalExpiryMonitor::new(
        h.registry.clone(),
        h.refresher.clone(),
        shutdown.clone(),
    ));
    let handle = monitor.start();

    // two virtual seconds: countdown 2 → 1 → 0, then the detached refresh
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.ledger.write_log().contains(&"end_rental".to_string()));
    let record = h.registry.get(id).unwrap();
    assert!(!matches!(record.state, CommercialState::Rented { .. }));

    // clean cancellation: the worker task ends without being aborted
    shutdown.notify_one();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn monitor_shutdown_does_not_leak_the_timer() {
    let owner = acct(1);
    let h = harness(&owner);
    let shutdown = Arc::new(Notify::new());
    let monitor = Arc::new(RentalExpiryMonitor::new(
        h.registry.clone(),
        h.refresher.clone(),
        shutdown.clone(),
    ));
    let handle = monitor.start();

    shutdown.notify_one();
    handle.await.unwrap();
}

// ── transfer events ────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_events_trigger_an_unsolicited_refresh() {
    let owner = acct(1);
    let h = harness(&owner);
    let id = h.ledger.insert(MockToken::bare(owner.clone(), "plot"));
    h.refresher.refresh().await.unwrap();
    assert_eq!(h.registry.len(), 1);

    let shutdown = Arc::new(Notify::new());
    let listener = h
        .dispatcher
        .spawn_transfer_listener(shutdown.clone())
        .expect("mock ledger exposes the event channel");

    // the token leaves this account from some other session
    h.ledger.transfer(&owner, &acct(3), id).await.unwrap();

    let mut gone = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if h.registry.is_empty() {
            gone = true;
            break;
        }
    }
    assert!(gone, "registry should drop the transferred token");

    shutdown.notify_one();
    listener.await.unwrap();
}
