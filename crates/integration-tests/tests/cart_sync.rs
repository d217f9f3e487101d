//! End-to-end scenarios for the cart synchronizer.
//!
//! All tests run on tokio's paused clock, so debounce windows elapse
//! deterministically and instantly.

use std::sync::Arc;
use std::time::Duration;

use copperleaf_cart::store::{LocalCartStore, MemoryStore};
use copperleaf_cart::sync::CartSyncService;
use copperleaf_core::{ShippingPolicy, UserId};
use copperleaf_integration_tests::{
    RecordingRemoteStore, RemoteCall, init_test_logging, line, snapshot,
};

const DEBOUNCE: Duration = Duration::from_millis(1000);

fn build_service(
    local: Arc<MemoryStore>,
    remote: Arc<RecordingRemoteStore>,
) -> CartSyncService {
    init_test_logging();
    CartSyncService::new(local, remote, ShippingPolicy::default(), DEBOUNCE)
}

/// Let spawned flush tasks (including immediate ones) run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_remote_wins_over_local_on_sign_in() {
    let local = Arc::new(MemoryStore::seeded(vec![line("p1", "5.00", 1, "red")]));
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");
    remote.seed(&user, &[line("p2", "8.00", 1, "blue")]);

    let service = build_service(local.clone(), remote.clone());
    service.on_identity_change(Some(user)).await;

    let lines = service.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, "p2");

    // Local slot is overwritten to match the remote winner.
    let local_lines = local.load();
    assert_eq!(local_lines.len(), 1);
    assert_eq!(local_lines[0].product_id, "p2");
}

#[tokio::test(start_paused = true)]
async fn test_local_seeds_when_remote_has_no_record() {
    let local = Arc::new(MemoryStore::seeded(vec![line("p1", "5.00", 1, "red")]));
    let remote = Arc::new(RecordingRemoteStore::new());

    let service = build_service(local, remote.clone());
    service.on_identity_change(Some(UserId::new("u1"))).await;

    assert_eq!(service.lines()[0].product_id, "p1");
    // The initial load itself never writes remote; the local cart is only
    // the seed for the first mutation-driven flush.
    assert_eq!(remote.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_preserves_device_cart() {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemoteStore::new());
    let alice = UserId::new("alice");
    remote.seed(&alice, &[line("p1", "5.00", 1, "Default")]);

    let service = build_service(local, remote.clone());

    // Sign in: remote cart lands on the device.
    service.on_identity_change(Some(alice)).await;
    assert_eq!(service.lines()[0].product_id, "p1");

    // Sign out: the device keeps its cart.
    service.on_identity_change(None).await;
    assert_eq!(service.lines()[0].product_id, "p1");

    // A different user with an empty remote cart inherits the device cart.
    service.on_identity_change(Some(UserId::new("bob"))).await;
    let lines = service.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, "p1");
    assert_eq!(lines[0].quantity, 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_mutations_into_one_write() {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");

    let service = build_service(local, remote.clone());
    service.on_identity_change(Some(user.clone())).await;

    // Three mutations inside one debounce window.
    service.add_item(snapshot("p1", "10.00"), 1, "red").unwrap();
    service.add_item(snapshot("p2", "4.00"), 2, "blue").unwrap();
    service.update_quantity("p1", 5).unwrap();

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;

    // Exactly one remote write, carrying the state after the third mutation.
    assert_eq!(remote.write_count(), 1);
    let stored = remote.stored_lines(&user);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].product_id, "p1");
    assert_eq!(stored[0].quantity, 5);
    assert_eq!(stored[1].product_id, "p2");
    assert_eq!(stored[1].quantity, 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_flush_creates_then_later_flushes_update() {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");

    let service = build_service(local, remote.clone());
    service.on_identity_change(Some(user.clone())).await;

    service.add_item(snapshot("p1", "10.00"), 1, "red").unwrap();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;

    service.add_item(snapshot("p2", "4.00"), 1, "red").unwrap();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;

    let writes: Vec<_> = remote
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RemoteCall::Create(_) | RemoteCall::Update(_)))
        .collect();
    assert_eq!(writes.len(), 2);
    assert!(matches!(writes[0], RemoteCall::Create(_)));
    assert!(matches!(writes[1], RemoteCall::Update(_)));
    assert_eq!(remote.stored_lines(&user).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_initial_load_is_discarded() {
    let local = Arc::new(MemoryStore::seeded(vec![line("p1", "5.00", 1, "red")]));
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");
    remote.seed(&user, &[line("p9", "99.00", 1, "red")]);
    remote.delay_fetches(Duration::from_millis(500));

    let service = build_service(local, remote);

    // Sign-in starts a load that parks on the slow fetch...
    let in_flight = {
        let service = service.clone();
        tokio::spawn(async move { service.on_identity_change(Some(user)).await })
    };
    tokio::task::yield_now().await;

    // ...and the user signs out before it lands.
    service.on_identity_change(None).await;
    in_flight.await.expect("load task panicked");

    // The stale remote result must not clobber the guest cart.
    let lines = service.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, "p1");
}

#[tokio::test(start_paused = true)]
async fn test_remote_fetch_failure_falls_back_to_local() {
    let local = Arc::new(MemoryStore::seeded(vec![line("p1", "5.00", 2, "red")]));
    let remote = Arc::new(RecordingRemoteStore::new());
    remote.fail_fetches(true);

    let service = build_service(local, remote);
    service.on_identity_change(Some(UserId::new("u1"))).await;

    // Local cart is served; the failure is surfaced as a warning, not an error.
    let lines = service.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 2);
    assert!(service.last_sync_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_remote_write_failure_is_soft_and_recovers() {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");

    let service = build_service(local.clone(), remote.clone());
    service.on_identity_change(Some(user.clone())).await;

    remote.fail_writes(true);
    service.add_item(snapshot("p1", "10.00"), 1, "red").unwrap();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;

    // The mutation already succeeded locally and is not rolled back.
    assert_eq!(service.lines().len(), 1);
    assert_eq!(local.load().len(), 1);
    assert!(service.last_sync_error().is_some());

    // The next successful flush clears the warning.
    remote.fail_writes(false);
    service.add_item(snapshot("p2", "4.00"), 1, "red").unwrap();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;

    assert!(service.last_sync_error().is_none());
    assert_eq!(remote.stored_lines(&user).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cart_replaces_remote_with_empty() {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(RecordingRemoteStore::new());
    let user = UserId::new("u1");
    remote.seed(&user, &[line("p1", "5.00", 2, "red")]);

    let service = build_service(local.clone(), remote.clone());
    service.on_identity_change(Some(user.clone())).await;
    assert_eq!(service.lines().len(), 1);

    service.clear_cart();
    settle().await;

    assert!(service.lines().is_empty());
    assert!(local.load().is_empty());
    assert!(remote.stored_lines(&user).is_empty());
}
