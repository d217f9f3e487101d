//! Identity boundary events.
//!
//! Authentication is an external collaborator; the cart only consumes a
//! "current identity or none" signal. The feed guarantees a subscriber
//! observes the current value immediately at subscription time, then every
//! subsequent change - consumers handle both cases identically, which the
//! synchronizer's idempotent [`on_identity_change`] makes safe.
//!
//! [`on_identity_change`]: crate::sync::CartSyncService::on_identity_change

use tokio::sync::watch;
use tracing::debug;

use copperleaf_core::UserId;

use crate::sync::CartSyncService;

/// Publisher side of the identity signal.
///
/// The auth layer holds one of these and calls [`set`](Self::set) on every
/// login/logout resolution, including the initial one.
pub struct IdentityFeed {
    tx: watch::Sender<Option<UserId>>,
}

impl IdentityFeed {
    /// Create a feed with the initially-resolved identity.
    #[must_use]
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Subscribe. The receiver observes the current value immediately.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }

    /// Publish a new resolution. Publishing the same identity twice is
    /// fine; subscribers treat it as a no-op.
    pub fn set(&self, user: Option<UserId>) {
        self.tx.send_replace(user);
    }
}

impl Default for IdentityFeed {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Drive a synchronizer from an identity subscription.
///
/// Feeds the current value first, then every change, until the feed is
/// dropped. Run this on a spawned task alongside the service.
pub async fn drive_identity(
    service: CartSyncService,
    mut receiver: watch::Receiver<Option<UserId>>,
) {
    loop {
        let current = receiver.borrow_and_update().clone();
        service.on_identity_change(current).await;

        if receiver.changed().await.is_err() {
            debug!("Identity feed closed; stopping identity watcher");
            return;
        }
    }
}
