//! Cart synchronizer - the core state machine.
//!
//! Owns the authoritative in-memory cart and keeps the two durable tiers
//! (device-local slot, per-user remote record) consistent with it:
//!
//! - **Initial load** runs once per identity resolution and merges the
//!   tiers: a non-empty remote cart wins (the server is the cross-device
//!   source of truth once it has content), otherwise the local cart seeds
//!   the first remote write.
//! - **Write-back** runs after every mutation: re-validate, save locally,
//!   and schedule a debounced remote flush that sends the full cart as it
//!   stands when the timer fires - mutations inside the window coalesce
//!   into one write.
//! - **Identity transitions** re-run the initial load. Sign-out keeps the
//!   device cart; only the identity flag changes.
//!
//! Mutations are synchronous on the in-memory cart and must be called from
//! within a tokio runtime (the flush timer is a spawned task). The state
//! mutex is never held across an await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use copperleaf_core::{
    CartLine, CartTotals, OrderId, ProductSnapshot, ShippingPolicy, UserId, compute_totals,
    dedupe_lines, item_count,
};

use crate::error::CartError;
use crate::remote::{RemoteCartStore, RemoteStoreError, decode_lines};
use crate::store::LocalCartStore;

/// Synchronizer lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No identity resolution has happened yet.
    Uninitialized,
    /// An initial load is in flight.
    Loading,
    /// Mutations apply directly.
    Ready,
}

/// Who the current cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Guest session: local store only.
    Anonymous,
    /// Signed-in session: local store plus the user's remote record.
    Authenticated(UserId),
}

impl Identity {
    fn from_user(user: Option<UserId>) -> Self {
        user.map_or(Self::Anonymous, Self::Authenticated)
    }
}

/// A mutation captured at the API boundary.
///
/// Arguments are validated before one of these is built, so a queued
/// mutation can always be applied later.
#[derive(Debug, Clone)]
enum Mutation {
    Add {
        product: ProductSnapshot,
        quantity: u32,
        color: String,
    },
    Remove {
        product_id: String,
    },
    SetQuantity {
        product_id: String,
        quantity: u32,
    },
    Clear,
}

struct SyncState {
    phase: SyncPhase,
    identity: Identity,
    lines: Vec<CartLine>,
    /// Mutations accepted before the initial load resolved.
    pending: Vec<Mutation>,
    /// Bumped per identity resolution; a stale in-flight load is discarded.
    load_epoch: u64,
    /// Bumped per write-back; a stale flush timer exits without writing.
    flush_gen: u64,
    /// Last remote sync failure, for the UI to surface ("failed to sync
    /// cart"). Cleared on the next successful sync.
    last_sync_error: Option<String>,
}

struct CartSyncServiceInner {
    local: Arc<dyn LocalCartStore>,
    remote: Option<Arc<dyn RemoteCartStore>>,
    policy: ShippingPolicy,
    debounce: Duration,
    state: Mutex<SyncState>,
}

/// The cart synchronization service.
///
/// Cheaply cloneable via `Arc`; all clones share one cart. This is the only
/// mutation surface for the cart - UI code calls the mutation methods and
/// reads the derived accessors.
#[derive(Clone)]
pub struct CartSyncService {
    inner: Arc<CartSyncServiceInner>,
}

impl CartSyncService {
    /// Create a service syncing to both tiers.
    #[must_use]
    pub fn new(
        local: Arc<dyn LocalCartStore>,
        remote: Arc<dyn RemoteCartStore>,
        policy: ShippingPolicy,
        debounce: Duration,
    ) -> Self {
        Self::build(local, Some(remote), policy, debounce)
    }

    /// Create a service with no remote tier.
    ///
    /// Used when no remote store is configured: identity transitions still
    /// work, but authenticated sessions stay device-local.
    #[must_use]
    pub fn local_only(
        local: Arc<dyn LocalCartStore>,
        policy: ShippingPolicy,
        debounce: Duration,
    ) -> Self {
        Self::build(local, None, policy, debounce)
    }

    fn build(
        local: Arc<dyn LocalCartStore>,
        remote: Option<Arc<dyn RemoteCartStore>>,
        policy: ShippingPolicy,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CartSyncServiceInner {
                local,
                remote,
                policy,
                debounce,
                state: Mutex::new(SyncState {
                    phase: SyncPhase::Uninitialized,
                    identity: Identity::Anonymous,
                    lines: Vec::new(),
                    pending: Vec::new(),
                    load_epoch: 0,
                    flush_gen: 0,
                    last_sync_error: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Read Accessors (derived, never stored)
    // =========================================================================

    /// Current cart lines, in display order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.state().lines.clone()
    }

    /// Current subtotal/shipping/total.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        compute_totals(&self.state().lines, &self.inner.policy)
    }

    /// Total number of units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        item_count(&self.state().lines)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.state().phase
    }

    /// The last remote sync failure, if the most recent sync attempt failed.
    ///
    /// Non-fatal by design: the mutation that triggered the sync has already
    /// succeeded locally.
    #[must_use]
    pub fn last_sync_error(&self) -> Option<String> {
        self.state().last_sync_error.clone()
    }

    // =========================================================================
    // Cart Mutation API
    // =========================================================================

    /// Add `quantity` of a product variant to the cart.
    ///
    /// Merges into an existing `(product, color)` line by incrementing its
    /// quantity; otherwise appends a new line, defaulting the color sentinel
    /// when `color` is blank.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the snapshot has no id or `quantity < 1`. No
    /// partial mutation occurs.
    pub fn add_item(
        &self,
        product: ProductSnapshot,
        quantity: i64,
        color: &str,
    ) -> Result<(), CartError> {
        if product.id.trim().is_empty() {
            return Err(CartError::MissingProductId);
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity(quantity))?;
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(i64::from(quantity)));
        }

        self.submit(Mutation::Add {
            product,
            quantity,
            color: color.to_string(),
        });
        Ok(())
    }

    /// Remove every line for `product_id`, regardless of color.
    ///
    /// Coarser than the `(product, color)` identity key on purpose - the
    /// storefront's remove control operates per product.
    pub fn remove_item(&self, product_id: &str) {
        self.submit(Mutation::Remove {
            product_id: product_id.to_string(),
        });
    }

    /// Set the quantity on the first line matching `product_id`.
    ///
    /// A `quantity < 1` removes the product from the cart entirely instead
    /// of storing a non-positive quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `quantity` exceeds what a
    /// line can hold.
    pub fn update_quantity(&self, product_id: &str, quantity: i64) -> Result<(), CartError> {
        if quantity < 1 {
            self.remove_item(product_id);
            return Ok(());
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity(quantity))?;

        self.submit(Mutation::SetQuantity {
            product_id: product_id.to_string(),
            quantity,
        });
        Ok(())
    }

    /// Empty the cart everywhere.
    ///
    /// Memory and the local slot are cleared immediately; when
    /// authenticated, the remote record is replaced with the empty list on
    /// a best-effort basis (a stale remote cart is acceptable).
    pub fn clear_cart(&self) {
        self.submit(Mutation::Clear);
    }

    /// Checkout boundary event: payment captured, the cart is spent.
    pub fn on_payment_confirmed(&self, order_id: &OrderId) {
        info!(order_id = %order_id, "Payment confirmed; clearing cart");
        self.clear_cart();
    }

    // =========================================================================
    // Identity Transitions / Initial Load
    // =========================================================================

    /// React to an identity resolution: `None` for guest, `Some` for a
    /// signed-in user.
    ///
    /// Idempotent for repeated equal identities. Each actual transition
    /// re-runs the initial load; a transition arriving while a previous
    /// load is still in flight supersedes it (the stale result is
    /// discarded).
    #[instrument(skip(self, user))]
    pub async fn on_identity_change(&self, user: Option<UserId>) {
        let identity = Identity::from_user(user);

        let epoch = {
            let mut state = self.state();
            if state.identity == identity && state.phase != SyncPhase::Uninitialized {
                debug!("Identity unchanged; skipping reload");
                return;
            }
            state.identity = identity.clone();
            state.phase = SyncPhase::Loading;
            state.load_epoch += 1;
            state.load_epoch
        };

        let local_lines = self.inner.local.load();
        let outcome = self.resolve_initial(&identity, local_lines).await;
        self.commit_initial(epoch, outcome);
    }

    /// Run the load policy for the new identity. No locks held.
    async fn resolve_initial(&self, identity: &Identity, local_lines: Vec<CartLine>) -> Loaded {
        let user = match identity {
            Identity::Anonymous => {
                return Loaded::Local(local_lines);
            }
            Identity::Authenticated(user) => user,
        };

        let Some(remote) = &self.inner.remote else {
            debug!("No remote store configured; staying device-local");
            return Loaded::Local(local_lines);
        };

        match remote.fetch_by_user(user).await {
            Ok(Some(record)) => {
                let remote_lines = decode_lines(&record.items_json);
                if remote_lines.is_empty() {
                    // Empty or undecodable remote content: local survives
                    // as the seed for the first real remote write.
                    Loaded::Local(local_lines)
                } else {
                    Loaded::Remote(remote_lines)
                }
            }
            Ok(None) => Loaded::Local(local_lines),
            Err(e) => {
                warn!("Failed to fetch remote cart: {e}");
                Loaded::LocalDegraded(local_lines, e.to_string())
            }
        }
    }

    /// Install the load result and drain any queued mutations.
    fn commit_initial(&self, epoch: u64, outcome: Loaded) {
        let mut state = self.state();
        if state.load_epoch != epoch {
            debug!("Discarding stale initial load result");
            return;
        }

        state.last_sync_error = None;
        match outcome {
            Loaded::Local(lines) => state.lines = lines,
            Loaded::LocalDegraded(lines, warning) => {
                state.lines = lines;
                state.last_sync_error = Some(warning);
            }
            Loaded::Remote(lines) => {
                // Remote wins: overwrite the local slot to match.
                state.lines = lines;
                if let Err(e) = self.inner.local.save(&state.lines) {
                    warn!("Failed to overwrite local cart slot: {e}");
                }
            }
        }
        state.phase = SyncPhase::Ready;

        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            debug!(count = pending.len(), "Applying mutations queued during load");
            let immediate = pending.iter().any(|m| matches!(m, Mutation::Clear));
            for mutation in pending {
                Self::apply(&mut state.lines, mutation);
            }
            self.write_back(&mut state, immediate);
        }
    }

    // =========================================================================
    // Write-back
    // =========================================================================

    /// Route a validated mutation: apply now when ready, queue otherwise.
    fn submit(&self, mutation: Mutation) {
        let mut state = self.state();
        if state.phase != SyncPhase::Ready {
            debug!("Cart not ready; queueing mutation");
            state.pending.push(mutation);
            return;
        }

        let immediate = matches!(mutation, Mutation::Clear);
        Self::apply(&mut state.lines, mutation);
        self.write_back(&mut state, immediate);
    }

    fn apply(lines: &mut Vec<CartLine>, mutation: Mutation) {
        match mutation {
            Mutation::Add {
                product,
                quantity,
                color,
            } => {
                let line = CartLine::new(product, quantity, &color);
                let key = line.key();
                match lines.iter_mut().find(|l| l.key() == key) {
                    Some(existing) => {
                        existing.quantity = existing.quantity.saturating_add(quantity);
                    }
                    None => lines.push(line),
                }
            }
            Mutation::Remove { product_id } => {
                lines.retain(|l| l.product_id != product_id);
            }
            Mutation::SetQuantity {
                product_id,
                quantity,
            } => {
                if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
                    line.quantity = quantity;
                }
            }
            Mutation::Clear => lines.clear(),
        }
    }

    /// Persist after a mutation: re-validate, save locally, schedule the
    /// remote flush.
    fn write_back(&self, state: &mut SyncState, immediate: bool) {
        // Defensive re-check before anything durable sees the cart.
        state.lines = dedupe_lines(std::mem::take(&mut state.lines));

        if let Err(e) = self.inner.local.save(&state.lines) {
            warn!("Failed to save cart locally: {e}");
        }

        // Supersede any scheduled flush; the new one reads newer state.
        state.flush_gen += 1;

        if matches!(state.identity, Identity::Authenticated(_)) && self.inner.remote.is_some() {
            let delay = if immediate {
                Duration::ZERO
            } else {
                self.inner.debounce
            };
            self.schedule_flush(state.flush_gen, delay);
        }
    }

    fn schedule_flush(&self, generation: u64, delay: Duration) {
        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.flush_if_current(generation).await;
        });
    }

    /// Push the full current cart to the remote record, unless this timer
    /// was superseded by a newer mutation.
    async fn flush_if_current(&self, generation: u64) {
        let (lines, user) = {
            let state = self.state();
            if state.flush_gen != generation {
                // A newer mutation rescheduled the flush; let it win.
                return;
            }
            let Identity::Authenticated(user) = &state.identity else {
                return;
            };
            (state.lines.clone(), user.clone())
        };

        let Some(remote) = &self.inner.remote else {
            return;
        };

        match Self::push_remote(remote.as_ref(), &user, &lines).await {
            Ok(()) => {
                debug!(line_count = lines.len(), "Remote cart synced");
                self.state().last_sync_error = None;
            }
            Err(e) => {
                warn!("Failed to sync cart to remote: {e}");
                self.state().last_sync_error = Some(e.to_string());
            }
        }
    }

    /// Whole-state replace: update the user's record if it exists, create it
    /// otherwise.
    async fn push_remote(
        remote: &dyn RemoteCartStore,
        user: &UserId,
        lines: &[CartLine],
    ) -> Result<(), RemoteStoreError> {
        match remote.fetch_by_user(user).await? {
            Some(record) => remote.update(&record.id, lines).await?,
            None => remote.create(user, lines).await?,
        };
        Ok(())
    }
}

/// Result of the initial-load policy.
enum Loaded {
    /// Local lines are the cart.
    Local(Vec<CartLine>),
    /// Local lines plus a non-fatal remote warning to surface.
    LocalDegraded(Vec<CartLine>, String),
    /// Remote lines won; the local slot must be overwritten to match.
    Remote(Vec<CartLine>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use copperleaf_core::ProductSnapshot;
    use rust_decimal::Decimal;

    fn snapshot(id: &str, price: &str) -> ProductSnapshot {
        ProductSnapshot {
            id: id.to_string(),
            name: format!("Product {id}"),
            price: price.parse().unwrap(),
            images: vec![],
        }
    }

    fn ready_service() -> (CartSyncService, Arc<MemoryStore>) {
        let local = Arc::new(MemoryStore::new());
        let service = CartSyncService::local_only(
            local.clone(),
            ShippingPolicy::default(),
            Duration::from_millis(10),
        );
        (service, local)
    }

    #[tokio::test]
    async fn test_add_increments_not_duplicates() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "20.00"), 1, "blue").unwrap();
        service.add_item(snapshot("p1", "20.00"), 1, "blue").unwrap();

        let lines = service.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_arguments() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        assert_eq!(
            service.add_item(snapshot("", "1.00"), 1, "blue"),
            Err(CartError::MissingProductId)
        );
        assert_eq!(
            service.add_item(snapshot("p1", "1.00"), 0, "blue"),
            Err(CartError::InvalidQuantity(0))
        );
        assert_eq!(
            service.add_item(snapshot("p1", "1.00"), -3, "blue"),
            Err(CartError::InvalidQuantity(-3))
        );
        assert!(service.lines().is_empty());
    }

    #[tokio::test]
    async fn test_remove_drops_all_colors() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "5.00"), 1, "red").unwrap();
        service.add_item(snapshot("p1", "5.00"), 1, "blue").unwrap();
        service.add_item(snapshot("p2", "5.00"), 1, "red").unwrap();

        service.remove_item("p1");

        let lines = service.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, "p2");
    }

    #[tokio::test]
    async fn test_update_quantity_floor_removes() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "5.00"), 3, "red").unwrap();

        service.update_quantity("p1", 0).unwrap();
        assert!(service.lines().is_empty());

        service.add_item(snapshot("p1", "5.00"), 3, "red").unwrap();
        service.update_quantity("p1", -5).unwrap();
        assert!(service.lines().is_empty());
    }

    #[tokio::test]
    async fn test_update_quantity_sets_first_match() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "5.00"), 1, "red").unwrap();
        service.update_quantity("p1", 7).unwrap();
        assert_eq!(service.lines()[0].quantity, 7);
    }

    #[tokio::test]
    async fn test_mutations_before_ready_are_queued_not_dropped() {
        let (service, _) = ready_service();

        // No identity resolution yet: mutation must be deferred.
        service.add_item(snapshot("p1", "5.00"), 2, "red").unwrap();
        assert!(service.lines().is_empty());
        assert_eq!(service.phase(), SyncPhase::Uninitialized);

        service.on_identity_change(None).await;

        let lines = service.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(service.phase(), SyncPhase::Ready);
    }

    #[tokio::test]
    async fn test_mutations_persist_to_local_store() {
        let (service, local) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "5.00"), 2, "red").unwrap();
        assert_eq!(local.load().len(), 1);

        service.clear_cart();
        assert!(local.load().is_empty());
        assert!(service.lines().is_empty());
    }

    #[tokio::test]
    async fn test_totals_accessor() {
        let (service, _) = ready_service();
        service.on_identity_change(None).await;

        service.add_item(snapshot("p1", "99.99"), 1, "red").unwrap();
        let totals = service.totals();
        assert_eq!(totals.subtotal, "99.99".parse::<Decimal>().unwrap());
        assert_eq!(totals.shipping, "10".parse::<Decimal>().unwrap());
        assert_eq!(totals.total, "109.99".parse::<Decimal>().unwrap());
        assert_eq!(service.item_count(), 1);
    }

    #[tokio::test]
    async fn test_repeated_identity_is_noop() {
        let (service, local) = ready_service();
        service.on_identity_change(None).await;
        service.add_item(snapshot("p1", "5.00"), 1, "red").unwrap();

        // Same identity again must not reload over the live cart.
        service.on_identity_change(None).await;
        assert_eq!(service.lines().len(), 1);
        assert_eq!(local.load().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_confirmed_clears() {
        let (service, local) = ready_service();
        service.on_identity_change(None).await;
        service.add_item(snapshot("p1", "5.00"), 1, "red").unwrap();

        service.on_payment_confirmed(&OrderId::new("ord_1"));
        assert!(service.lines().is_empty());
        assert!(local.load().is_empty());
    }
}
