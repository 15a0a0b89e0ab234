//! Purchase coordinator.
//!
//! A purchase is a two-step saga with no lock spanning the steps:
//!
//! 1. **Debit**: conditional decrement, `points >= price` or nothing happens.
//! 2. **Grant**: insert the ownership row together with its `purchase`
//!    transaction; the `(user, slug)` uniqueness constraint decides between
//!    racing purchases.
//!
//! If the grant fails, the debit is compensated: the price is credited back
//! and the debit and its `purchase_refund` are recorded together, so the
//! ledger nets to zero. Exactly one of "owned and debited once" or "not owned
//! and balance unchanged" is ever observable.

use paw_points_core::{
    CatalogItem, CatalogProvider, ItemSlug, OwnedItem, PointsError, PointsTransaction, Result,
    TransactionId, UserId,
};
use paw_points_store::{DebitOutcome, Store, StoreError};

/// Completed purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    /// The purchased item.
    pub item: CatalogItem,
    /// Points debited.
    pub price: i64,
    /// Balance after the debit.
    pub remaining_points: i64,
    /// The `purchase` ledger entry.
    pub transaction_id: TransactionId,
}

/// Runs the debit, grant and compensate saga.
pub struct PurchaseCoordinator<'a> {
    store: &'a dyn Store,
    catalog: &'a dyn CatalogProvider,
}

impl<'a> PurchaseCoordinator<'a> {
    /// Create a coordinator.
    #[must_use]
    pub const fn new(store: &'a dyn Store, catalog: &'a dyn CatalogProvider) -> Self {
        Self { store, catalog }
    }

    /// Buy `item_slug` for `user_id`.
    ///
    /// Safe to retry: a retry after success is rejected with `AlreadyOwned`.
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` / `NotPurchasable` for unknown or free items
    /// - `AlreadyOwned` if the user owns the item (also when a racing purchase won)
    /// - `InsufficientFunds` if the balance is below the price
    /// - `AccountNotFound` if the user has no balance
    /// - `PurchaseFailed` if the grant failed for another reason or compensation failed
    pub async fn purchase(&self, user_id: UserId, item_slug: &ItemSlug) -> Result<PurchaseReceipt> {
        let item = self
            .catalog
            .get(item_slug)
            .ok_or_else(|| PointsError::ItemNotFound(item_slug.clone()))?;

        if item.is_free() {
            return Err(PointsError::NotPurchasable(item_slug.clone()));
        }

        if self
            .store
            .get_owned_item(&user_id, item_slug)
            .await?
            .is_some()
        {
            return Err(PointsError::AlreadyOwned(item_slug.clone()));
        }

        let price = item.price;
        let debit = PointsTransaction::purchase(user_id, item_slug, price);

        // Step 1: debit.
        let balance = match self.store.debit(&user_id, price).await? {
            DebitOutcome::Debited { balance } => balance,
            DebitOutcome::Insufficient { balance } => {
                return Err(PointsError::InsufficientFunds {
                    balance: balance.points,
                    required: price,
                });
            }
        };

        // Step 2: grant, recording the debit in the same write.
        let owned = OwnedItem::new(user_id, item_slug.clone(), price);
        match self.store.grant_item(&owned, &debit).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::info!(
                    user_id = %user_id,
                    item = %item_slug,
                    "Concurrent purchase already granted the item, refunding"
                );
                self.compensate(&debit, item_slug, "already_owned").await?;
                return Err(PointsError::AlreadyOwned(item_slug.clone()));
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    item = %item_slug,
                    error = %e,
                    "Failed to grant purchased item, refunding"
                );
                self.compensate(&debit, item_slug, "grant_failed").await?;
                return Err(PointsError::PurchaseFailed(format!(
                    "could not grant {item_slug}"
                )));
            }
        }

        tracing::info!(
            user_id = %user_id,
            item = %item_slug,
            price,
            remaining_points = balance.points,
            "Item purchased"
        );

        Ok(PurchaseReceipt {
            item,
            price,
            remaining_points: balance.points,
            transaction_id: debit.id,
        })
    }

    /// Credit the price back and record the debit/refund pair.
    async fn compensate(
        &self,
        debit: &PointsTransaction,
        item_slug: &ItemSlug,
        reason: &str,
    ) -> Result<()> {
        let price = -debit.points_delta;
        let refund =
            PointsTransaction::purchase_refund(debit.user_id, item_slug, price, debit.id, reason);

        match self.store.refund(debit, &refund).await {
            Ok(balance) => {
                tracing::info!(
                    user_id = %debit.user_id,
                    item = %item_slug,
                    price,
                    balance = balance.points,
                    "Purchase debit refunded"
                );
                Ok(())
            }
            Err(e) => {
                // Debit without ownership or refund: needs operator attention.
                tracing::error!(
                    user_id = %debit.user_id,
                    item = %item_slug,
                    price,
                    debit_id = %debit.id,
                    error = %e,
                    "Purchase compensation failed"
                );
                Err(PointsError::PurchaseFailed(format!(
                    "refund of {price} points failed"
                )))
            }
        }
    }
}

#[cfg(all(test, feature = "rocksdb-backend"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use paw_points_core::{
        Account, ActionType, AwardRule, Balance, EquippedSnapshot, LeaderboardEntry, PointsConfig,
        StaticCatalog,
    };
    use paw_points_store::{AwardOutcome, RocksStore};
    use tempfile::TempDir;

    fn slug(s: &str) -> ItemSlug {
        s.parse().unwrap()
    }

    async fn funded(store: &dyn Store, points: i64) -> UserId {
        let user_id = UserId::generate();
        store.create_account(&Account::new(user_id)).await.unwrap();
        if points > 0 {
            let rule = PointsConfig::default().admin_grant(points).unwrap();
            let tx = PointsTransaction::credit(
                user_id,
                ActionType::AdminGrant,
                points,
                serde_json::Value::Null,
            );
            store.apply_award(&rule, &tx, Utc::now()).await.unwrap();
        }
        user_id
    }

    fn open_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (RocksStore::open(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn successful_purchase_debits_once_and_grants() {
        let (store, _dir) = open_store();
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 300).await;

        let receipt = PurchaseCoordinator::new(&store, &catalog)
            .purchase(user_id, &slug("red-scarf"))
            .await
            .unwrap();

        assert_eq!(receipt.price, 150);
        assert_eq!(receipt.remaining_points, 150);
        assert!(store
            .get_owned_item(&user_id, &slug("red-scarf"))
            .await
            .unwrap()
            .is_some());

        let history = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        let debits: Vec<_> = history.iter().filter(|tx| tx.is_debit()).collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].points_delta, -150);
        assert_eq!(debits[0].id, receipt.transaction_id);
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_balance() {
        let (store, _dir) = open_store();
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 100).await;

        let result = PurchaseCoordinator::new(&store, &catalog)
            .purchase(user_id, &slug("red-scarf"))
            .await;

        assert!(matches!(
            result,
            Err(PointsError::InsufficientFunds {
                balance: 100,
                required: 150
            })
        ));
        assert_eq!(store.get_account(&user_id).await.unwrap().unwrap().points, 100);
        assert!(store.list_owned_items(&user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_rejections() {
        let (store, _dir) = open_store();
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 1000).await;
        let coordinator = PurchaseCoordinator::new(&store, &catalog);

        assert!(matches!(
            coordinator.purchase(user_id, &slug("unicorn")).await,
            Err(PointsError::ItemNotFound(_))
        ));
        assert!(matches!(
            coordinator.purchase(user_id, &slug("mixed-puppy")).await,
            Err(PointsError::NotPurchasable(_))
        ));

        coordinator.purchase(user_id, &slug("straw-hat")).await.unwrap();
        assert!(matches!(
            coordinator.purchase(user_id, &slug("straw-hat")).await,
            Err(PointsError::AlreadyOwned(_))
        ));
        assert_eq!(store.get_account(&user_id).await.unwrap().unwrap().points, 880);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_purchases_debit_once() {
        let (store, _dir) = open_store();
        let store: Arc<dyn Store> = Arc::new(store);
        let catalog: Arc<dyn CatalogProvider> = Arc::new(StaticCatalog::default());
        // Enough for every racer to pass the debit step.
        let user_id = funded(store.as_ref(), 10_000).await;

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move {
                PurchaseCoordinator::new(store.as_ref(), catalog.as_ref())
                    .purchase(user_id, &slug("persian-cat"))
                    .await
            })
        });
        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, PointsError::AlreadyOwned(_))));

        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 9_550);

        // Every losing debit that got past the ownership pre-check is paired with a refund.
        let history = store.list_transactions_by_user(&user_id, 50, 0).await.unwrap();
        let net: i64 = history
            .iter()
            .filter(|tx| tx.action_type != ActionType::AdminGrant)
            .map(|tx| tx.points_delta)
            .sum();
        assert_eq!(net, -450);
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Fault {
        /// Another purchase grants the item between our debit and insert.
        RacingGrant,
        /// The ownership and ledger write fails for a non-uniqueness reason.
        GrantError,
        /// The grant fails and so does the refund.
        GrantAndRefundError,
    }

    struct FaultyStore {
        inner: RocksStore,
        fault: Fault,
    }

    #[async_trait]
    impl Store for FaultyStore {
        async fn create_account(&self, account: &Account) -> paw_points_store::Result<()> {
            self.inner.create_account(account).await
        }
        async fn get_account(&self, user_id: &UserId) -> paw_points_store::Result<Option<Account>> {
            self.inner.get_account(user_id).await
        }
        async fn set_admin(&self, user_id: &UserId, is_admin: bool) -> paw_points_store::Result<()> {
            self.inner.set_admin(user_id, is_admin).await
        }
        async fn leaderboard(&self, limit: usize) -> paw_points_store::Result<Vec<LeaderboardEntry>> {
            self.inner.leaderboard(limit).await
        }
        async fn apply_award(
            &self,
            rule: &AwardRule,
            transaction: &PointsTransaction,
            day_start: DateTime<Utc>,
        ) -> paw_points_store::Result<AwardOutcome> {
            self.inner.apply_award(rule, transaction, day_start).await
        }
        async fn debit(&self, user_id: &UserId, amount: i64) -> paw_points_store::Result<DebitOutcome> {
            self.inner.debit(user_id, amount).await
        }
        async fn refund(
            &self,
            debit: &PointsTransaction,
            refund: &PointsTransaction,
        ) -> paw_points_store::Result<Balance> {
            match self.fault {
                Fault::GrantAndRefundError => Err(StoreError::Database("refund lost".into())),
                _ => self.inner.refund(debit, refund).await,
            }
        }
        async fn list_transactions_by_user(
            &self,
            user_id: &UserId,
            limit: usize,
            offset: usize,
        ) -> paw_points_store::Result<Vec<PointsTransaction>> {
            self.inner.list_transactions_by_user(user_id, limit, offset).await
        }
        async fn get_owned_item(
            &self,
            user_id: &UserId,
            item_slug: &ItemSlug,
        ) -> paw_points_store::Result<Option<OwnedItem>> {
            self.inner.get_owned_item(user_id, item_slug).await
        }
        async fn grant_item(
            &self,
            item: &OwnedItem,
            debit: &PointsTransaction,
        ) -> paw_points_store::Result<()> {
            match self.fault {
                Fault::RacingGrant => {
                    let winner =
                        PointsTransaction::purchase(item.user_id, &item.item_slug, item.purchase_price);
                    self.inner.grant_item(item, &winner).await?;
                    self.inner.grant_item(item, debit).await
                }
                Fault::GrantError | Fault::GrantAndRefundError => {
                    Err(StoreError::Database("disk full".into()))
                }
            }
        }
        async fn list_owned_items(&self, user_id: &UserId) -> paw_points_store::Result<Vec<OwnedItem>> {
            self.inner.list_owned_items(user_id).await
        }
        async fn get_equipped(&self, user_id: &UserId) -> paw_points_store::Result<Option<EquippedSnapshot>> {
            self.inner.get_equipped(user_id).await
        }
        async fn put_equipped(
            &self,
            user_id: &UserId,
            snapshot: &EquippedSnapshot,
        ) -> paw_points_store::Result<()> {
            self.inner.put_equipped(user_id, snapshot).await
        }
    }

    fn faulty(fault: Fault) -> (FaultyStore, TempDir) {
        let (inner, dir) = open_store();
        (FaultyStore { inner, fault }, dir)
    }

    #[tokio::test]
    async fn lost_race_is_refunded_as_already_owned() {
        let (store, _dir) = faulty(Fault::RacingGrant);
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 300).await;

        let result = PurchaseCoordinator::new(&store, &catalog)
            .purchase(user_id, &slug("shiba-inu"))
            .await;

        assert!(matches!(result, Err(PointsError::AlreadyOwned(_))));
        assert_eq!(store.get_account(&user_id).await.unwrap().unwrap().points, 300);

        let history = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        let refund = history
            .iter()
            .find(|tx| tx.action_type == ActionType::PurchaseRefund)
            .unwrap();
        let debit = history
            .iter()
            .find(|tx| refund.metadata["refunds"] == tx.id.to_string())
            .unwrap();
        assert_eq!(debit.action_type, ActionType::Purchase);
        assert_eq!(refund.points_delta, 300);
        assert_eq!(debit.points_delta, -300);
        assert_eq!(refund.metadata["refunds"], debit.id.to_string());
        assert_eq!(refund.metadata["reason"], "already_owned");
        assert_eq!(refund.metadata["item_slug"], "shiba-inu");
    }

    #[tokio::test]
    async fn owned_items_always_have_their_debit() {
        let (store, _dir) = open_store();
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 1000).await;
        let coordinator = PurchaseCoordinator::new(&store, &catalog);

        for item in ["straw-hat", "red-scarf", "night-sky"] {
            coordinator.purchase(user_id, &slug(item)).await.unwrap();
        }
        // A rejected repeat leaves no extra debit behind.
        assert!(coordinator.purchase(user_id, &slug("red-scarf")).await.is_err());

        let owned = store.list_owned_items(&user_id).await.unwrap();
        let history = store.list_transactions_by_user(&user_id, 50, 0).await.unwrap();
        let debits: Vec<_> = history
            .iter()
            .filter(|tx| tx.action_type == ActionType::Purchase)
            .collect();

        assert_eq!(owned.len(), 3);
        assert_eq!(debits.len(), 3);
        for item in &owned {
            let debit = debits
                .iter()
                .find(|tx| tx.metadata["item_slug"] == item.item_slug.as_str())
                .unwrap();
            assert_eq!(debit.points_delta, -item.purchase_price);
        }
    }

    #[tokio::test]
    async fn grant_error_is_refunded_as_failure() {
        let (store, _dir) = faulty(Fault::GrantError);
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 300).await;

        let result = PurchaseCoordinator::new(&store, &catalog)
            .purchase(user_id, &slug("night-sky"))
            .await;

        assert!(matches!(result, Err(PointsError::PurchaseFailed(_))));
        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 300);
        assert_eq!(account.total_earned, 300);
        assert!(store.list_owned_items(&user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_compensation_surfaces_purchase_failed() {
        let (store, _dir) = faulty(Fault::GrantAndRefundError);
        let catalog = StaticCatalog::default();
        let user_id = funded(&store, 300).await;

        let result = PurchaseCoordinator::new(&store, &catalog)
            .purchase(user_id, &slug("night-sky"))
            .await;

        assert!(matches!(result, Err(PointsError::PurchaseFailed(_))));
        // The stuck debit is left for an operator.
        assert_eq!(store.get_account(&user_id).await.unwrap().unwrap().points, 50);
    }
}
