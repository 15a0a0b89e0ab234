//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait on
//! top of a pessimistic `TransactionDB`. Every balance mutation starts by taking
//! an exclusive lock on the account key, so checks made inside the transaction
//! (cap sums, one-time lookups, the balance itself) cannot go stale before the
//! commit. Ownership inserts lock the `(user, slug)` key, which acts as the
//! uniqueness constraint.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    Transaction, TransactionDB, TransactionDBOptions,
};

use paw_points_core::{
    Account, ActionType, AwardRule, Balance, EquippedSnapshot, ItemSlug, LeaderboardEntry,
    OwnedItem, PointsTransaction, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AwardOutcome, DebitOutcome, Store};

/// How long a transaction waits for a row lock before failing.
const LOCK_TIMEOUT_MS: i64 = 5_000;

type Txn<'a> = Transaction<'a, TransactionDB<MultiThreaded>>;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<TransactionDB<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = TransactionDB::open_cf_descriptors(&opts, &txn_opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read the account and hold an exclusive lock on it until commit.
    fn lock_account(&self, txn: &Txn<'_>, user_id: &UserId) -> Result<Account> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let data = txn
            .get_for_update_cf(&cf, keys::account_key(user_id), true)?
            .ok_or_else(|| StoreError::account_not_found(user_id))?;
        Self::deserialize(&data)
    }

    fn stage_account(&self, txn: &Txn<'_>, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        txn.put_cf(&cf, keys::account_key(&account.user_id), Self::serialize(account)?)?;
        Ok(())
    }

    /// Write a transaction record and both of its index entries.
    fn stage_transaction(&self, txn: &Txn<'_>, transaction: &PointsTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_by_action = self.cf(cf::TRANSACTIONS_BY_ACTION)?;

        txn.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        )?;
        txn.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [],
        )?;
        txn.put_cf(
            &cf_by_action,
            keys::action_transaction_key(
                &transaction.user_id,
                transaction.action_type,
                &transaction.id,
            ),
            keys::encode_delta(transaction.points_delta),
        )?;

        Ok(())
    }

    /// Whether any nonzero entry exists for `(user, action)`.
    fn has_nonzero_entry(
        &self,
        txn: &Txn<'_>,
        user_id: &UserId,
        action: ActionType,
    ) -> Result<bool> {
        let cf = self.cf(cf::TRANSACTIONS_BY_ACTION)?;
        let prefix = keys::action_transactions_prefix(user_id, action);

        for item in txn.iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if keys::decode_delta(&value) != 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Sum of deltas for `(user, action)` created at or after `since`.
    fn sum_since(
        &self,
        txn: &Txn<'_>,
        user_id: &UserId,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let cf = self.cf(cf::TRANSACTIONS_BY_ACTION)?;
        let prefix = keys::action_transactions_prefix(user_id, action);
        let start =
            keys::action_transaction_key(user_id, action, &TransactionId::lower_bound_at(since));

        let mut total: i64 = 0;
        for item in txn.iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            total = total.saturating_add(keys::decode_delta(&value));
        }

        Ok(total)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let txn = self.db.transaction();

        if txn.get_for_update_cf(&cf, &key, true)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }

        txn.put_cf(&cf, &key, Self::serialize(account)?)?;
        txn.commit()?;

        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;

        self.db
            .get_cf(&cf, keys::account_key(user_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    async fn set_admin(&self, user_id: &UserId, is_admin: bool) -> Result<()> {
        let txn = self.db.transaction();
        let mut account = self.lock_account(&txn, user_id)?;

        account.is_admin = is_admin;
        account.updated_at = Utc::now();

        self.stage_account(&txn, &account)?;
        txn.commit()?;

        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let cf = self.cf(cf::ACCOUNTS)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let account: Account = Self::deserialize(&value)?;
            entries.push(LeaderboardEntry {
                user_id: account.user_id,
                points: account.points,
            });
        }

        // Stable sort keeps key order among equal balances.
        entries.sort_by(|a, b| b.points.cmp(&a.points));
        entries.truncate(limit);

        Ok(entries)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn apply_award(
        &self,
        rule: &AwardRule,
        transaction: &PointsTransaction,
        day_start: DateTime<Utc>,
    ) -> Result<AwardOutcome> {
        let user_id = &transaction.user_id;
        let txn = self.db.transaction();

        // Lock first: every award for this user serializes here.
        let mut account = self.lock_account(&txn, user_id)?;
        let balance = account.balance();

        if rule.one_time && self.has_nonzero_entry(&txn, user_id, rule.action)? {
            return Ok(AwardOutcome::AlreadyAwarded { balance });
        }

        if let Some(cap) = rule.daily_cap {
            let awarded_today = self.sum_since(&txn, user_id, rule.action, day_start)?;
            if awarded_today.saturating_add(rule.points) > cap {
                return Ok(AwardOutcome::DailyCapReached {
                    balance,
                    awarded_today,
                });
            }
        }

        account.points = account.points.saturating_add(rule.points);
        if rule.action.counts_as_earned() {
            account.total_earned = account.total_earned.saturating_add(rule.points);
        }
        account.updated_at = Utc::now();

        self.stage_account(&txn, &account)?;
        self.stage_transaction(&txn, transaction)?;
        txn.commit()?;

        Ok(AwardOutcome::Awarded {
            balance: account.balance(),
        })
    }

    async fn debit(&self, user_id: &UserId, amount: i64) -> Result<DebitOutcome> {
        let txn = self.db.transaction();
        let mut account = self.lock_account(&txn, user_id)?;

        if !account.can_afford(amount) {
            return Ok(DebitOutcome::Insufficient {
                balance: account.balance(),
            });
        }

        account.points -= amount;
        account.updated_at = Utc::now();

        self.stage_account(&txn, &account)?;
        txn.commit()?;

        Ok(DebitOutcome::Debited {
            balance: account.balance(),
        })
    }

    async fn refund(
        &self,
        debit: &PointsTransaction,
        refund: &PointsTransaction,
    ) -> Result<Balance> {
        let txn = self.db.transaction();
        let mut account = self.lock_account(&txn, &refund.user_id)?;

        account.points = account.points.saturating_add(refund.points_delta);
        account.updated_at = Utc::now();

        self.stage_account(&txn, &account)?;
        self.stage_transaction(&txn, debit)?;
        self.stage_transaction(&txn, refund)?;
        txn.commit()?;

        Ok(account.balance())
    }

    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);
        let upper = keys::user_transactions_upper_bound(user_id);

        // ULIDs are time-ordered, so walking the index backwards yields newest first.
        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&upper, Direction::Reverse));

        let mut transactions = Vec::new();
        for item in iter.skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let Some(tx_id) = keys::extract_transaction_id_from_user_key(&key) else {
                tracing::warn!(user_id = %user_id, "Skipping malformed transaction index key");
                continue;
            };

            if let Some(data) = self.db.get_cf(&cf_tx, keys::transaction_key(&tx_id))? {
                transactions.push(Self::deserialize(&data)?);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Inventory Operations
    // =========================================================================

    async fn get_owned_item(
        &self,
        user_id: &UserId,
        item_slug: &ItemSlug,
    ) -> Result<Option<OwnedItem>> {
        let cf = self.cf(cf::OWNED_ITEMS)?;

        self.db
            .get_cf(&cf, keys::owned_item_key(user_id, item_slug))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    async fn grant_item(&self, item: &OwnedItem, debit: &PointsTransaction) -> Result<()> {
        let cf = self.cf(cf::OWNED_ITEMS)?;
        let key = keys::owned_item_key(&item.user_id, &item.item_slug);
        let txn = self.db.transaction();

        // The key lock is the uniqueness constraint: a racing insert waits
        // here and then sees the committed row.
        if txn.get_for_update_cf(&cf, &key, true)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "owned item",
                id: format!("{}/{}", item.user_id, item.item_slug),
            });
        }

        txn.put_cf(&cf, &key, Self::serialize(item)?)?;
        self.stage_transaction(&txn, debit)?;
        txn.commit()?;

        Ok(())
    }

    async fn list_owned_items(&self, user_id: &UserId) -> Result<Vec<OwnedItem>> {
        let cf = self.cf(cf::OWNED_ITEMS)?;
        let prefix = keys::owned_items_prefix(user_id);

        let mut items = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            items.push(Self::deserialize(&value)?);
        }

        Ok(items)
    }

    async fn get_equipped(&self, user_id: &UserId) -> Result<Option<EquippedSnapshot>> {
        let cf = self.cf(cf::EQUIPPED)?;

        self.db
            .get_cf(&cf, keys::equipped_key(user_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    async fn put_equipped(&self, user_id: &UserId, snapshot: &EquippedSnapshot) -> Result<()> {
        let cf = self.cf(cf::EQUIPPED)?;
        self.db
            .put_cf(&cf, keys::equipped_key(user_id), Self::serialize(snapshot)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::future::join_all;
    use paw_points_core::PointsConfig;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    async fn funded_account(store: &RocksStore, points: i64) -> UserId {
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

    fn rule_of(action: ActionType) -> AwardRule {
        PointsConfig::default().rule_for(action).unwrap()
    }

    fn credit_for(user_id: UserId, rule: &AwardRule) -> PointsTransaction {
        PointsTransaction::credit(user_id, rule.action, rule.points, serde_json::Value::Null)
    }

    fn today() -> DateTime<Utc> {
        PointsConfig::default().day_start(Utc::now())
    }

    fn slug(s: &str) -> ItemSlug {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store.create_account(&Account::new(user_id)).await.unwrap();
        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 0);

        let duplicate = store.create_account(&Account::new(user_id)).await;
        assert!(matches!(duplicate, Err(StoreError::AlreadyExists { .. })));

        store.set_admin(&user_id, true).await.unwrap();
        assert!(store.get_account(&user_id).await.unwrap().unwrap().is_admin);

        let missing = store.set_admin(&UserId::generate(), true).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn award_credits_and_records_transaction() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let rule = rule_of(ActionType::CreatePost);
        let tx = credit_for(user_id, &rule);

        let outcome = store.apply_award(&rule, &tx, today()).await.unwrap();
        assert_eq!(
            outcome,
            AwardOutcome::Awarded {
                balance: Balance {
                    points: 10,
                    total_earned: 10
                }
            }
        );

        let history = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        assert_eq!(history, vec![tx]);
    }

    #[tokio::test]
    async fn award_requires_account() {
        let (store, _dir) = create_test_store();
        let rule = rule_of(ActionType::CreatePost);
        let tx = credit_for(UserId::generate(), &rule);

        let result = store.apply_award(&rule, &tx, today()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn one_time_action_awarded_once() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let rule = rule_of(ActionType::CompleteProfile);

        let first = store
            .apply_award(&rule, &credit_for(user_id, &rule), today())
            .await
            .unwrap();
        assert!(matches!(first, AwardOutcome::Awarded { .. }));

        let second = store
            .apply_award(&rule, &credit_for(user_id, &rule), today())
            .await
            .unwrap();
        assert_eq!(
            second,
            AwardOutcome::AlreadyAwarded {
                balance: Balance {
                    points: 50,
                    total_earned: 50
                }
            }
        );

        // A different one-time action is unaffected.
        let other = rule_of(ActionType::RegisterPet);
        let third = store
            .apply_award(&other, &credit_for(user_id, &other), today())
            .await
            .unwrap();
        assert!(matches!(third, AwardOutcome::Awarded { .. }));
    }

    #[tokio::test]
    async fn daily_cap_rejects_in_full() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        // create_comment: 2 points, cap 20.
        let rule = rule_of(ActionType::CreateComment);

        for _ in 0..10 {
            let outcome = store
                .apply_award(&rule, &credit_for(user_id, &rule), today())
                .await
                .unwrap();
            assert!(matches!(outcome, AwardOutcome::Awarded { .. }));
        }

        let outcome = store
            .apply_award(&rule, &credit_for(user_id, &rule), today())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AwardOutcome::DailyCapReached {
                awarded_today: 20,
                ..
            }
        ));
        assert_eq!(outcome.balance().points, 20);
    }

    #[tokio::test]
    async fn daily_cap_counts_only_today() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let rule = rule_of(ActionType::DailyLogin);

        let first = store
            .apply_award(&rule, &credit_for(user_id, &rule), today())
            .await
            .unwrap();
        assert!(matches!(first, AwardOutcome::Awarded { .. }));

        let again = store
            .apply_award(&rule, &credit_for(user_id, &rule), today())
            .await
            .unwrap();
        assert!(matches!(again, AwardOutcome::DailyCapReached { .. }));

        // A day boundary after the first check-in: nothing counted yet.
        let tomorrow = Utc::now() + Duration::seconds(1);
        std::thread::sleep(std::time::Duration::from_millis(1_100));
        let next_day = store
            .apply_award(&rule, &credit_for(user_id, &rule), tomorrow)
            .await
            .unwrap();
        assert!(matches!(next_day, AwardOutcome::Awarded { .. }));
        assert_eq!(next_day.balance().points, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_one_time_awards_credit_once() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 0).await;
        let rule = rule_of(ActionType::CompleteProfile);

        let tasks = (0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .apply_award(&rule, &credit_for(user_id, &rule), today())
                    .await
                    .unwrap()
            })
        });
        let outcomes: Vec<AwardOutcome> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let awarded = outcomes
            .iter()
            .filter(|o| matches!(o, AwardOutcome::Awarded { .. }))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, AwardOutcome::AlreadyAwarded { .. }))
            .count();
        assert_eq!(awarded, 1);
        assert_eq!(rejected, 15);

        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 50);
        let history = store.list_transactions_by_user(&user_id, 50, 0).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_capped_awards_never_exceed_cap() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 0).await;
        // share_post: 1 point, cap 5.
        let rule = rule_of(ActionType::SharePost);

        let tasks = (0..20).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .apply_award(&rule, &credit_for(user_id, &rule), today())
                    .await
                    .unwrap()
            })
        });
        let awarded = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(AwardOutcome::Awarded { .. })))
            .count();

        assert_eq!(awarded, 5);
        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 5);
    }

    #[tokio::test]
    async fn admin_grants_repeat_without_cap() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let rule = PointsConfig::default().admin_grant(500).unwrap();

        for _ in 0..2 {
            let tx = PointsTransaction::credit(
                user_id,
                ActionType::AdminGrant,
                500,
                serde_json::json!({ "reason": "event prize" }),
            );
            let outcome = store.apply_award(&rule, &tx, today()).await.unwrap();
            assert!(matches!(outcome, AwardOutcome::Awarded { .. }));
        }

        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 1000);
        assert_eq!(account.total_earned, 1000);
    }

    #[tokio::test]
    async fn debit_is_conditional() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 100).await;

        let outcome = store.debit(&user_id, 150).await.unwrap();
        assert_eq!(
            outcome,
            DebitOutcome::Insufficient {
                balance: Balance {
                    points: 100,
                    total_earned: 100
                }
            }
        );

        let outcome = store.debit(&user_id, 100).await.unwrap();
        assert!(matches!(
            outcome,
            DebitOutcome::Debited {
                balance: Balance { points: 0, .. }
            }
        ));

        let missing = store.debit(&UserId::generate(), 1).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 300).await;

        let tasks = (0..10).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.debit(&user_id, 100).await.unwrap() })
        });
        let debited = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(DebitOutcome::Debited { .. })))
            .count();

        assert_eq!(debited, 3);
        let account = store.get_account(&user_id).await.unwrap().unwrap();
        assert_eq!(account.points, 0);
    }

    fn purchase_of(user_id: UserId, item: &str, price: i64) -> (OwnedItem, PointsTransaction) {
        (
            OwnedItem::new(user_id, slug(item), price),
            PointsTransaction::purchase(user_id, &slug(item), price),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn grant_is_unique_and_records_one_debit() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 0).await;

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let (item, debit) = purchase_of(user_id, "red-scarf", 150);
                store.grant_item(&item, &debit).await
            })
        });
        let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::AlreadyExists { .. })));

        let owned = store.list_owned_items(&user_id).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(store
            .get_owned_item(&user_id, &slug("red-scarf"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_owned_item(&user_id, &slug("straw-hat"))
            .await
            .unwrap()
            .is_none());

        // Losing grants wrote nothing, so exactly one debit is on record.
        let debits: Vec<_> = store
            .list_transactions_by_user(&user_id, 20, 0)
            .await
            .unwrap()
            .into_iter()
            .filter(|tx| tx.action_type == ActionType::Purchase)
            .collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].points_delta, -150);
    }

    #[tokio::test]
    async fn grant_writes_ownership_and_debit_together() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let (item, debit) = purchase_of(user_id, "straw-hat", 120);

        store.grant_item(&item, &debit).await.unwrap();

        let owned = store.list_owned_items(&user_id).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].purchase_price, 120);

        let history = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        assert_eq!(history[0].id, debit.id);
        assert_eq!(history[0].metadata["item_slug"], "straw-hat");
        // The grant leaves the balance to the debit step.
        assert_eq!(store.get_account(&user_id).await.unwrap().unwrap().points, 0);
    }

    #[tokio::test]
    async fn refund_restores_points_and_logs_pair() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 300).await;

        store.debit(&user_id, 150).await.unwrap();
        let debit = PointsTransaction::purchase(user_id, &slug("red-scarf"), 150);
        let refund = PointsTransaction::purchase_refund(
            user_id,
            &slug("red-scarf"),
            150,
            debit.id,
            "already_owned",
        );

        let balance = store.refund(&debit, &refund).await.unwrap();
        assert_eq!(balance.points, 300);
        assert_eq!(balance.total_earned, 300);

        let history = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        let net: i64 = history
            .iter()
            .filter(|tx| tx.action_type != ActionType::AdminGrant)
            .map(|tx| tx.points_delta)
            .sum();
        assert_eq!(net, 0);
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paginates() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0).await;
        let rule = rule_of(ActionType::CreateComment);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let tx = credit_for(user_id, &rule);
            ids.push(tx.id);
            store.apply_award(&rule, &tx, today()).await.unwrap();
        }

        let all = store.list_transactions_by_user(&user_id, 10, 0).await.unwrap();
        let listed: Vec<_> = all.iter().map(|tx| tx.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);

        let page = store.list_transactions_by_user(&user_id, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);

        let past_end = store.list_transactions_by_user(&user_id, 10, 5).await.unwrap();
        assert!(past_end.is_empty());

        // Other users' history is not mixed in.
        let other = funded_account(&store, 10).await;
        assert_eq!(
            store.list_transactions_by_user(&other, 10, 0).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn leaderboard_sorted_descending() {
        let (store, _dir) = create_test_store();
        for points in [30, 500, 0, 120, 120] {
            funded_account(&store, points).await;
        }

        let board = store.leaderboard(10).await.unwrap();
        let points: Vec<i64> = board.iter().map(|e| e.points).collect();
        assert_eq!(points, [500, 120, 120, 30, 0]);

        let top = store.leaderboard(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].points, 500);
    }

    #[tokio::test]
    async fn equipped_snapshot_roundtrip() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        assert!(store.get_equipped(&user_id).await.unwrap().is_none());

        let snapshot = EquippedSnapshot {
            character_slug: Some(slug("shiba-inu")),
            accessory_slugs: vec![slug("red-scarf")],
            display: serde_json::json!({ "shiba-inu": { "image": "/x.png" } }),
            updated_at: Some(Utc::now()),
        };
        store.put_equipped(&user_id, &snapshot).await.unwrap();

        let stored = store.get_equipped(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.character_slug, snapshot.character_slug);
        assert_eq!(stored.accessory_slugs, snapshot.accessory_slugs);
        assert_eq!(stored.display, snapshot.display);
    }
}
