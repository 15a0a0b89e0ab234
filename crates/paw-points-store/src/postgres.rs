//! PostgreSQL storage implementation.
//!
//! Awards and refunds run inside a transaction that first takes a row lock on
//! the balance (`SELECT ... FOR UPDATE`). Debits are a single conditional
//! `UPDATE`. Ownership relies on the `(user_id, item_slug)` primary key and is
//! written in the same transaction as its debit record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgExecutor;
use uuid::Uuid;

use paw_points_core::{
    Account, AwardRule, Balance, EquippedSnapshot, ItemSlug, LeaderboardEntry, OwnedItem,
    PointsTransaction, UserId,
};

use crate::error::{Result, StoreError};
use crate::{AwardOutcome, DebitOutcome, Store};

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to the given database URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations completed");
        Ok(())
    }
}

fn limit_param(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

async fn insert_transaction<'e, E: PgExecutor<'e>>(
    executor: E,
    transaction: &PointsTransaction,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO point_transactions (
            transaction_id, user_id, action_type, points_delta, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(transaction.id.to_string())
    .bind(transaction.user_id.as_uuid())
    .bind(transaction.action_type.as_str())
    .bind(transaction.points_delta)
    .bind(&transaction.metadata)
    .bind(transaction.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO point_balances (user_id, points, total_earned, is_admin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(account.user_id.as_uuid())
        .bind(account.points)
        .bind(account.total_earned)
        .bind(account.is_admin)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r"
            SELECT user_id, points, total_earned, is_admin, created_at, updated_at
            FROM point_balances
            WHERE user_id = $1
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccountRow::into_account))
    }

    async fn set_admin(&self, user_id: &UserId, is_admin: bool) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE point_balances SET is_admin = $2, updated_at = now() WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(is_admin)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::account_not_found(user_id));
        }
        Ok(())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r"
            SELECT user_id, points
            FROM point_balances
            ORDER BY points DESC, created_at ASC
            LIMIT $1
            ",
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, points)| LeaderboardEntry {
                user_id: UserId::from_uuid(user_id),
                points,
            })
            .collect())
    }

    async fn apply_award(
        &self,
        rule: &AwardRule,
        transaction: &PointsTransaction,
        day_start: DateTime<Utc>,
    ) -> Result<AwardOutcome> {
        let user_id = &transaction.user_id;
        let mut tx = self.pool.begin().await?;

        // Row lock: concurrent awards for this user queue here.
        let balance = sqlx::query_as::<_, BalanceRow>(
            "SELECT points, total_earned FROM point_balances WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::account_not_found(user_id))?
        .into_balance();

        if rule.one_time {
            let already = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS(
                    SELECT 1 FROM point_transactions
                    WHERE user_id = $1 AND action_type = $2 AND points_delta <> 0
                )
                ",
            )
            .bind(user_id.as_uuid())
            .bind(rule.action.as_str())
            .fetch_one(&mut *tx)
            .await?;

            if already {
                return Ok(AwardOutcome::AlreadyAwarded { balance });
            }
        }

        if let Some(cap) = rule.daily_cap {
            let awarded_today = sqlx::query_scalar::<_, i64>(
                r"
                SELECT COALESCE(SUM(points_delta), 0)::BIGINT
                FROM point_transactions
                WHERE user_id = $1 AND action_type = $2 AND created_at >= $3
                ",
            )
            .bind(user_id.as_uuid())
            .bind(rule.action.as_str())
            .bind(day_start)
            .fetch_one(&mut *tx)
            .await?;

            if awarded_today.saturating_add(rule.points) > cap {
                return Ok(AwardOutcome::DailyCapReached {
                    balance,
                    awarded_today,
                });
            }
        }

        let earned = if rule.action.counts_as_earned() {
            rule.points
        } else {
            0
        };

        let balance = sqlx::query_as::<_, BalanceRow>(
            r"
            UPDATE point_balances
            SET points = points + $2, total_earned = total_earned + $3, updated_at = now()
            WHERE user_id = $1
            RETURNING points, total_earned
            ",
        )
        .bind(user_id.as_uuid())
        .bind(rule.points)
        .bind(earned)
        .fetch_one(&mut *tx)
        .await?
        .into_balance();

        insert_transaction(&mut *tx, transaction).await?;
        tx.commit().await?;

        Ok(AwardOutcome::Awarded { balance })
    }

    async fn debit(&self, user_id: &UserId, amount: i64) -> Result<DebitOutcome> {
        let debited = sqlx::query_as::<_, BalanceRow>(
            r"
            UPDATE point_balances
            SET points = points - $2, updated_at = now()
            WHERE user_id = $1 AND points >= $2
            RETURNING points, total_earned
            ",
        )
        .bind(user_id.as_uuid())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = debited {
            return Ok(DebitOutcome::Debited {
                balance: row.into_balance(),
            });
        }

        let current = sqlx::query_as::<_, BalanceRow>(
            "SELECT points, total_earned FROM point_balances WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::account_not_found(user_id))?;

        Ok(DebitOutcome::Insufficient {
            balance: current.into_balance(),
        })
    }

    async fn refund(
        &self,
        debit: &PointsTransaction,
        refund: &PointsTransaction,
    ) -> Result<Balance> {
        let user_id = &refund.user_id;
        let mut tx = self.pool.begin().await?;

        let balance = sqlx::query_as::<_, BalanceRow>(
            r"
            UPDATE point_balances
            SET points = points + $2, updated_at = now()
            WHERE user_id = $1
            RETURNING points, total_earned
            ",
        )
        .bind(user_id.as_uuid())
        .bind(refund.points_delta)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::account_not_found(user_id))?
        .into_balance();

        insert_transaction(&mut *tx, debit).await?;
        insert_transaction(&mut *tx, refund).await?;
        tx.commit().await?;

        Ok(balance)
    }

    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT transaction_id, user_id, action_type, points_delta, metadata, created_at
            FROM point_transactions
            WHERE user_id = $1
            ORDER BY transaction_id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id.as_uuid())
        .bind(limit_param(limit))
        .bind(limit_param(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    async fn get_owned_item(
        &self,
        user_id: &UserId,
        item_slug: &ItemSlug,
    ) -> Result<Option<OwnedItem>> {
        let row = sqlx::query_as::<_, OwnedItemRow>(
            r"
            SELECT user_id, item_slug, purchase_price, purchased_at
            FROM owned_items
            WHERE user_id = $1 AND item_slug = $2
            ",
        )
        .bind(user_id.as_uuid())
        .bind(item_slug.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OwnedItemRow::into_owned_item).transpose()
    }

    async fn grant_item(&self, item: &OwnedItem, debit: &PointsTransaction) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            INSERT INTO owned_items (user_id, item_slug, purchase_price, purchased_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(item.user_id.as_uuid())
        .bind(item.item_slug.as_str())
        .bind(item.purchase_price)
        .bind(item.purchased_at)
        .execute(&mut *tx)
        .await;

        // Dropping `tx` on the error paths rolls the insert back.
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::AlreadyExists {
                    entity: "owned item",
                    id: format!("{}/{}", item.user_id, item.item_slug),
                });
            }
            Err(e) => return Err(e.into()),
        }

        insert_transaction(&mut *tx, debit).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn list_owned_items(&self, user_id: &UserId) -> Result<Vec<OwnedItem>> {
        let rows = sqlx::query_as::<_, OwnedItemRow>(
            r"
            SELECT user_id, item_slug, purchase_price, purchased_at
            FROM owned_items
            WHERE user_id = $1
            ORDER BY item_slug
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OwnedItemRow::into_owned_item).collect()
    }

    async fn get_equipped(&self, user_id: &UserId) -> Result<Option<EquippedSnapshot>> {
        let row = sqlx::query_as::<_, EquippedRow>(
            r"
            SELECT character_slug, accessory_slugs, display, updated_at
            FROM equipped_snapshots
            WHERE user_id = $1
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EquippedRow::into_snapshot).transpose()
    }

    async fn put_equipped(&self, user_id: &UserId, snapshot: &EquippedSnapshot) -> Result<()> {
        let accessories: Vec<String> = snapshot
            .accessory_slugs
            .iter()
            .map(|slug| slug.as_str().to_string())
            .collect();

        sqlx::query(
            r"
            INSERT INTO equipped_snapshots (user_id, character_slug, accessory_slugs, display, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                character_slug = EXCLUDED.character_slug,
                accessory_slugs = EXCLUDED.accessory_slugs,
                display = EXCLUDED.display,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(user_id.as_uuid())
        .bind(snapshot.character_slug.as_ref().map(ItemSlug::as_str))
        .bind(accessories)
        .bind(&snapshot.display)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Row types
// =============================================================================

fn parse_column<T>(column: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Serialization(format!("{column} {value:?}: {e}")))
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: Uuid,
    points: i64,
    total_earned: i64,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            user_id: UserId::from_uuid(self.user_id),
            points: self.points,
            total_earned: self.total_earned,
            is_admin: self.is_admin,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BalanceRow {
    points: i64,
    total_earned: i64,
}

impl BalanceRow {
    const fn into_balance(self) -> Balance {
        Balance {
            points: self.points,
            total_earned: self.total_earned,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    user_id: Uuid,
    action_type: String,
    points_delta: i64,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<PointsTransaction> {
        Ok(PointsTransaction {
            id: parse_column("transaction_id", &self.transaction_id)?,
            user_id: UserId::from_uuid(self.user_id),
            action_type: parse_column("action_type", &self.action_type)?,
            points_delta: self.points_delta,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OwnedItemRow {
    user_id: Uuid,
    item_slug: String,
    purchase_price: i64,
    purchased_at: DateTime<Utc>,
}

impl OwnedItemRow {
    fn into_owned_item(self) -> Result<OwnedItem> {
        Ok(OwnedItem {
            user_id: UserId::from_uuid(self.user_id),
            item_slug: parse_column("item_slug", &self.item_slug)?,
            purchase_price: self.purchase_price,
            purchased_at: self.purchased_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EquippedRow {
    character_slug: Option<String>,
    accessory_slugs: Vec<String>,
    display: serde_json::Value,
    updated_at: Option<DateTime<Utc>>,
}

impl EquippedRow {
    fn into_snapshot(self) -> Result<EquippedSnapshot> {
        let character_slug = self
            .character_slug
            .as_deref()
            .map(|slug| parse_column("character_slug", slug))
            .transpose()?;
        let accessory_slugs = self
            .accessory_slugs
            .iter()
            .map(|slug| parse_column("accessory_slugs", slug))
            .collect::<Result<Vec<ItemSlug>>>()?;

        Ok(EquippedSnapshot {
            character_slug,
            accessory_slugs,
            display: self.display,
            updated_at: self.updated_at,
        })
    }
}
