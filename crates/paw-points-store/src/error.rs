//! Error types for paw-points storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting key.
        id: String,
    },
}

impl StoreError {
    pub(crate) fn account_not_found(user_id: &paw_points_core::UserId) -> Self {
        Self::NotFound {
            entity: "account",
            id: user_id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {err}"))
    }
}

#[cfg(feature = "rocksdb-backend")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for paw_points_core::PointsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: "account",
                id,
            } => Self::AccountNotFound { user_id: id },
            other => Self::Storage(other.to_string()),
        }
    }
}
