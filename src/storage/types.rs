use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a write lock on the database file
    #[error("The database is locked by another process. Please retry shortly.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`DatabaseError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface only through their messages
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

// ============================================================================
// Write Types
// ============================================================================

/// An article ready to be stored.
///
/// Built by the ingester from a normalized feed entry; the title is
/// already truncated to [`crate::feed::MAX_TITLE_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub feed_id: i64,
    pub title: String,
    pub content: String,
    pub link: String,
}

/// A feed registration request
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub collection_id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A named group of feeds owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: i64,
}

/// Feed data from database
///
/// `url` never changes after creation. `last_fetched` and `error` are the
/// polling metadata written by the refresh paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub collection_id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub last_fetched: Option<i64>,
    pub error: Option<String>,
}

/// Article data from database
///
/// Articles are immutable snapshots of a feed entry at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub content: String,
    pub link: String,
    pub fetched_at: i64,
}
