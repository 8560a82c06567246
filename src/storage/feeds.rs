use anyhow::Result;

use super::schema::Database;
use super::types::{Collection, Feed, NewFeed};

impl Database {
    // ========================================================================
    // Collection Operations
    // ========================================================================

    /// Create a collection owned by `owner_id`, returns its ID
    pub async fn create_collection(&self, name: &str, owner_id: i64) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO collections (name, owner_id, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(owner_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_collection(&self, collection_id: i64) -> Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(
            "SELECT id, name, owner_id, created_at FROM collections WHERE id = ?",
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(collection)
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections = sqlx::query_as::<_, Collection>(
            "SELECT id, name, owner_id, created_at FROM collections ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(collections)
    }

    /// Delete a collection and, via cascade, its feeds, articles and flags.
    ///
    /// Returns `false` if no collection had that ID.
    pub async fn delete_collection(&self, collection_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Feed Registry
    // ========================================================================

    /// Register a feed in a collection, returns the new feed ID.
    ///
    /// The URL is stored as given; validation is the caller's concern
    /// (see [`crate::util::validate_url`]). Fails if the collection does not
    /// exist (foreign key).
    pub async fn insert_feed(&self, feed: &NewFeed) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (collection_id, url, title, description)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(feed.collection_id)
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.description)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(feed_id = id, collection_id = feed.collection_id, url = %feed.url, "Feed registered");
        Ok(id)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, collection_id, url, title, description, last_fetched, error
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Every feed across all collections, ordered by ID
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, collection_id, url, title, description, last_fetched, error
            FROM feeds
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn list_feeds_in_collection(&self, collection_id: i64) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, collection_id, url, title, description, last_fetched, error
            FROM feeds
            WHERE collection_id = ?
            ORDER BY id
        "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Delete a feed and, via cascade, its articles and their flags.
    ///
    /// Returns `false` if no feed had that ID.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Polling Metadata
    // ========================================================================

    /// Set or clear the error status for a feed
    pub async fn set_feed_error(&self, feed_id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE feeds SET error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a successful refresh: stamp `last_fetched` and clear the error
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE feeds SET last_fetched = ?, error = NULL WHERE id = ?")
            .bind(now)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
