use anyhow::Result;
use sqlx::{Sqlite, Transaction};

use super::schema::Database;
use super::types::{Article, NewArticle};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

// ============================================================================
// Executor-generic lookups
// ============================================================================
//
// Shared by the pool-level API and by `IngestBatch`. `before_id` bounds the
// lookup to rows older than the given ID; the pool-level API passes
// `i64::MAX`.

async fn find_by_link<'e, E>(
    executor: E,
    feed_id: i64,
    link: &str,
    before_id: i64,
) -> sqlx::Result<Option<Article>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Article>(
        r#"
        SELECT id, feed_id, title, content, link, fetched_at
        FROM articles
        WHERE feed_id = ? AND link = ? AND id < ?
        LIMIT 1
    "#,
    )
    .bind(feed_id)
    .bind(link)
    .bind(before_id)
    .fetch_optional(executor)
    .await
}

async fn find_by_title<'e, E>(
    executor: E,
    feed_id: i64,
    title: &str,
    before_id: i64,
) -> sqlx::Result<Option<Article>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Article>(
        r#"
        SELECT id, feed_id, title, content, link, fetched_at
        FROM articles
        WHERE feed_id = ? AND title = ? AND id < ?
        LIMIT 1
    "#,
    )
    .bind(feed_id)
    .bind(title)
    .bind(before_id)
    .fetch_optional(executor)
    .await
}

async fn insert_article<'e, E>(
    executor: E,
    article: &NewArticle,
    fetched_at: i64,
) -> sqlx::Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO articles (feed_id, title, content, link, fetched_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
    "#,
    )
    .bind(article.feed_id)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.link)
    .bind(fetched_at)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

// ============================================================================
// Ingest Batch
// ============================================================================

/// One feed's uncommitted refresh work.
///
/// Wraps a transaction: nothing becomes visible to other connections until
/// [`IngestBatch::commit`], and dropping the batch without committing rolls
/// everything back, isolating a failed feed from the rest of a sweep.
///
/// Lookups only match articles stored before the batch's first insert.
/// Entries of the same fetch are compared with each other by the caller.
pub struct IngestBatch {
    tx: Transaction<'static, Sqlite>,
    feed_id: i64,
    fetched_at: i64,
    inserted: usize,
    first_inserted: Option<i64>,
}

impl IngestBatch {
    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }

    /// Number of articles inserted so far in this batch
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub async fn find_by_link(&mut self, link: &str) -> Result<Option<Article>> {
        let before = self.watermark();
        Ok(find_by_link(&mut *self.tx, self.feed_id, link, before).await?)
    }

    pub async fn find_by_title(&mut self, title: &str) -> Result<Option<Article>> {
        let before = self.watermark();
        Ok(find_by_title(&mut *self.tx, self.feed_id, title, before).await?)
    }

    // Rowids only grow while the transaction holds the write lock, so
    // everything at or above the first insert belongs to this batch.
    fn watermark(&self) -> i64 {
        self.first_inserted.unwrap_or(i64::MAX)
    }

    /// Insert an article into this batch, returns its ID
    pub async fn insert_article(&mut self, article: &NewArticle) -> Result<i64> {
        debug_assert_eq!(article.feed_id, self.feed_id);
        let id = insert_article(&mut *self.tx, article, self.fetched_at).await?;
        self.first_inserted.get_or_insert(id);
        self.inserted += 1;
        Ok(id)
    }

    /// Commit the batch, stamping the feed as successfully fetched in the
    /// same transaction. Returns the number of inserted articles.
    pub async fn commit(mut self) -> Result<usize> {
        sqlx::query("UPDATE feeds SET last_fetched = ?, error = NULL WHERE id = ?")
            .bind(self.fetched_at)
            .bind(self.feed_id)
            .execute(&mut *self.tx)
            .await?;
        self.tx.commit().await?;
        Ok(self.inserted)
    }
}

impl Database {
    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Open a transaction for one feed's refresh.
    ///
    /// The write lock is taken up front: a deferred transaction that has
    /// already read cannot wait for another writer and fails with
    /// SQLITE_BUSY on its first insert, bypassing `busy_timeout`.
    pub async fn begin_ingest(&self, feed_id: i64) -> Result<IngestBatch> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(IngestBatch {
            tx,
            feed_id,
            fetched_at: chrono::Utc::now().timestamp(),
            inserted: 0,
            first_inserted: None,
        })
    }

    /// Insert a single article outside of a refresh batch (manual insert path)
    pub async fn insert_article(&self, article: &NewArticle) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        Ok(insert_article(&self.pool, article, now).await?)
    }

    pub async fn find_by_link(&self, feed_id: i64, link: &str) -> Result<Option<Article>> {
        Ok(find_by_link(&self.pool, feed_id, link, i64::MAX).await?)
    }

    pub async fn find_by_title(&self, feed_id: i64, title: &str) -> Result<Option<Article>> {
        Ok(find_by_title(&self.pool, feed_id, title, i64::MAX).await?)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get articles for a feed, newest first.
    /// The limit defaults to 500 and is capped at MAX_ARTICLES (2000).
    pub async fn get_articles_for_feed(
        &self,
        feed_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Article>> {
        let limit = limit.unwrap_or(500).min(MAX_ARTICLES);
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, feed_id, title, content, link, fetched_at
            FROM articles
            WHERE feed_id = ?
            ORDER BY id DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn get_article_by_id(&self, article_id: i64) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            "SELECT id, feed_id, title, content, link, fetched_at FROM articles WHERE id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    /// Count articles stored for a feed
    pub async fn count_articles_for_feed(&self, feed_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete one article and its flags. Returns `false` if it did not exist.
    pub async fn delete_article(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Per-user Flags
    // ========================================================================

    /// Mark article as read for a user (idempotent), returns whether it changed
    pub async fn mark_article_read(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO article_reads (user_id, article_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(article_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark article as unread for a user (idempotent), returns whether it changed
    pub async fn mark_article_unread(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM article_reads WHERE user_id = ? AND article_id = ?")
            .bind(user_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_article_read(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM article_reads WHERE user_id = ? AND article_id = ?")
                .bind(user_id)
                .bind(article_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Star or unstar an article for a user
    pub async fn set_article_starred(
        &self,
        user_id: i64,
        article_id: i64,
        starred: bool,
    ) -> Result<()> {
        let query = if starred {
            "INSERT OR IGNORE INTO article_stars (user_id, article_id) VALUES (?, ?)"
        } else {
            "DELETE FROM article_stars WHERE user_id = ? AND article_id = ?"
        };
        sqlx::query(query)
            .bind(user_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_article_starred(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM article_stars WHERE user_id = ? AND article_id = ?")
                .bind(user_id)
                .bind(article_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}
