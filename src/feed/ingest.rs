use anyhow::Result;

use crate::feed::parser::NormalizedEntry;
use crate::storage::{IngestBatch, NewArticle};
use crate::util::truncate_chars;

/// Maximum stored title length, in characters
pub const MAX_TITLE_CHARS: usize = 255;

/// Build the article row for an entry: title capped at [`MAX_TITLE_CHARS`],
/// summary kept verbatim as content.
pub fn to_new_article(feed_id: i64, entry: &NormalizedEntry) -> NewArticle {
    NewArticle {
        feed_id,
        title: truncate_chars(&entry.title, MAX_TITLE_CHARS).into_owned(),
        content: entry.summary.clone(),
        link: entry.link.clone(),
    }
}

/// Persist one entry into the batch, returns the new article ID.
///
/// Performs no duplicate check; callers consult a
/// [`DedupJudge`](crate::feed::DedupJudge) first.
pub async fn ingest(batch: &mut IngestBatch, entry: &NormalizedEntry) -> Result<i64> {
    let article = to_new_article(batch.feed_id(), entry);
    batch.insert_article(&article).await
}
