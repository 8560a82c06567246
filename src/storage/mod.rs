//! SQLite persistence: the feed registry, the article store, and per-user
//! article flags.

mod articles;
mod feeds;
mod schema;
mod types;

pub use articles::IngestBatch;
pub use schema::Database;
pub use types::{Article, Collection, DatabaseError, Feed, NewArticle, NewFeed};
