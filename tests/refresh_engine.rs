//! End-to-end tests for the refresh engine: mock HTTP feeds on one side,
//! a SQLite store on the other (in memory, or a temp file where concurrent
//! writers matter).

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use suprss::feed::{build_client, RefreshOutcome, RefreshSettings, Refresher, SweepReport};
use suprss::feed::{Validators, DEFAULT_USER_AGENT, MAX_TITLE_CHARS};
use suprss::storage::{Database, NewFeed};
use wiremock::matchers::{header, headers, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// RSS document with one item per `(link, title)`; an empty link omits `<link>`
fn rss(items: &[(&str, &str)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>"#);
    for (link, title) in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{title}</title>"));
        if !link.is_empty() {
            body.push_str(&format!("<link>{link}</link>"));
        }
        body.push_str("<description>Body</description></item>");
    }
    body.push_str("</channel></rss>");
    body
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn engine(urls: &[String]) -> (Arc<Refresher>, Vec<i64>) {
    let db = Database::open(":memory:").await.unwrap();
    engine_on(db, urls, RefreshSettings::default()).await
}

async fn engine_on(
    db: Database,
    urls: &[String],
    settings: RefreshSettings,
) -> (Arc<Refresher>, Vec<i64>) {
    let cid = db.create_collection("Shared", 1).await.unwrap();
    let mut ids = Vec::new();
    for url in urls {
        let id = db
            .insert_feed(&NewFeed {
                collection_id: cid,
                url: url.clone(),
                title: url.clone(),
                description: None,
            })
            .await
            .unwrap();
        ids.push(id);
    }
    let client = build_client(DEFAULT_USER_AGENT).unwrap();
    let refresher = Refresher::new(db, client, settings);
    (Arc::new(refresher), ids)
}

/// Fresh directory for a file-backed database
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("suprss_{name}_{}", std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn titles(refresher: &Refresher, feed_id: i64) -> Vec<String> {
    let mut titles: Vec<_> = refresher
        .database()
        .get_articles_for_feed(feed_id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    titles.sort();
    titles
}

#[tokio::test]
async fn refresh_twice_inserts_nothing_new() {
    let server = MockServer::start().await;
    let body = rss(&[
        ("https://example.com/a", "A"),
        ("https://example.com/b", "B"),
        ("https://example.com/c", "C"),
    ]);
    serve(&server, "/feed", body).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let first = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(first, RefreshOutcome { inserted: 3 });

    let second = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(second, RefreshOutcome { inserted: 0 });
    assert_eq!(titles(&refresher, ids[0]).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn same_link_different_title_keeps_first() {
    let server = MockServer::start().await;
    let body = rss(&[
        ("https://example.com/a", "Original"),
        ("https://example.com/a", "Edited"),
    ]);
    serve(&server, "/feed", body).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let outcome = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(outcome.inserted, 1);
    assert_eq!(titles(&refresher, ids[0]).await, vec!["Original"]);
}

#[tokio::test]
async fn linkless_entries_with_same_title_keep_first() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss(&[("", "Weekly notes"), ("", "Weekly notes")])).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let outcome = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(outcome.inserted, 1);
}

#[tokio::test]
async fn linkless_entries_with_distinct_titles_are_both_kept() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss(&[("", "Monday"), ("", "Tuesday")])).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let outcome = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(outcome.inserted, 2);
    assert_eq!(titles(&refresher, ids[0]).await, vec!["Monday", "Tuesday"]);
}

#[tokio::test]
async fn repeated_link_within_one_fetch_is_ingested_once() {
    let server = MockServer::start().await;
    let body = rss(&[
        ("https://example.com/a", "A"),
        ("https://example.com/b", "B"),
        ("https://example.com/a", "A again"),
        ("https://example.com/c", "C"),
    ]);
    serve(&server, "/feed", body).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let outcome = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(outcome.inserted, 3);
    assert_eq!(titles(&refresher, ids[0]).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn long_title_is_stored_truncated() {
    let server = MockServer::start().await;
    let long = "t".repeat(300);
    serve(&server, "/feed", rss(&[("https://example.com/long", &long)])).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    refresher.refresh_feed(ids[0]).await.unwrap();

    let stored = titles(&refresher, ids[0]).await;
    assert_eq!(stored, vec!["t".repeat(MAX_TITLE_CHARS)]);
}

#[tokio::test]
async fn not_modified_keeps_cached_etag_and_skips_ingestion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("If-None-Match", "abc123"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[("https://example.com/a", "A")]))
                .insert_header("ETag", "abc123"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let first = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(
        refresher.cache().get(ids[0]),
        Validators {
            etag: Some("abc123".into()),
            last_modified: None,
        }
    );

    let second = refresher.refresh_feed(ids[0]).await.unwrap();
    assert_eq!(second, RefreshOutcome { inserted: 0 });
    assert_eq!(refresher.cache().get(ids[0]).etag.as_deref(), Some("abc123"));
    assert_eq!(
        refresher
            .database()
            .count_articles_for_feed(ids[0])
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn sweep_isolates_failing_feed() {
    let server = MockServer::start().await;
    serve(&server, "/one", rss(&[("https://example.com/1", "One")])).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    serve(&server, "/two", rss(&[("https://example.com/2", "Two")])).await;

    let urls: Vec<String> = ["/one", "/broken", "/two"]
        .iter()
        .map(|p| format!("{}{p}", server.uri()))
        .collect();
    let (refresher, ids) = engine(&urls).await;

    let report = refresher.sweep().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            feeds: 3,
            failed: 1,
            not_modified: 0,
            inserted: 2,
        }
    );

    let broken = refresher.database().get_feed(ids[1]).await.unwrap().unwrap();
    assert!(broken.error.is_some());
    assert_eq!(titles(&refresher, ids[2]).await, vec!["Two"]);
}

#[tokio::test]
async fn second_sweep_uses_cached_validators() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(headers(
            "If-Modified-Since",
            vec!["Wed", "21 Oct 2015 07:28:00 GMT"],
        ))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[("https://example.com/a", "A")]))
                .insert_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        )
        .mount(&server)
        .await;
    let (refresher, _) = engine(&[format!("{}/feed", server.uri())]).await;

    let first = refresher.sweep().await.unwrap();
    assert_eq!(first.inserted, 1);

    let second = refresher.sweep().await.unwrap();
    assert_eq!(
        second,
        SweepReport {
            feeds: 1,
            failed: 0,
            not_modified: 1,
            inserted: 0,
        }
    );
}

#[tokio::test]
async fn overlapping_sweep_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[
                    ("https://example.com/a", "A"),
                    ("https://example.com/b", "B"),
                ]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;

    let running = Arc::clone(&refresher);
    let first = tokio::spawn(async move { running.sweep().await });

    for _ in 0..100 {
        if refresher.is_sweeping() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(refresher.sweep().await, None);

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(
        refresher
            .database()
            .count_articles_for_feed(ids[0])
            .await
            .unwrap(),
        2
    );

    // The guard is released once the sweep ends
    assert!(refresher.sweep().await.is_some());
}

#[tokio::test]
async fn on_demand_refresh_during_sweep_shares_the_store() {
    let server = MockServer::start().await;
    for route in ["/slow", "/fast"] {
        let items: Vec<(String, String)> = (0..40)
            .map(|n| (format!("https://example.com{route}/{n}"), format!("{route} {n}")))
            .collect();
        let items: Vec<(&str, &str)> = items
            .iter()
            .map(|(link, title)| (link.as_str(), title.as_str()))
            .collect();
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss(&items))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let dir = temp_dir("overlap");
    let db = Database::open(dir.join("suprss.db").to_str().unwrap())
        .await
        .unwrap();
    let urls = vec![format!("{}/slow", server.uri()), format!("{}/fast", server.uri())];
    let (refresher, ids) = engine_on(db, &urls, RefreshSettings::default()).await;

    let sweeping = Arc::clone(&refresher);
    let sweep = tokio::spawn(async move { sweeping.sweep().await });
    let on_demand = refresher.refresh_feed(ids[1]).await.unwrap();
    let report = sweep.await.unwrap().unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.inserted + on_demand.inserted, 80);
    for id in &ids {
        let feed = refresher.database().get_feed(*id).await.unwrap().unwrap();
        assert_eq!(feed.error, None);
        assert_eq!(
            refresher.database().count_articles_for_feed(*id).await.unwrap(),
            40
        );
    }

    drop(refresher);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn slow_persist_does_not_time_out_pending_fetches() {
    let server = MockServer::start().await;
    serve(&server, "/fast", rss(&[("https://example.com/fast", "Fast")])).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[("https://example.com/slow", "Slow")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = temp_dir("slow_persist");
    let db = Database::open(dir.join("suprss.db").to_str().unwrap())
        .await
        .unwrap();
    let urls = vec![format!("{}/fast", server.uri()), format!("{}/slow", server.uri())];
    let settings = RefreshSettings {
        fetch_timeout: Duration::from_secs(1),
        max_concurrent_fetches: 2,
    };
    let (refresher, ids) = engine_on(db, &urls, settings).await;

    // Another writer holds the lock past the fetch timeout, so persisting
    // the first fetched feed stalls while the second is still in flight.
    let writer = refresher.database().begin_ingest(ids[0]).await.unwrap();
    let sweeping = Arc::clone(&refresher);
    let sweep = tokio::spawn(async move { sweeping.sweep().await });
    tokio::time::sleep(Duration::from_millis(1500)).await;
    writer.commit().await.unwrap();

    let report = sweep.await.unwrap().unwrap();
    assert_eq!(
        report,
        SweepReport {
            feeds: 2,
            failed: 0,
            not_modified: 0,
            inserted: 2,
        }
    );
    assert_eq!(titles(&refresher, ids[1]).await, vec!["Slow"]);

    drop(refresher);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn collection_refresh_keeps_one_linkless_entry_per_title() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss(&[("", "Same"), ("", "Same")])).await;
    let (refresher, ids) = engine(&[format!("{}/feed", server.uri())]).await;
    let feed = refresher.database().get_feed(ids[0]).await.unwrap().unwrap();

    let outcome = refresher.refresh_collection(feed.collection_id).await.unwrap();
    assert_eq!(outcome, RefreshOutcome { inserted: 1 });
    assert_eq!(titles(&refresher, ids[0]).await, vec!["Same"]);
}
