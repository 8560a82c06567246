use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseFeedError};

/// Title given to entries that carry none
pub const UNTITLED: &str = "(untitled)";

/// One feed entry reduced to the fields the engine stores.
///
/// Every field is always present: missing values are defaulted rather than
/// failing the whole feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    /// Entry link, empty if the entry has none
    pub link: String,
    /// Entry title, [`UNTITLED`] if absent or blank
    pub title: String,
    /// Summary (Atom) or description (RSS), empty if absent
    pub summary: String,
}

/// Parse an RSS or Atom document into normalized entries, in document order.
///
/// # Errors
///
/// Fails only when the document as a whole is not a recognizable feed.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<NormalizedEntry>, ParseFeedError> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(normalize).collect())
}

fn normalize(entry: Entry) -> NormalizedEntry {
    let link = pick_link(&entry.links).unwrap_or_default();

    let title = entry
        .title
        .map(|t| t.content)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    // feed-rs maps both RSS <description> and Atom <summary> onto `summary`
    let summary = entry.summary.map(|s| s.content).unwrap_or_default();

    NormalizedEntry {
        link,
        title,
        summary,
    }
}

/// The `alternate` link (or one without a relation) wins over
/// `enclosure`, `related`, `self` and friends; otherwise the first link.
fn pick_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rss_entries_in_order() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>First</title><link>https://example.com/1</link><description>One</description></item>
    <item><title>Second</title><link>https://example.com/2</link><description>Two</description></item>
</channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                NormalizedEntry {
                    link: "https://example.com/1".into(),
                    title: "First".into(),
                    summary: "One".into(),
                },
                NormalizedEntry {
                    link: "https://example.com/2".into(),
                    title: "Second".into(),
                    summary: "Two".into(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><description>Only a body</description></item>
    <item><title></title></item>
</channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].link, "");
        assert_eq!(entries[0].title, UNTITLED);
        assert_eq!(entries[0].summary, "Only a body");

        assert_eq!(entries[1].title, UNTITLED);
        assert_eq!(entries[1].summary, "");
    }

    #[test]
    fn test_atom_summary_and_alternate_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title>
  <id>urn:feed</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:entry:1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link rel="enclosure" href="https://example.com/audio.mp3"/>
    <link rel="alternate" href="https://example.com/entry"/>
    <summary>Short text</summary>
  </entry>
</feed>"#;

        let entries = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.com/entry");
        assert_eq!(entries[0].title, "Entry");
        assert_eq!(entries[0].summary, "Short text");
    }

    #[test]
    fn test_empty_channel() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title></channel></rss>"#;
        assert!(parse_feed(rss.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_document_is_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
        assert!(parse_feed(b"").is_err());
    }
}
