//! Listing page parsing.
//!
//! Turns the HTML of one forum listing page into [`ThreadRecord`]s. Nothing in
//! here touches the network.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;

static THREAD_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/thread/(\d+)$").unwrap());
static LAST_POST_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/thread/\d+/last#p\d+$").unwrap());
static POST_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#p(\d+)").unwrap());

/// One forum thread as observed on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub title: String,
    /// Canonical thread URL, derived from `thread_id`.
    pub link: String,
    pub reply_count: u32,
    /// Id of the most recent post. Grows whenever the thread sees activity.
    pub last_post_id: u64,
    pub last_post_time: String,
    pub last_post_author: String,
    /// Absolute "jump to last post" URL.
    pub last_post_link: String,
}

/// Extract the thread id from a `/thread/<id>` href.
#[must_use]
pub fn thread_id_from_href(href: &str) -> Option<&str> {
    THREAD_HREF
        .captures(href.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Whether `href` is a `/thread/<id>/last#p<pid>` "jump to last post" link.
#[must_use]
pub fn is_last_post_href(href: &str) -> bool {
    LAST_POST_HREF.is_match(href.trim())
}

/// Extract the post id from the `#p<pid>` fragment of an href.
#[must_use]
pub fn post_id_from_href(href: &str) -> Option<u64> {
    POST_ID
        .captures(href)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical URL of a thread.
#[must_use]
pub fn thread_url(base_url: &str, thread_id: &str) -> String {
    format!("{base_url}/thread/{thread_id}")
}

/// Parse every thread row of a listing page, in page order.
///
/// Rows without a thread link, a "jump to last post" link or a post id are
/// skipped. Author and time are optional and default to empty strings.
#[must_use]
pub fn parse_threads(html: &str, base_url: &str) -> Vec<ThreadRecord> {
    let document = Html::parse_document(html);
    let row_selector =
        Selector::parse("table#thread-table-main tbody tr").expect("Invalid selector");

    document
        .select(&row_selector)
        .filter_map(|row| parse_row(&row, base_url))
        .collect()
}

fn parse_row(row: &ElementRef, base_url: &str) -> Option<ThreadRecord> {
    let title_selector = Selector::parse("a.ui-link").expect("Invalid selector");
    let link_selector = Selector::parse("a[href]").expect("Invalid selector");
    let reply_selector = Selector::parse("td.text-end").expect("Invalid selector");

    let Some(title_anchor) = row.select(&title_selector).next() else {
        trace!("Row without thread link, skipping");
        return None;
    };
    let href = title_anchor.value().attr("href")?;
    let Some(thread_id) = thread_id_from_href(href) else {
        trace!(href, "Thread link does not match, skipping");
        return None;
    };

    let Some(last_href) = row
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|h| is_last_post_href(h))
    else {
        trace!(thread_id, "Row without last post link, skipping");
        return None;
    };
    let last_post_id = post_id_from_href(last_href)?;

    let reply_count = row
        .select(&reply_selector)
        .next()
        .and_then(|td| stripped_text(&td).parse().ok())
        .unwrap_or(0);

    let (last_post_time, last_post_author) = last_post_meta(row);

    Some(ThreadRecord {
        thread_id: thread_id.to_string(),
        title: stripped_text(&title_anchor),
        link: thread_url(base_url, thread_id),
        reply_count,
        last_post_id,
        last_post_time,
        last_post_author,
        last_post_link: format!("{base_url}{last_href}"),
    })
}

/// Time and author of the last post.
///
/// The desktop cell wins when present; the mobile span is only consulted when
/// the desktop cell is missing entirely.
fn last_post_meta(row: &ElementRef) -> (String, String) {
    let desktop_selector = Selector::parse("td.d-none.d-sm-table-cell").expect("Invalid selector");
    let mobile_selector = Selector::parse("span.d-sm-none").expect("Invalid selector");

    if let Some(cell) = row.select(&desktop_selector).next() {
        let author = first_anchor_text(&cell)
            .and_then(|t| t.lines().map(str::trim).find(|l| !l.is_empty()).map(String::from))
            .unwrap_or_default();
        return (time_of(&cell), author);
    }

    if let Some(span) = row.select(&mobile_selector).next() {
        let author = first_anchor_text(&span)
            .map(|t| t.split('@').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default();
        return (time_of(&span), author);
    }

    (String::new(), String::new())
}

fn time_of(container: &ElementRef) -> String {
    let time_selector = Selector::parse("time[datetime]").expect("Invalid selector");
    container
        .select(&time_selector)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .unwrap_or_default()
        .to_string()
}

fn first_anchor_text(container: &ElementRef) -> Option<String> {
    let anchor_selector = Selector::parse("a").expect("Invalid selector");
    container
        .select(&anchor_selector)
        .next()
        .map(|a| a.text().collect::<String>())
}

/// Text content with every fragment trimmed and the pieces concatenated.
fn stripped_text(element: &ElementRef) -> String {
    element.text().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://forum.example.com";

    fn page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <table id="thread-table-main"><thead><tr><th>Title</th></tr></thead>
            <tbody>{rows}</tbody></table>
            </body></html>"#
        )
    }

    fn desktop_row(id: u64, title: &str, replies: u32, pid: u64) -> String {
        format!(
            r#"<tr>
              <td><a class="ui-link" href="/thread/{id}">{title}</a>
                <span class="d-sm-none"><time datetime="mobile-time">m</time> <a href="/user/9">mobile@x</a></span>
              </td>
              <td class="text-end">{replies}</td>
              <td class="d-none d-sm-table-cell">
                <time datetime="2024-03-01T10:00:00Z">Mar 1</time>
                <a href="/user/1">alice</a>
                <a href="/thread/{id}/last#p{pid}">&raquo;</a>
              </td>
            </tr>"#
        )
    }

    #[test]
    fn test_thread_id_from_href() {
        assert_eq!(thread_id_from_href("/thread/12345"), Some("12345"));
        assert_eq!(thread_id_from_href("  /thread/7 "), Some("7"));
        assert_eq!(thread_id_from_href("/thread/12345/last#p9"), None);
        assert_eq!(thread_id_from_href("/thread/abc"), None);
        assert_eq!(thread_id_from_href("https://x/thread/1"), None);
    }

    #[test]
    fn test_last_post_href() {
        assert!(is_last_post_href("/thread/1/last#p42"));
        assert!(!is_last_post_href("/thread/1/last"));
        assert!(!is_last_post_href("/thread/1#p42"));
        assert_eq!(post_id_from_href("/thread/1/last#p42"), Some(42));
        assert_eq!(post_id_from_href("/thread/1/last"), None);
    }

    #[test]
    fn test_parse_desktop_row() {
        let html = page(&desktop_row(5, "Hello world", 12, 150));
        let threads = parse_threads(&html, BASE);

        assert_eq!(threads.len(), 1);
        let t = &threads[0];
        assert_eq!(t.thread_id, "5");
        assert_eq!(t.title, "Hello world");
        assert_eq!(t.link, "https://forum.example.com/thread/5");
        assert_eq!(t.reply_count, 12);
        assert_eq!(t.last_post_id, 150);
        assert_eq!(t.last_post_time, "2024-03-01T10:00:00Z");
        assert_eq!(t.last_post_author, "alice");
        assert_eq!(t.last_post_link, "https://forum.example.com/thread/5/last#p150");
    }

    #[test]
    fn test_mobile_fallback_when_desktop_cell_missing() {
        let row = r#"<tr><td>
            <a class="ui-link" href="/thread/8">Mobile only</a>
            <span class="d-sm-none"><time datetime="2024-04-02T08:00:00Z">Apr 2</time>
              <a href="/thread/8/last#p77">bob@ 2 days ago</a></span>
            </td><td class="text-end">3</td></tr>"#;
        let threads = parse_threads(&page(row), BASE);

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].last_post_time, "2024-04-02T08:00:00Z");
        assert_eq!(threads[0].last_post_author, "bob");
        assert_eq!(threads[0].last_post_id, 77);
    }

    #[test]
    fn test_missing_author_and_time_still_emitted() {
        let row = r#"<tr><td>
            <a class="ui-link" href="/thread/3">Bare</a>
            <a href="/thread/3/last#p10">last</a></td></tr>"#;
        let threads = parse_threads(&page(row), BASE);

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].last_post_time, "");
        assert_eq!(threads[0].last_post_author, "");
        assert_eq!(threads[0].reply_count, 0);
    }

    #[test]
    fn test_row_without_last_post_link_is_skipped() {
        let broken = r#"<tr><td><a class="ui-link" href="/thread/4">No jump link</a></td>
            <td class="text-end">1</td></tr>"#;
        let rows = format!(
            "{}{}{}",
            desktop_row(1, "First", 0, 300),
            broken,
            desktop_row(2, "Second", 0, 200)
        );
        let threads = parse_threads(&page(&rows), BASE);

        let ids: Vec<_> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_row_with_foreign_title_link_is_skipped() {
        let row = r#"<tr><td><a class="ui-link" href="/forum/18">Section</a>
            <a href="/thread/4/last#p9">last</a></td></tr>"#;
        assert!(parse_threads(&page(row), BASE).is_empty());
    }

    #[test]
    fn test_page_order_is_preserved() {
        let rows = format!(
            "{}{}{}",
            desktop_row(10, "a", 0, 100),
            desktop_row(11, "b", 0, 500),
            desktop_row(12, "c", 0, 300)
        );
        let pids: Vec<_> = parse_threads(&page(&rows), BASE)
            .iter()
            .map(|t| t.last_post_id)
            .collect();
        assert_eq!(pids, vec![100, 500, 300]);
    }

    #[test]
    fn test_missing_table_yields_nothing() {
        assert!(parse_threads("<html><body><p>Maintenance</p></body></html>", BASE).is_empty());
        assert!(parse_threads("", BASE).is_empty());
    }
}
