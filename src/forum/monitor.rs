//! Incremental fetch-and-diff driver.
//!
//! Walks listing pages from offset 0, classifies every thread against the
//! stored state and stops once pagination has clearly reached content seen by
//! earlier runs.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, info};

use crate::config::Config;
use crate::forum::fetcher::fetch_page;
use crate::forum::parser::{parse_threads, ThreadRecord};
use crate::state::ScrapeState;

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page had no parseable thread rows.
    EmptyPage,
    /// Enough consecutive pages were at or below the high-water mark.
    StalePages,
    /// The page cap was reached.
    PageCap,
}

/// A known thread with activity newer than its stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedThread {
    pub previous_post_id: u64,
    pub previous_time: String,
    pub current: ThreadRecord,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Threads absent from the stored state, newest activity first.
    pub new_threads: Vec<ThreadRecord>,
    /// Threads whose last post id grew, newest activity first.
    pub updated_threads: Vec<UpdatedThread>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
    pub previous_max_seen_post_id: u64,
    pub max_seen_post_id: u64,
}

impl ScanReport {
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.new_threads.is_empty() || !self.updated_threads.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    New(usize),
    Updated(usize),
}

/// New and updated threads collected over a run.
///
/// A thread is reported at most once; a later sighting in the same run only
/// refreshes its entry.
#[derive(Debug, Default)]
pub struct Changes {
    new_threads: Vec<ThreadRecord>,
    updated_threads: Vec<UpdatedThread>,
    slots: HashMap<String, Slot>,
}

impl Changes {
    #[must_use]
    pub fn new_threads(&self) -> &[ThreadRecord] {
        &self.new_threads
    }

    #[must_use]
    pub fn updated_threads(&self) -> &[UpdatedThread] {
        &self.updated_threads
    }

    fn into_sorted(self) -> (Vec<ThreadRecord>, Vec<UpdatedThread>) {
        let Self {
            mut new_threads,
            mut updated_threads,
            ..
        } = self;
        new_threads.sort_by(|a, b| b.last_post_id.cmp(&a.last_post_id));
        updated_threads.sort_by(|a, b| b.current.last_post_id.cmp(&a.current.last_post_id));
        (new_threads, updated_threads)
    }
}

/// Classify one page of threads against `state`, then upsert every thread.
///
/// Absent threads are new, threads with a larger last post id are updated,
/// everything else is unchanged and only refreshes its stored snapshot.
pub fn classify_page(state: &mut ScrapeState, threads: &[ThreadRecord], changes: &mut Changes) {
    for record in threads {
        let previous = state.upsert(record);

        match (changes.slots.get(&record.thread_id).copied(), previous) {
            (Some(Slot::New(i)), _) => {
                if record.last_post_id > changes.new_threads[i].last_post_id {
                    changes.new_threads[i] = record.clone();
                }
            }
            (Some(Slot::Updated(i)), _) => {
                if record.last_post_id > changes.updated_threads[i].current.last_post_id {
                    changes.updated_threads[i].current = record.clone();
                }
            }
            (None, None) => {
                debug!(thread_id = %record.thread_id, pid = record.last_post_id, "New thread");
                changes
                    .slots
                    .insert(record.thread_id.clone(), Slot::New(changes.new_threads.len()));
                changes.new_threads.push(record.clone());
            }
            (None, Some(prev)) if record.last_post_id > prev.last_pid => {
                debug!(
                    thread_id = %record.thread_id,
                    from = prev.last_pid,
                    to = record.last_post_id,
                    "Updated thread"
                );
                changes.slots.insert(
                    record.thread_id.clone(),
                    Slot::Updated(changes.updated_threads.len()),
                );
                changes.updated_threads.push(UpdatedThread {
                    previous_post_id: prev.last_pid,
                    previous_time: prev.last_time,
                    current: record.clone(),
                });
            }
            (None, Some(_)) => {}
        }
    }
}

/// Counts consecutive stale pages.
///
/// A page is stale when its highest last post id does not exceed the
/// high-water mark recorded by previous runs.
#[derive(Debug, Clone)]
pub struct StaleTracker {
    baseline: u64,
    threshold: u32,
    streak: u32,
}

impl StaleTracker {
    #[must_use]
    pub fn new(baseline: u64, threshold: u32) -> Self {
        Self {
            baseline,
            threshold,
            streak: 0,
        }
    }

    /// Record a page's highest post id. Returns `true` once pagination should stop.
    pub fn observe(&mut self, page_max_pid: u64) -> bool {
        if page_max_pid <= self.baseline {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        self.streak >= self.threshold
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Run one incremental scan, mutating `state` in place.
///
/// The caller persists `state` afterwards. On error the run is abandoned and
/// `state` must not be saved.
///
/// # Errors
///
/// Returns an error if any listing page cannot be fetched.
pub async fn scan(
    client: &reqwest::Client,
    config: &Config,
    state: &mut ScrapeState,
) -> Result<ScanReport> {
    let baseline = state.max_seen_post_id;
    let mut running_max = baseline;
    let mut stale = StaleTracker::new(baseline, config.stale_page_threshold);
    let mut changes = Changes::default();
    let mut pages_fetched = 0;
    let mut stop_reason = StopReason::PageCap;

    info!(max_seen_pid = baseline, known_threads = state.threads.len(), "Starting scan");

    for page_idx in 0..config.max_pages {
        if page_idx > 0 {
            let delay = politeness_delay(config.sleep_min, config.sleep_max);
            debug!(delay = ?delay, "Pausing before next page");
            tokio::time::sleep(delay).await;
        }

        let offset = page_idx * config.page_size;
        let url = config.listing_url(offset);
        let html = fetch_page(client, &url)
            .await
            .with_context(|| format!("Failed to fetch listing page at offset {offset}"))?;
        pages_fetched += 1;

        let threads = parse_threads(&html, &config.base_url);
        let Some(page_max_pid) = threads.iter().map(|t| t.last_post_id).max() else {
            info!(offset, "Listing page has no threads, stopping");
            stop_reason = StopReason::EmptyPage;
            break;
        };

        classify_page(state, &threads, &mut changes);
        running_max = running_max.max(page_max_pid);

        let stop = stale.observe(page_max_pid);
        debug!(
            offset,
            threads = threads.len(),
            page_max_pid,
            stale_streak = stale.streak(),
            "Processed listing page"
        );
        if stop {
            info!(offset, "Reached previously seen activity, stopping");
            stop_reason = StopReason::StalePages;
            break;
        }
    }

    state.max_seen_post_id = running_max;
    let (new_threads, updated_threads) = changes.into_sorted();

    info!(
        pages = pages_fetched,
        new = new_threads.len(),
        updated = updated_threads.len(),
        max_seen_pid = running_max,
        "Scan finished"
    );

    Ok(ScanReport {
        new_threads,
        updated_threads,
        pages_fetched,
        stop_reason,
        previous_max_seen_post_id: baseline,
        max_seen_post_id: running_max,
    })
}

/// Uniformly random pause within `[min, max]`.
fn politeness_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, pid: u64, title: &str) -> ThreadRecord {
        ThreadRecord {
            thread_id: id.to_string(),
            title: title.to_string(),
            link: format!("https://forum.example.com/thread/{id}"),
            reply_count: 1,
            last_post_id: pid,
            last_post_time: format!("time-{pid}"),
            last_post_author: "alice".to_string(),
            last_post_link: format!("https://forum.example.com/thread/{id}/last#p{pid}"),
        }
    }

    fn state_with(threads: &[ThreadRecord], max: u64) -> ScrapeState {
        let mut state = ScrapeState::default();
        for t in threads {
            state.upsert(t);
        }
        state.max_seen_post_id = max;
        state
    }

    #[test]
    fn test_absent_thread_is_new_not_updated() {
        let mut state = ScrapeState::default();
        let mut changes = Changes::default();
        classify_page(&mut state, &[record("9", 120, "fresh")], &mut changes);

        assert_eq!(changes.new_threads().len(), 1);
        assert!(changes.updated_threads().is_empty());
        assert_eq!(state.threads["9"].last_pid, 120);
    }

    #[test]
    fn test_higher_post_id_is_updated() {
        let mut state = state_with(&[record("5", 100, "old")], 100);
        let mut changes = Changes::default();
        classify_page(&mut state, &[record("5", 150, "old")], &mut changes);

        assert!(changes.new_threads().is_empty());
        let updated = &changes.updated_threads()[0];
        assert_eq!(updated.previous_post_id, 100);
        assert_eq!(updated.previous_time, "time-100");
        assert_eq!(updated.current.last_post_id, 150);
    }

    #[test]
    fn test_unchanged_thread_refreshes_snapshot_without_report() {
        let mut state = state_with(&[record("5", 100, "old title")], 100);
        let mut changes = Changes::default();
        let mut renamed = record("5", 100, "new title");
        renamed.last_post_time = "edited".to_string();
        classify_page(&mut state, &[renamed], &mut changes);

        assert!(changes.new_threads().is_empty());
        assert!(changes.updated_threads().is_empty());
        assert_eq!(state.threads["5"].title, "new title");
        assert_eq!(state.threads["5"].last_time, "edited");
    }

    #[test]
    fn test_lower_post_id_is_not_updated() {
        let mut state = state_with(&[record("5", 100, "t")], 100);
        let mut changes = Changes::default();
        classify_page(&mut state, &[record("5", 90, "t")], &mut changes);

        assert!(changes.updated_threads().is_empty());
    }

    #[test]
    fn test_repeat_sighting_is_reported_once() {
        let mut state = state_with(&[record("5", 100, "t")], 100);
        let mut changes = Changes::default();
        classify_page(
            &mut state,
            &[record("5", 150, "t"), record("7", 130, "n")],
            &mut changes,
        );
        classify_page(
            &mut state,
            &[record("5", 150, "t"), record("7", 140, "n")],
            &mut changes,
        );

        assert_eq!(changes.updated_threads().len(), 1);
        assert_eq!(changes.updated_threads()[0].previous_post_id, 100);
        assert_eq!(changes.new_threads().len(), 1);
        assert_eq!(changes.new_threads()[0].last_post_id, 140);
    }

    #[test]
    fn test_changes_sorted_newest_first() {
        let mut state = ScrapeState::default();
        let mut changes = Changes::default();
        classify_page(
            &mut state,
            &[record("1", 10, "a"), record("2", 30, "b"), record("3", 20, "c")],
            &mut changes,
        );

        let (new_threads, _) = changes.into_sorted();
        let pids: Vec<_> = new_threads.iter().map(|t| t.last_post_id).collect();
        assert_eq!(pids, vec![30, 20, 10]);
    }

    #[test]
    fn test_stale_tracker_needs_consecutive_pages() {
        let mut tracker = StaleTracker::new(100, 2);

        assert!(!tracker.observe(100));
        assert_eq!(tracker.streak(), 1);
        assert!(!tracker.observe(101));
        assert_eq!(tracker.streak(), 0);
        assert!(!tracker.observe(50));
        assert!(tracker.observe(99));
    }

    #[test]
    fn test_stale_tracker_empty_baseline_never_stops() {
        let mut tracker = StaleTracker::new(0, 2);
        for pid in [5, 4, 3, 2, 1] {
            assert!(!tracker.observe(pid));
        }
    }

    #[test]
    fn test_politeness_delay_within_bounds() {
        let min = Duration::from_millis(5);
        let max = Duration::from_millis(6);
        for _ in 0..50 {
            let d = politeness_delay(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(politeness_delay(Duration::ZERO, Duration::ZERO), Duration::ZERO);
    }
}
