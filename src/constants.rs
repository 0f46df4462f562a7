//! Shared constants used across the application.

use std::time::Duration;

/// Forum mirror scraped when `FORUM_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://mirror.chromaso.net";

/// Forum section whose listing pages are walked.
pub const DEFAULT_SECTION_ID: u32 = 18;

/// Where the scrape state lives between runs.
pub const DEFAULT_STATE_FILE: &str = "thread_state.json";

/// User agent sent with every listing request.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Number of threads per listing page; the page offset advances by this much.
pub const PAGE_SIZE: u32 = 30;

/// Hard cap on listing pages fetched in one run.
pub const MAX_PAGES: u32 = 20;

/// Consecutive stale pages required before pagination stops early.
///
/// A single stale page is not enough: sticky rows and ties mean one page can
/// look old while the next still carries fresh activity.
pub const STALE_PAGE_THRESHOLD: u32 = 2;

/// Lower bound of the randomized pause between two listing fetches.
pub const SLEEP_MIN: Duration = Duration::from_secs(5);

/// Upper bound of the randomized pause between two listing fetches.
pub const SLEEP_MAX: Duration = Duration::from_secs(6);

/// Ceiling for a single listing request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
