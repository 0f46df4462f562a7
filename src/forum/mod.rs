//! Incremental monitoring of one forum section's listing pages.

pub mod fetcher;
pub mod monitor;
pub mod parser;

pub use fetcher::{build_client, fetch_page, FetchError};
pub use monitor::{scan, ScanReport, StopReason, UpdatedThread};
pub use parser::{parse_threads, ThreadRecord};
