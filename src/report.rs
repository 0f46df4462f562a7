//! Console report for a finished scan.

use std::fmt;
use std::path::Path;

use crate::forum::{ScanReport, ThreadRecord, UpdatedThread};
use crate::state::ScrapeState;

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_changes() {
            return writeln!(f, "No new or updated threads in the scanned range");
        }

        if !self.new_threads.is_empty() {
            writeln!(f, "New threads: {}", self.new_threads.len())?;
            for thread in &self.new_threads {
                write_new(f, thread)?;
            }
        }

        if !self.updated_threads.is_empty() {
            if !self.new_threads.is_empty() {
                writeln!(f)?;
            }
            writeln!(f, "Updated threads: {}", self.updated_threads.len())?;
            for thread in &self.updated_threads {
                write_updated(f, thread)?;
            }
        }

        Ok(())
    }
}

fn write_new(f: &mut fmt::Formatter<'_>, t: &ThreadRecord) -> fmt::Result {
    writeln!(
        f,
        "- pid={} | {} | {} | {} | replies {}",
        t.last_post_id, t.last_post_time, t.title, t.last_post_author, t.reply_count
    )?;
    write_links(f, t)
}

fn write_updated(f: &mut fmt::Formatter<'_>, u: &UpdatedThread) -> fmt::Result {
    let t = &u.current;
    writeln!(
        f,
        "- pid {} -> {} | {} -> {} | {} | {} | replies {}",
        u.previous_post_id,
        t.last_post_id,
        u.previous_time,
        t.last_post_time,
        t.title,
        t.last_post_author,
        t.reply_count
    )?;
    write_links(f, t)
}

fn write_links(f: &mut fmt::Formatter<'_>, t: &ThreadRecord) -> fmt::Result {
    writeln!(f, "  {}", t.link)?;
    writeln!(f, "  last: {}", t.last_post_link)
}

/// Closing line naming the state file, tracked thread count and high-water mark.
#[must_use]
pub fn summary_line(state: &ScrapeState, path: &Path) -> String {
    format!(
        "State updated: {} ({} threads tracked, max_seen_pid={})",
        path.display(),
        state.threads.len(),
        state.max_seen_post_id
    )
}
