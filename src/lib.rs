//! Forum thread monitor library.
//!
//! Incrementally scrapes the listing pages of one forum section, diffs the
//! threads against state saved by earlier runs and reports what is new or
//! updated.

pub mod config;
pub mod constants;
pub mod forum;
pub mod report;
pub mod state;
