//! Statistics module for FocusFlow
//!
//! Pure aggregation over stored session records. Nothing here reads the
//! clock; callers pass the moment they want the summary for.

mod weekly;

pub use weekly::{WeeklyStats, WEEK_DAYS};
