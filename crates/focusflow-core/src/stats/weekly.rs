//! Weekly focus summary.
//!
//! Buckets focus sessions by calendar day in the caller's time zone and
//! derives the totals shown on the stats screen: minutes per day for the
//! last week, a day streak, and the average session length.

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::storage::SessionRecord;
use crate::timer::Phase;

/// Days covered by [`WeeklyStats::week_bars`], today included.
pub const WEEK_DAYS: usize = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyStats {
    /// Focus minutes in the last seven days
    pub total_minutes_this_week: u64,
    /// Focus sessions started in the last seven days
    pub sessions_this_week: u32,
    /// Consecutive days, ending today, with any focus time
    pub streak_days: u32,
    /// Mean length of every stored focus session, in whole minutes
    pub average_focus_minutes: u32,
    /// Minutes per day, oldest first; the last entry is today
    pub week_bars: Vec<u64>,
    pub today_sessions: u32,
    pub today_minutes: u64,
}

impl WeeklyStats {
    /// Summarize `records` as seen at `now`.
    ///
    /// Break sessions are ignored. Aborted focus sessions count with the
    /// minutes they actually ran.
    pub fn compute<Tz: TimeZone>(records: &[SessionRecord], now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();
        let mut daily_minutes = [0u64; WEEK_DAYS];
        let mut daily_sessions = [0u32; WEEK_DAYS];
        let mut total_all = 0u64;
        let mut focus_count = 0u64;

        for record in records.iter().filter(|r| r.phase == Phase::Focus) {
            total_all += record.duration_minutes as u64;
            focus_count += 1;

            let day = record.started_at().with_timezone(&tz).date_naive();
            if let Some(age) = days_ago(today, day) {
                daily_minutes[age] += record.duration_minutes as u64;
                daily_sessions[age] += 1;
            }
        }

        let streak_days = daily_minutes.iter().take_while(|&&m| m > 0).count() as u32;
        let average_focus_minutes = if focus_count == 0 {
            0
        } else {
            (total_all / focus_count) as u32
        };

        Self {
            total_minutes_this_week: daily_minutes.iter().sum(),
            sessions_this_week: daily_sessions.iter().sum(),
            streak_days,
            average_focus_minutes,
            week_bars: daily_minutes.iter().rev().copied().collect(),
            today_sessions: daily_sessions[0],
            today_minutes: daily_minutes[0],
        }
    }
}

/// Index into the week buckets, 0 = today. `None` outside the week or in
/// the future.
fn days_ago(today: NaiveDate, day: NaiveDate) -> Option<usize> {
    let age = (today - day).num_days();
    (0..WEEK_DAYS as i64).contains(&age).then_some(age as usize)
}
