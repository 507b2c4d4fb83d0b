use chrono::Local;
use clap::Subcommand;
use focusflow_core::{SessionStore, WeeklyStats};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's focus totals
    Today,
    /// Last seven days: totals, streak, daily bars
    Week,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = SessionStore::open_default()?;
    let stats = WeeklyStats::compute(&db.list()?, &Local::now());

    match action {
        StatsAction::Today => {
            let today = serde_json::json!({
                "today_sessions": stats.today_sessions,
                "today_minutes": stats.today_minutes,
                "streak_days": stats.streak_days,
            });
            println!("{}", serde_json::to_string_pretty(&today)?);
        }
        StatsAction::Week => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
