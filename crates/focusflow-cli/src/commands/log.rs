use chrono::Local;
use clap::Subcommand;
use focusflow_core::SessionStore;

#[derive(Subcommand)]
pub enum LogAction {
    /// List recorded sessions, newest first
    List {
        /// Show at most this many sessions
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every recorded session
    Clear,
}

pub fn run(action: LogAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = SessionStore::open_default()?;

    match action {
        LogAction::List { limit, json } => {
            let mut sessions = db.list()?;
            if let Some(limit) = limit {
                sessions.truncate(limit);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("no sessions yet");
            } else {
                for s in &sessions {
                    let started = s.started_at().with_timezone(&Local);
                    println!(
                        "{}  {:<11}  {:>3} min  {}",
                        started.format("%Y-%m-%d %H:%M"),
                        s.phase.label(),
                        s.duration_minutes,
                        if s.completed { "completed" } else { "stopped" },
                    );
                }
            }
        }
        LogAction::Clear => {
            let removed = db.clear()?;
            println!("removed {removed} sessions");
        }
    }
    Ok(())
}
