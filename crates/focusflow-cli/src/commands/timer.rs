use clap::Args;
use focusflow_core::{
    spawn_recorder, Coordinator, CoordinatorHandle, Notice, SessionStore, SettingsStore,
    SystemClock, TimerState,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args)]
pub struct RunArgs {
    /// Start with a preset, e.g. "50/10" (focus/break minutes)
    #[arg(long)]
    pub preset: Option<String>,
    /// Start the countdown immediately
    #[arg(long)]
    pub start: bool,
    /// Print state updates as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Pause,
    Stop,
    Preset { focus: u32, brk: u32 },
    Auto(bool),
    Custom,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  start              start or resume the countdown
  pause              pause the countdown
  stop               end the current interval
  preset <f> <b>     focus/break minutes, e.g. preset 50 10
  auto on|off        auto-start the next interval
  custom             go back to the stored settings
  status             print the current state
  quit               exit";

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let preset = args.preset.as_deref().map(parse_preset).transpose()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(session(args, preset))
}

async fn session(
    args: RunArgs,
    preset: Option<(u32, u32)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = SettingsStore::open_default()?;
    let db = SessionStore::open_default()?;
    let (handle, sessions, task) = Coordinator::new(SystemClock::new(), settings.snapshot())
        .with_settings_store(settings.clone())
        .spawn();
    let recorder = spawn_recorder(db, sessions);

    if let Some((focus, brk)) = preset {
        handle.select_preset(focus, brk)?;
    }
    if args.start {
        handle.start()?;
    }

    let mut renderer = Renderer::new(args.json, settings);
    let mut state = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match parse_input(&line) {
                    Ok(Input::Quit) => break,
                    Ok(Input::Status) => renderer.status(&handle.state()),
                    Ok(Input::Help) => println!("{HELP}"),
                    Ok(input) => dispatch(&handle, input)?,
                    Err(msg) => eprintln!("{msg}"),
                },
                // Piped input ran out; keep the timer going until Ctrl-C.
                None => stdin_open = false,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                renderer.update(&snapshot);
            },
            _ = &mut ctrl_c => break,
        }
    }

    // Commands queued before shutdown are applied first.
    handle.shutdown()?;
    drop(handle);
    task.await?;
    let last = state.borrow().clone();
    renderer.update(&last);
    // Recorder drains once the coordinator's sender is gone.
    recorder.await?;
    Ok(())
}

fn dispatch(handle: &CoordinatorHandle, input: Input) -> focusflow_core::Result<()> {
    match input {
        Input::Start => handle.start(),
        Input::Pause => handle.pause(),
        Input::Stop => handle.stop(),
        Input::Preset { focus, brk } => handle.select_preset(focus, brk),
        Input::Auto(enabled) => handle.set_auto_start(enabled),
        Input::Custom => handle.use_settings(),
        Input::Status | Input::Help | Input::Quit => Ok(()),
    }
}

pub fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let cmd = words.next().unwrap_or_default().to_lowercase();
    let rest: Vec<&str> = words.collect();

    let input = match (cmd.as_str(), rest.as_slice()) {
        ("start" | "resume", []) => Input::Start,
        ("pause", []) => Input::Pause,
        ("stop", []) => Input::Stop,
        ("preset", [focus, brk]) => Input::Preset {
            focus: parse_minutes(focus)?,
            brk: parse_minutes(brk)?,
        },
        ("preset", [pair]) => {
            let (focus, brk) = parse_preset(pair)?;
            Input::Preset { focus, brk }
        }
        ("auto", [flag]) => match *flag {
            "on" | "true" => Input::Auto(true),
            "off" | "false" => Input::Auto(false),
            other => return Err(format!("expected on or off, got '{other}'")),
        },
        ("custom", []) => Input::Custom,
        ("status", []) => Input::Status,
        ("help" | "?", _) => Input::Help,
        ("quit" | "exit" | "q", []) => Input::Quit,
        _ => return Err(format!("unknown command: {} (try 'help')", line.trim())),
    };
    Ok(input)
}

fn parse_preset(s: &str) -> Result<(u32, u32), String> {
    let (focus, brk) = s
        .split_once('/')
        .ok_or_else(|| format!("invalid preset '{s}', expected focus/break like 50/10"))?;
    Ok((parse_minutes(focus)?, parse_minutes(brk)?))
}

fn parse_minutes(s: &str) -> Result<u32, String> {
    match s.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("invalid minutes '{s}', expected a whole number >= 1")),
        Ok(n) => Ok(n),
    }
}

pub fn format_clock(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Prints state changes without flooding the terminal at tick rate.
struct Renderer {
    json: bool,
    /// Alert preferences are re-read on each completion so `config set`
    /// from another shell takes effect mid-session.
    settings: SettingsStore,
    last_second: Option<(u64, u64)>,
    last_running: Option<bool>,
    last_notice: Option<Notice>,
}

impl Renderer {
    fn new(json: bool, settings: SettingsStore) -> Self {
        Self {
            json,
            settings,
            last_second: None,
            last_running: None,
            last_notice: None,
        }
    }

    fn update(&mut self, state: &TimerState) {
        if state.notice != self.last_notice {
            if let Some(notice) = &state.notice {
                let (bell, nudge) = match notice {
                    Notice::PhaseComplete { .. } => {
                        let alerts = self.settings.reload_alerts();
                        (alerts.vibrations, alerts.movement_nudge)
                    }
                    _ => (false, false),
                };
                println!("{}{}", if bell { "\x07" } else { "" }, notice.message());
                if notice.offers_break_view() && nudge {
                    println!("Stand up, stretch, breathe.");
                }
            }
            self.last_notice = state.notice;
        }

        let second = (state.interval_seq, state.remaining_ms.div_ceil(1000));
        let running_changed = self.last_running != Some(state.is_running);
        if Some(second) == self.last_second && !running_changed {
            return;
        }
        // While running, only print on whole minutes to keep the log readable.
        let on_minute = state.remaining_ms.div_ceil(1000) % 60 == 0;
        let new_interval = self.last_second.map(|(seq, _)| seq) != Some(state.interval_seq);
        self.last_second = Some(second);
        self.last_running = Some(state.is_running);
        if running_changed || new_interval || on_minute {
            self.status(state);
        }
    }

    fn status(&self, state: &TimerState) {
        if self.json {
            match serde_json::to_string(state) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to encode state: {e}"),
            }
            return;
        }
        println!(
            "[{}] {} / {} {}  (today: {} sessions, {} min; auto-start {})",
            state.phase.label(),
            format_clock(state.remaining_ms),
            format_clock(state.total_ms),
            if state.is_running { "running" } else { "paused" },
            state.today_session_count,
            state.today_minutes,
            if state.auto_start_next { "on" } else { "off" },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_commands() {
        assert_eq!(parse_input("start"), Ok(Input::Start));
        assert_eq!(parse_input("  PAUSE "), Ok(Input::Pause));
        assert_eq!(parse_input("stop"), Ok(Input::Stop));
        assert_eq!(parse_input("custom"), Ok(Input::Custom));
        assert_eq!(parse_input("q"), Ok(Input::Quit));
    }

    #[test]
    fn parses_presets_in_both_forms() {
        let expected = Input::Preset { focus: 50, brk: 10 };
        assert_eq!(parse_input("preset 50 10"), Ok(expected.clone()));
        assert_eq!(parse_input("preset 50/10"), Ok(expected));
    }

    #[test]
    fn rejects_zero_and_garbage_minutes() {
        assert!(parse_input("preset 0 5").is_err());
        assert!(parse_input("preset ten 5").is_err());
        assert!(parse_preset("25").is_err());
    }

    #[test]
    fn parses_auto_flag() {
        assert_eq!(parse_input("auto on"), Ok(Input::Auto(true)));
        assert_eq!(parse_input("auto off"), Ok(Input::Auto(false)));
        assert!(parse_input("auto maybe").is_err());
    }

    #[test]
    fn unknown_commands_are_errors() {
        assert!(parse_input("launch").is_err());
        assert!(parse_input("start now").is_err());
    }

    #[test]
    fn clock_rounds_up_partial_seconds() {
        assert_eq!(format_clock(25 * 60_000), "25:00");
        assert_eq!(format_clock(59_001), "01:00");
        assert_eq!(format_clock(0), "00:00");
    }
}
