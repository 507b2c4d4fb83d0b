use clap::Subcommand;
use focusflow_core::SettingsStore;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "timer.focus_minutes", "alerts.vibrations")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List {
        /// Print the whole config as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = SettingsStore::open_default()?;

    match action {
        ConfigAction::Get { key } => match store.config().get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            store.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List { json } => {
            let config = store.config();
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for (key, value) in config.entries() {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            store.reset()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
