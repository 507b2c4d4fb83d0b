use clap::{CommandFactory, Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "focusflow", version, about = "FocusFlow focus/break timer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the timer interactively
    Run(commands::timer::RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Session statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Session log
    Log {
        #[command(subcommand)]
        action: commands::log::LogAction,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() {
    logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => commands::timer::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Log { action } => commands::log::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "focusflow", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
