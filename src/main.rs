//! pinmux - a prompt-pinning terminal multiplexer for agent sessions
//!
//! Runs interactive coding agents in PTY sessions, pins the last submitted
//! command under each one, and multiplexes sessions behind a Ctrl+\ prefix.

mod app;
mod config;
mod core;
mod router;
mod ui;

use std::env;
use std::path::PathBuf;

use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute, terminal,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::App;
use crate::config::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("pinmux {}", VERSION);
}

fn print_help() {
    eprintln!("pinmux {} - prompt-pinning terminal multiplexer", VERSION);
    eprintln!();
    eprintln!("Usage: pinmux [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Run CMD instead of the configured agent");
    eprintln!("  -C, --cwd <DIR>       Working directory for the first session");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keybindings (Ctrl+\\ prefix):");
    eprintln!("  Ctrl+\\, n             New session");
    eprintln!("  Ctrl+\\, d             Close session");
    eprintln!("  Ctrl+\\, 1-9           Jump to session by number");
    eprintln!("  Ctrl+\\, o             Session overview grid");
    eprintln!("  Ctrl+\\, q             Quit");
    eprintln!();
    eprintln!("Configuration: ~/.pinmux/config.toml");
    eprintln!("Log file:      ~/.pinmux/pinmux.log");
}

struct CliArgs {
    shell: Option<String>,
    cwd: Option<PathBuf>,
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs {
        shell: None,
        cwd: None,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-s" | "--shell" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing shell argument".to_string());
                }
                cli.shell = Some(args[i].clone());
            }
            "-C" | "--cwd" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing directory argument".to_string());
                }
                cli.cwd = Some(PathBuf::from(&args[i]));
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

fn init_logging() {
    let log_path = config::pinmux_dir()
        .map(|dir| dir.join("pinmux.log"))
        .unwrap_or_else(|| PathBuf::from("pinmux.log"));

    // Open log file (append mode); stdout belongs to the sessions
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("pinmux {} starting", VERSION);

    let mut config = Config::load();
    if let Some(shell) = cli.shell {
        config.agent.command = Some(shell);
        config.agent.args.clear();
    }
    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => env::current_dir()?,
    };

    // Let child processes detect they are running under pinmux
    env::set_var("PINMUX", "1");
    env::set_var("PINMUX_VERSION", VERSION);

    let mut app = App::new(config)?;

    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), EnableBracketedPaste)?;

    let result = app.run(cwd);

    let _ = execute!(std::io::stdout(), DisableBracketedPaste);
    app::restore_terminal();

    match result {
        Ok(()) => {
            info!("pinmux exiting");
            Ok(())
        }
        Err(err) => {
            error!("fatal: {:#}", err);
            eprintln!("pinmux: {:#}", err);
            std::process::exit(1);
        }
    }
}
