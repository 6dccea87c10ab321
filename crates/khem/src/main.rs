//! `khem` - CLI for the Khem identity store
//!
//! This binary is a terminal stand-in for the welcome screen: it loads the
//! saved username, lets the user edit it, and saves it back.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use khem::cli::{Cli, Command, ConfigCommand, PromptInput, SaveCommand};
use khem::config::Backend;
use khem::{
    init_logging, store, Config, IdentityController, KeyValueStore, Notification, SqliteStore,
};

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Show(show_cmd) => handle_show(&config, show_cmd.json).await,
        Command::Save(save_cmd) => handle_save(&config, save_cmd).await,
        Command::Prompt => handle_prompt(&config).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

/// Load the saved name from `store` into a new session.
async fn start_session(
    store: Arc<dyn KeyValueStore>,
) -> (IdentityController, UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = IdentityController::new(store).with_notifications(tx);
    controller.initialize().await;
    (controller, rx)
}

fn print_notifications(rx: &mut UnboundedReceiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        println!("{notification}");
    }
}

async fn handle_show(config: &Config, json: bool) -> CliResult {
    let (controller, _rx) = start_session(store::open_configured_read_only(config)?).await;
    let load_error = controller.load_error();
    let name = controller.buffer();

    if json {
        let username = (!name.is_empty()).then_some(&name);
        let output = serde_json::json!({
            "username": username,
            "backend": config.storage.backend.to_string(),
            "load_error": load_error.as_ref().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let Some(err) = &load_error {
        eprintln!("Could not load username: {err}");
    } else if name.is_empty() {
        println!("No username saved.");
    } else {
        println!("{name}");
    }

    Ok(if load_error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn handle_save(config: &Config, cmd: SaveCommand) -> CliResult {
    let (controller, mut rx) = start_session(store::open_configured(config)?).await;
    controller.on_change(cmd.name);
    let outcome = controller.submit().await;
    print_notifications(&mut rx);

    Ok(if outcome.is_saved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn handle_prompt(config: &Config) -> CliResult {
    let (controller, mut rx) = start_session(store::open_configured(config)?).await;

    println!("Welcome to Khem");
    println!("Enter your name (/save to save, /show to review, /quit to leave):");
    let current = controller.buffer();
    if !current.is_empty() {
        println!("> {current}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match PromptInput::parse(&line) {
            PromptInput::Edit(text) => controller.on_change(text),
            PromptInput::Save => {
                controller.submit().await;
                print_notifications(&mut rx);
            }
            PromptInput::Show => println!("{}", controller.buffer()),
            PromptInput::Quit => break,
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn handle_status(config: &Config, json: bool) -> CliResult {
    let database_path = config.database_path();
    let stats = match config.storage.backend {
        Backend::Sqlite if database_path.exists() => {
            let store = SqliteStore::open_read_only(&database_path, config.busy_timeout())?;
            Some(store.stats().await?)
        }
        Backend::Sqlite | Backend::Memory => None,
    };

    if json {
        let status = serde_json::json!({
            "backend": config.storage.backend.to_string(),
            "database_path": database_path,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("khem status");
        println!("-----------");
        println!("Backend:       {}", config.storage.backend);
        match (&stats, config.storage.backend) {
            (Some(stats), _) => {
                println!("Database:      {}", database_path.display());
                println!("Entries:       {}", stats.total_entries);
                println!(
                    "Last updated:  {}",
                    stats
                        .last_updated
                        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
                );
                println!("Size (bytes):  {}", stats.db_size_bytes);
            }
            (None, Backend::Sqlite) => {
                println!("Database:      {} (not created yet)", database_path.display());
            }
            (None, Backend::Memory) => println!("Nothing is persisted with the memory backend."),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Backend:            {}", config.storage.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Busy timeout (ms):  {}", config.storage.busy_timeout_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
