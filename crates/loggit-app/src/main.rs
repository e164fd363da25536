//! `loggit` command line client.
//!
//! Every command opens the local database, runs one operation through
//! [`AppService`] and, when sync is configured, gives replication a bounded
//! amount of time to push the change before exiting.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use loggit_app::config::{self, Config};
use loggit_app::{AlertSink, AppService, Db};
use loggit_types::{Event, ExportPayload, Setting, SettingName};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "loggit", version, about = "Log named events and sync them across devices")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log a new event.
    Add {
        name: String,
        /// Date as YYYY-MM-DD; today when omitted or invalid.
        #[arg(long)]
        date: Option<String>,
    },
    /// List the events of one month, newest first.
    List {
        /// Month as YYYY-MM; the current month when omitted.
        #[arg(long)]
        month: Option<String>,
    },
    /// List every event, newest first.
    All,
    /// Rename or re-date an event.
    Edit {
        id: String,
        name: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete an event.
    Delete { id: String },
    /// Write a JSON backup of all events.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load events from a JSON backup.
    Import {
        file: PathBuf,
        /// Erase all existing data first.
        #[arg(long)]
        replace: bool,
    },
    /// Erase all event data, locally and on the sync endpoint.
    Erase {
        #[arg(long)]
        yes: bool,
    },
    /// Manage synchronization.
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    /// Set the sync endpoint (http(s):// URL of a CouchDB database).
    Set { token: String },
    /// Disable sync.
    Clear,
    /// Show sync configuration and the last successful sync.
    Status,
    /// Replicate now and wait for it to finish.
    Now,
}

/// Prints alerts to stderr.
struct StderrAlerts;

impl AlertSink for StderrAlerts {
    fn alert(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}

fn resolve_config_path(cli: &Cli) -> (PathBuf, &'static str) {
    if let Some(path) = &cli.config {
        return (path.clone(), "cli-arg");
    }

    if let Ok(path) = std::env::var("LOGGIT_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (PathBuf::from(path), "env-var");
        }
    }

    (PathBuf::from("loggit.toml"), "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("no events");
        return;
    }
    for event in events {
        println!("{}  {}  {}", event.date, event.id, event.name);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config_path, config_source) = resolve_config_path(&cli);

    let config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);
    tracing::debug!(
        source = config_source,
        path = %config_path.display(),
        "resolved configuration path"
    );

    let db = match Db::open(&config) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let app = AppService::new(db, Arc::new(StderrAlerts));

    let (ok, mutated) = run(&app, cli.command).await;

    if mutated {
        match app.flush_sync(config.sync.flush_timeout()).await {
            Some(false) => eprintln!("sync: changes not replicated yet, they will be on the next run"),
            Some(true) | None => {}
        }
    }
    app.shutdown().await;

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Runs one command. Returns (success, whether event data changed).
async fn run(app: &AppService, command: Command) -> (bool, bool) {
    match command {
        Command::Add { name, date } => {
            let event = Event::new(name, date.unwrap_or_default());
            let ok = app.save_event(event).await;
            (ok, ok)
        }
        Command::List { month } => {
            let view = match month {
                Some(month) => match app.change_month_in_view(&month).await {
                    Some(view) => view,
                    None => return (false, false),
                },
                None => app.load_data(None, false).await,
            };
            println!("{}", view.month_in_view);
            print_events(&view.events);
            (true, false)
        }
        Command::All => {
            print_events(&app.fetch_all_events().await);
            (true, false)
        }
        Command::Edit { id, name, date } => {
            let date = match date {
                Some(date) => date,
                None => app
                    .get_event(&id)
                    .await
                    .map(|event| event.date)
                    .unwrap_or_default(),
            };
            let event = Event {
                id,
                name,
                date,
                revision: None,
            };
            let ok = app.save_event(event).await;
            (ok, ok)
        }
        Command::Delete { id } => {
            let ok = app.delete_event(&id).await;
            (ok, ok)
        }
        Command::Export { out } => {
            let payload = app.export_all_data().await;
            let json = match serde_json::to_string_pretty(&payload) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return (false, false);
                }
            };
            match out {
                Some(path) => match std::fs::write(&path, json) {
                    Ok(()) => {
                        println!("exported {} events to {}", payload.events.len(), path.display());
                        (true, false)
                    }
                    Err(e) => {
                        eprintln!("Error: {e}");
                        (false, false)
                    }
                },
                None => {
                    println!("{json}");
                    (true, false)
                }
            }
        }
        Command::Import { file, replace } => {
            let payload: ExportPayload = match std::fs::read_to_string(&file)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            {
                Ok(payload) => payload,
                Err(e) => {
                    eprintln!("Error: cannot read {}: {e}", file.display());
                    return (false, false);
                }
            };
            let count = payload.events.len();
            let ok = app.import_data(replace, payload.events).await;
            if ok {
                println!("imported {count} events");
            }
            (ok, ok)
        }
        Command::Erase { yes } => {
            if !yes {
                eprintln!("Refusing to erase without --yes");
                return (false, false);
            }
            let ok = app.delete_all_data().await;
            (ok, false)
        }
        Command::Sync(SyncCommand::Set { token }) => {
            let ok = app
                .save_setting(Setting::new(SettingName::SyncToken, token))
                .await;
            (ok, ok)
        }
        Command::Sync(SyncCommand::Clear) => {
            let ok = app
                .save_setting(Setting::new(SettingName::SyncToken, ""))
                .await;
            (ok, false)
        }
        Command::Sync(SyncCommand::Status) => {
            let token = app.get_setting(SettingName::SyncToken).await;
            let last = app.get_setting(SettingName::LastSyncDate).await;
            println!("endpoint:  {}", if token.is_empty() { "(none)" } else { token.as_str() });
            println!("last sync: {}", if last.is_empty() { "never" } else { last.as_str() });
            println!("syncing:   {}", app.is_syncing().await);
            (true, false)
        }
        Command::Sync(SyncCommand::Now) => {
            app.load_data(None, false).await;
            (true, true)
        }
    }
}
