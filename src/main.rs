// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gantry main entry point - configuration commands and a wired demo.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use gantry::config::{self, CliOptions, LoadedConfig};
use gantry::database::{with_transaction, Value};
use gantry::telemetry::{init_telemetry, TelemetryConfig};
use gantry::{intercept_parts, with_only, Application, Context, DatabaseError, FnHook};

/// Gantry version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Gantry - request contexts and interceptors for service code.
#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "Request contexts and interceptors for service code", long_about = None)]
struct Cli {
    /// Config file to use instead of searching from the working directory
    #[arg(short, long, global = true, env = "GANTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for gantry.
#[derive(Subcommand)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Run an intercepted workload through a fully wired application
    Demo,

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
    /// Check the configuration and report the first problem
    Validate,
    /// Write a starter gantry.yaml in the working directory
    Init,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = CliOptions {
        debug: cli.debug,
        ..Default::default()
    };

    match cli.command {
        Commands::Config { action } => handle_config(cli.config, options, action),
        Commands::Demo => {
            let loaded = load(cli.config, options)?;
            let _telemetry = init_telemetry(&TelemetryConfig::from_app_config(&loaded.app))?;
            run_demo(loaded).await
        }
        Commands::Version => {
            println!("gantry {}", VERSION);
            Ok(())
        }
    }
}

fn load(path: Option<PathBuf>, options: CliOptions) -> anyhow::Result<LoadedConfig> {
    let loaded = match path {
        Some(path) => config::load_from_path(&path, options)?,
        None => config::load_config(&std::env::current_dir()?, options)?,
    };
    Ok(loaded)
}

fn handle_config(
    path: Option<PathBuf>,
    options: CliOptions,
    action: Option<ConfigAction>,
) -> anyhow::Result<()> {
    match action {
        Some(ConfigAction::Show { format }) => {
            let loaded = load(path, options)?;
            print_config(&loaded, format)?;
        }
        None => {
            let loaded = load(path, options)?;
            print_config(&loaded, ConfigFormat::Yaml)?;
        }
        Some(ConfigAction::Validate) => match load(path, options) {
            Ok(loaded) => {
                let source = loaded
                    .source
                    .as_ref()
                    .map(|s| s.path().display().to_string())
                    .unwrap_or_else(|| "defaults".to_string());
                println!("{} configuration is valid ({})", "✓".green(), source);
            }
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                std::process::exit(1);
            }
        },
        Some(ConfigAction::Init) => {
            let path = config::init_config(&std::env::current_dir()?, None)?;
            println!("Created config file: {}", path.display());
        }
    }
    Ok(())
}

fn print_config(loaded: &LoadedConfig, format: ConfigFormat) -> anyhow::Result<()> {
    if let Some(source) = &loaded.source {
        eprintln!("{} {}", "# source:".dimmed(), source.path().display());
    }
    match format {
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&loaded.app)?),
        ConfigFormat::Yaml => print!("{}", serde_yaml::to_string(&loaded.app)?),
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("user {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn create_user(ctx: &Context, name: &str) -> Result<i64, DemoError> {
    ctx.run_intercepted(intercept_parts!["Users", "Create"], |ctx| {
        with_transaction(ctx, |tx| {
            tx.db()
                .exec(tx, "INSERT INTO users (name) VALUES (?1)", &[Value::from(name)])?;
            let row = tx
                .db()
                .query_one(tx, "SELECT last_insert_rowid() AS id", &[])?
                .ok_or(DatabaseError::ColumnNotFound("id".to_string()))?;
            Ok(row.get_i64("id")?)
        })
    })
}

fn find_user(ctx: &Context, id: i64) -> Result<String, DemoError> {
    ctx.run_intercepted(intercept_parts!["Users", "Find"], |ctx| {
        let row = ctx
            .db()
            .query_one(ctx, "SELECT name FROM users WHERE id = ?1", &[Value::from(id)])?
            .ok_or(DemoError::NotFound(id))?;
        Ok(row.get_str("name")?.to_string())
    })
}

fn count_users(ctx: &Context) -> Result<i64, DemoError> {
    let parts = intercept_parts!["Users", "Count", with_only(["metrics"])];
    ctx.run_intercepted(parts, |ctx| {
        let row = ctx
            .db()
            .query_one(ctx, "SELECT COUNT(*) AS n FROM users", &[])?
            .ok_or(DatabaseError::ColumnNotFound("n".to_string()))?;
        Ok(row.get_i64("n")?)
    })
}

async fn run_demo(loaded: LoadedConfig) -> anyhow::Result<()> {
    let mut config = loaded.app;
    if config.database.path.is_none() {
        config.database.path = Some(":memory:".into());
    }

    let app = Application::builder(config)
        .with_hook(FnHook::new("schema").on_start(|ctx| {
            ctx.db().exec(
                ctx,
                "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
                &[],
            )?;
            Ok(())
        }))
        .build()?;
    app.start()?;

    println!("{}", "Gantry demo".bright_blue().bold());
    println!("interceptors: {}", app.registry().names().join(", "));

    let ctx = app.context();
    for name in ["ada", "grace", "linus"] {
        let id = create_user(&ctx, name)?;
        println!("{} created {} as #{}", "✓".green(), name.bright_white(), id);
    }

    match find_user(&ctx, 2) {
        Ok(name) => println!("{} found #2: {}", "✓".green(), name),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
    if let Err(e) = find_user(&ctx, 99) {
        println!("{} {}", "✗".red(), e);
    }
    println!("{} {} users", "✓".green(), count_users(&ctx)?);

    let (timed, _handle) = ctx.with_timeout(Duration::from_millis(25));
    tokio::select! {
        err = timed.done() => println!("{} deadline context finished: {}", "→".cyan(), err),
        _ = tokio::time::sleep(Duration::from_secs(1)) => println!("{} deadline never fired", "✗".red()),
    }

    if let Some(snapshot) = app.metrics_snapshot() {
        println!();
        println!("{}", snapshot.format_report());
    }

    app.stop()?;
    Ok(())
}
