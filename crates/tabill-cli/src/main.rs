//! Tabill command line.
//!
//! Signs in against the hosted backend, shows and switches the active
//! branch, and runs the local server that keeps the app shell available
//! offline.

mod app;
mod server;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tabill_core::shell::{CacheStorage, CACHE_VERSION};

use app::App;

#[derive(Parser)]
#[command(name = "tabill", version, about = "Tabill restaurant tools")]
struct Cli {
    /// Also write daily-rotated logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Clear the session and stored credentials
    Logout,
    /// List branches and the active one
    Branches {
        #[command(subcommand)]
        action: Option<BranchAction>,
    },
    /// Run the local server
    Serve {
        /// Overrides TABILL_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show the cached shell buckets
    Shell,
}

#[derive(Subcommand)]
enum BranchAction {
    /// Make a branch the active one
    Use { id: String },
}

/// Initialize the tracing subscriber. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(default_filter: &str, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // RUST_LOG overrides the default (e.g., RUST_LOG=tabill_core=debug)
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tabill.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let default_filter = match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    let _guard = init_tracing(default_filter, cli.log_dir.as_ref());
    info!("Tabill starting");

    let mut app = App::new()?;
    match cli.command {
        Command::Login { email } => login(&mut app, email).await,
        Command::Logout => {
            app.logout()?;
            println!("Logged out");
            Ok(())
        }
        Command::Branches { action: None } => list_branches(&mut app).await,
        Command::Branches {
            action: Some(BranchAction::Use { id }),
        } => use_branch(&mut app, &id).await,
        Command::Serve { port } => server::start_server(&app, port).await,
        Command::Shell => shell_status(&app),
    }
}

async fn login(app: &mut App, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| app.config.last_email.clone()) {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    let password = rpassword::prompt_password(format!("Password for {email}: "))
        .context("Failed to read password")?;

    app.login(&email, &password).await?;

    let role = app
        .session
        .data
        .as_ref()
        .and_then(|d| d.actor())
        .map(|actor| if actor.is_readonly() { "staff" } else { "owner" })
        .unwrap_or("no profile");
    println!("Signed in as {email} ({role})");
    Ok(())
}

async fn list_branches(app: &mut App) -> Result<()> {
    let (actor, _resolver, state) = app.resolve_branches().await?;
    if actor.is_none() {
        println!("No owner profile for this account");
        return Ok(());
    }

    if state.needs_first_branch {
        println!("No branches yet. Create your first branch to get started.");
        return Ok(());
    }

    if state.branches.is_empty() {
        match state.active_branch_id {
            Some(ref id) if state.is_readonly => {
                println!("Assigned branch: {id} (branch list unavailable)");
                return Ok(());
            }
            _ => anyhow::bail!("Could not load branches. Run with RUST_LOG=debug for details."),
        }
    }

    for branch in &state.branches {
        let marker = if state.active_branch_id.as_deref() == Some(branch.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<24} {}", branch.id, branch.name);
    }
    if state.is_readonly {
        println!("\nBranch is assigned by the owner and cannot be changed.");
    }
    Ok(())
}

async fn use_branch(app: &mut App, branch_id: &str) -> Result<()> {
    let (_actor, resolver, state) = app.resolve_branches().await?;
    if state.is_readonly {
        anyhow::bail!("Branch is assigned by the owner and cannot be changed");
    }
    let Some(branch) = state.branches.iter().find(|b| b.id == branch_id) else {
        anyhow::bail!("Unknown branch: {branch_id}");
    };

    resolver.set_active_branch_id(&branch.id).await;
    println!("Active branch: {}", branch.name);
    Ok(())
}

fn shell_status(app: &App) -> Result<()> {
    if !app.config.shell_cache {
        println!("Shell cache is kept in memory; nothing stored on disk");
        return Ok(());
    }

    let storage = app.shell_storage()?;
    let buckets = storage.keys()?;
    if buckets.is_empty() {
        println!("No shell cached yet. Run `tabill serve` while online.");
        return Ok(());
    }

    for bucket in buckets {
        let note = if bucket == CACHE_VERSION { "current" } else { "stale" };
        println!("{bucket} ({note})");
        for entry in storage.entries(&bucket)? {
            println!("  {} {:<48} {}", entry.status, entry.key, entry.age_display());
        }
    }
    Ok(())
}
