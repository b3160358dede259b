//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;

use taskboard_core::config::{ClientConfig, DEFAULT_HOST};
use taskboard_core::session::{MemorySession, Role, SessionContext};
use taskboard_core::signal::UiSignal;
use taskboard_realtime::SyncEngine;
use taskboard_rest::RestClient;

pub mod board;
pub mod dashboard;
pub mod notifications;

/// Realtime task board client
#[derive(Parser)]
#[command(name = "taskboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Backend host and context path
    #[arg(long, global = true, env = "TASKBOARD_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Use wss/https instead of ws/http
    #[arg(long, global = true, env = "TASKBOARD_SECURE")]
    pub secure: bool,

    /// Username of the logged-in user
    #[arg(short, long, global = true, env = "TASKBOARD_USER")]
    pub user: Option<String>,

    /// Session token issued at login
    #[arg(short, long, global = true, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Role of the logged-in user (developer, scrum_master, product_owner)
    #[arg(long, global = true, env = "TASKBOARD_ROLE")]
    pub role: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive board console (board, trash, chat, notifications)
    Board(board::BoardArgs),

    /// Watch the statistics dashboard
    Dashboard,

    /// List pending notifications and exit
    Notifications,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let session = self.session()?;
        let config = ClientConfig::new(self.host.clone(), self.secure);

        match self.command {
            Commands::Board(args) => board::execute(args, &config, session).await,
            Commands::Dashboard => dashboard::execute(&config, session).await,
            Commands::Notifications => notifications::execute(&config, session).await,
        }
    }

    fn session(&self) -> Result<Arc<MemorySession>> {
        let user = self
            .user
            .clone()
            .context("No user given. Pass --user or set TASKBOARD_USER.")?;
        let token = self
            .token
            .clone()
            .context("No session token given. Pass --token or set TASKBOARD_TOKEN.")?;
        let role = match self.role.as_deref() {
            Some(raw) => Some(
                Role::parse(raw).ok_or_else(|| anyhow::anyhow!("Unknown role: {raw}"))?,
            ),
            None => None,
        };
        Ok(Arc::new(MemorySession::new(user, token, role)))
    }
}

/// Build the REST client and the engine for a session.
pub(crate) fn connect(
    config: &ClientConfig,
    session: Arc<MemorySession>,
) -> Result<(SyncEngine, mpsc::UnboundedReceiver<UiSignal>)> {
    let session: Arc<dyn SessionContext> = session;
    let api = RestClient::new(config.http_base()?, session.clone());
    let (engine, signals) = SyncEngine::new(config, session, Arc::new(api))?;
    Ok((engine, signals))
}

/// Block until the user acknowledges a forced logout.
pub(crate) async fn acknowledge_logout(notice: String) {
    println!();
    println!("{} {}", "⚠".red().bold(), notice.red());
    let _ = tokio::task::spawn_blocking(move || {
        dialoguer::Confirm::new()
            .with_prompt("Acknowledge")
            .default(true)
            .show_default(false)
            .interact_opt()
    })
    .await;
}
