//! `vouch`: moderator console for the vouch verification queue.
//!
//! # Usage
//!
//! ```
//! vouch --url http://localhost:8080 --user gateway --password secret queue
//! vouch --config ~/.config/vouch/config.toml deny 42 --block forged document
//! ```
//!
//! Decisions are sent through the same text-command surface the chat
//! gateway uses, under `moderator_id` and `roles` from the config, so the
//! server applies the same authorization and idempotency rules.

mod client;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vouch_core::{command::Command, request::Status};

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vouch", about = "Moderator console for the vouch verification queue")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE")]
  config: Option<std::path::PathBuf>,

  /// Base URL of the vouch server (default: http://localhost:8080).
  #[arg(long, env = "VOUCH_URL")]
  url: Option<String>,

  /// Adapter username.
  #[arg(long, env = "VOUCH_USER")]
  user: Option<String>,

  /// Adapter password (plaintext).
  #[arg(long, env = "VOUCH_PASSWORD")]
  password: Option<String>,

  /// Platform user id decisions are recorded under.
  #[arg(long, env = "VOUCH_MODERATOR")]
  moderator: Option<String>,

  /// Roles to present; one must be a configured moderator role.
  #[arg(long, env = "VOUCH_ROLES", value_delimiter = ',')]
  roles: Option<Vec<String>>,

  /// Command prefix the server is configured with.
  #[arg(long, env = "VOUCH_PREFIX")]
  prefix: Option<String>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// List verification requests, oldest first.
  Queue {
    /// Only show requests with this status (pending, approved, denied).
    #[arg(long)]
    status: Option<Status>,
  },
  /// Show one request.
  Show { id: String },
  /// Show the decisions applied to a request.
  History { id: String },
  Approve { id: String },
  Deny {
    id:     String,
    /// Also block the requester from resubmitting.
    #[arg(long)]
    block:  bool,
    reason: Vec<String>,
  },
  Unblock { id: String },
}

// ─── Config file ─────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  #[serde(default)]
  url:          String,
  #[serde(default)]
  username:     String,
  #[serde(default)]
  password:     String,
  #[serde(default)]
  moderator_id: String,
  #[serde(default)]
  roles:        Vec<String>,
  #[serde(default)]
  prefix:       String,
}

/// Flags override the config file, which overrides defaults.
fn merge(args: &Args, file: ConfigFile) -> ApiConfig {
  let pick = |flag: &Option<String>, file: String, default: &str| {
    flag
      .clone()
      .or_else(|| (!file.is_empty()).then_some(file))
      .unwrap_or_else(|| default.to_string())
  };
  ApiConfig {
    base_url:  pick(&args.url, file.url, "http://localhost:8080"),
    username:  pick(&args.user, file.username, ""),
    password:  pick(&args.password, file.password, ""),
    moderator: pick(&args.moderator, file.moderator_id, ""),
    roles:     args.roles.clone().unwrap_or(file.roles),
    prefix:    pick(&args.prefix, file.prefix, "!"),
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  let config = merge(&args, file_cfg);
  let client = ApiClient::new(config.clone())?;

  let decision = match args.command {
    Cmd::Queue { status } => {
      for req in client.queue(status).await? {
        println!("{}", render::queue_line(&req));
      }
      return Ok(());
    }
    Cmd::Show { id } => {
      print!("{}", render::request(&client.show(&id).await?));
      return Ok(());
    }
    Cmd::History { id } => {
      for event in client.history(&id).await? {
        println!("{}", render::history_line(&event));
      }
      return Ok(());
    }
    Cmd::Approve { id } => Command::Approve(id.into()),
    Cmd::Deny { id, block, reason } => Command::Deny {
      requester_id: id.into(),
      block,
      reason: (!reason.is_empty()).then(|| reason.join(" ")),
    },
    Cmd::Unblock { id } => Command::Unblock(id.into()),
  };

  if config.moderator.is_empty() {
    anyhow::bail!("no moderator id: pass --moderator or set moderator_id in the config file");
  }
  let outcome = client.run(&decision).await?;
  println!("{}", render::outcome(&outcome));
  Ok(())
}
