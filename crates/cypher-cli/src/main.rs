//! Command-line front end for the SugarCypher security core
//!
//! Every invocation opens the SQLite-backed context in the data directory,
//! so the master key, device fingerprint and session persist between runs.
//! Lockout counters are process-local and do not.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cypher_params::{DataClassification, SecurityConfig};
use cypher_security::{
    DeviceInfo, EncryptedEnvelope, SecurityContext, SqliteEvidenceSink,
};
use directories::ProjectDirs;
use serde_json::json;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cypher")]
#[command(about = "SugarCypher local security core", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or load the master key and device fingerprint
    Init,

    /// Encrypt a JSON value (or plain string) into an envelope
    Encrypt {
        /// Sensitivity tier
        #[arg(short, long, default_value = "confidential")]
        classification: DataClassification,

        /// Data to encrypt; `-` reads stdin
        data: String,
    },

    /// Decrypt an envelope
    Decrypt {
        /// Envelope JSON; `-` reads stdin
        envelope: String,
    },

    /// Session lifecycle
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Run a security health check and record it as compliance evidence
    Health,

    /// Run the compliance monitor until interrupted
    Monitor,

    /// Evidence outbox
    Evidence {
        #[command(subcommand)]
        command: EvidenceCommands,
    },

    /// Privacy settings
    Privacy {
        #[command(subcommand)]
        command: PrivacyCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session for a user
    Create {
        /// User id
        #[arg(short, long)]
        user: String,
    },
    /// Validate and refresh the current session
    Validate,
    /// End the current session
    End,
    /// Print the current session
    Show,
}

#[derive(Subcommand)]
enum EvidenceCommands {
    /// List recorded evidence, newest first
    List {
        /// Only records not yet delivered, oldest first
        #[arg(short, long)]
        pending: bool,

        /// Maximum records to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum PrivacyCommands {
    /// Print the effective settings
    Show {
        /// Also print the retention decision for a record this many days old
        #[arg(long)]
        age_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SecurityConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SecurityConfig::default(),
    };
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    let (context, outbox) = SecurityContext::open_sqlite(&data_dir, config, DeviceInfo::detect())
        .await
        .with_context(|| format!("opening security core in {}", data_dir.display()))?;

    match cli.command {
        Commands::Init => run_init(&context, &data_dir),
        Commands::Encrypt {
            classification,
            data,
        } => run_encrypt(&context, classification, &data).await?,
        Commands::Decrypt { envelope } => run_decrypt(&context, &envelope).await?,
        Commands::Session { command } => run_session(&context, command).await?,
        Commands::Health => run_health(&context).await?,
        Commands::Monitor => run_monitor(&context).await?,
        Commands::Evidence { command } => run_evidence(&outbox, command)?,
        Commands::Privacy { command } => run_privacy(&context, command)?,
    }

    Ok(())
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    ProjectDirs::from("org", "SugarCypher", "cypher")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .context("no home directory; pass --data-dir")
}

fn read_arg(value: &str) -> anyhow::Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading stdin")?;
    Ok(input.trim_end().to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_init(context: &SecurityContext, data_dir: &Path) {
    info!("Security core ready in {}", data_dir.display());
    println!("data dir:     {}", data_dir.display());
    println!("master key:   {}", if context.keystore.is_initialized() { "ready" } else { "missing" });
    println!("fingerprint:  {}", context.device.fingerprint());
    println!("session:      {:?}", context.restore);
}

async fn run_encrypt(
    context: &SecurityContext,
    classification: DataClassification,
    data: &str,
) -> anyhow::Result<()> {
    let raw = read_arg(data)?;
    let value = serde_json::from_str::<serde_json::Value>(&raw)
        .unwrap_or(serde_json::Value::String(raw));

    let envelope = context
        .codec
        .encrypt(&value, classification)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    context
        .evidence
        .record_data_access(
            "encrypt",
            "envelope",
            json!({ "classification": classification }),
        )
        .await?;

    print_json(&envelope)
}

async fn run_decrypt(context: &SecurityContext, envelope: &str) -> anyhow::Result<()> {
    let raw = read_arg(envelope)?;
    let envelope = EncryptedEnvelope::from_bytes(raw.as_bytes())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    match context.codec.decrypt_value(&envelope) {
        Ok(value) => {
            context
                .evidence
                .record_data_access(
                    "decrypt",
                    "envelope",
                    json!({ "classification": envelope.classification }),
                )
                .await?;
            print_json(&value)
        }
        Err(e) => {
            if e.is_integrity_failure() {
                context
                    .evidence
                    .record_security("envelope_rejected", json!({ "classification": envelope.classification }))
                    .await?;
            }
            anyhow::bail!(e.user_message())
        }
    }
}

async fn run_session(context: &SecurityContext, command: SessionCommands) -> anyhow::Result<()> {
    let sessions = &context.sessions;

    match command {
        SessionCommands::Create { user } => match sessions.create_session(&user).await {
            Ok(session) => {
                context
                    .evidence
                    .record_user_action("session_created", "session", json!({}))
                    .await?;
                print_json(&session)?;
            }
            Err(e) => {
                warn!("Session creation failed: {}", e);
                if sessions.is_locked_out().await {
                    context
                        .evidence
                        .record_security("session_lockout", json!({}))
                        .await?;
                }
                anyhow::bail!(e.user_message());
            }
        },
        SessionCommands::Validate => {
            let valid = sessions.validate_session().await?;
            println!("{}", if valid { "valid" } else { "no valid session" });
        }
        SessionCommands::End => {
            sessions.invalidate_session().await;
            context
                .evidence
                .record_user_action("session_ended", "session", json!({}))
                .await?;
            println!("session ended");
        }
        SessionCommands::Show => match sessions.current_session().await {
            Some(session) => print_json(&session)?,
            None => println!("no session"),
        },
    }

    Ok(())
}

async fn run_health(context: &SecurityContext) -> anyhow::Result<()> {
    match context.monitor.run_once().await? {
        Some(report) => print_json(&report),
        None => {
            // Only reachable if a monitor loop shares this context
            print_json(&context.health.check().await)
        }
    }
}

async fn run_monitor(context: &SecurityContext) -> anyhow::Result<()> {
    let token = context.monitor.cancel_token();
    let Some(handle) = Arc::clone(&context.monitor).spawn() else {
        println!("compliance monitor is disabled in the configuration");
        return Ok(());
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Stopping compliance monitor");
    token.cancel();
    handle.await?;
    Ok(())
}

fn run_evidence(outbox: &SqliteEvidenceSink, command: EvidenceCommands) -> anyhow::Result<()> {
    match command {
        EvidenceCommands::List { pending, limit } => {
            let records = if pending {
                outbox.pending(limit)?
            } else {
                outbox.recent(limit)?
            };
            println!("{} pending delivery", outbox.pending_count()?);
            print_json(&records)
        }
    }
}

fn run_privacy(context: &SecurityContext, command: PrivacyCommands) -> anyhow::Result<()> {
    match command {
        PrivacyCommands::Show { age_days } => {
            print_json(&context.privacy.settings())?;
            if let Some(days) = age_days {
                let age_ms = i64::from(days) * cypher_params::MS_PER_DAY;
                println!(
                    "record aged {} days: {:?}",
                    days,
                    context.privacy.retention_action(age_ms)
                );
            }
            Ok(())
        }
    }
}
