use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use session_core::{
    AuthGate, AuthState, Decision, Role, SessionConfig, SessionRecord, SessionStore,
};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sealed session control", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the session slot
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a session record (JSON) and print the blob
    Seal {
        /// Record file; stdin when omitted
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Unseal a blob and print the record as JSON
    Unseal { blob: String },
    /// Store a new session in the slot
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ttl_minutes: Option<i64>,
        /// Page requested before login, or the login page query string
        #[arg(long)]
        return_to: Option<String>,
    },
    /// Remove the stored session
    Logout,
    /// Show the current auth state
    Status,
    /// Evaluate a protected path: ALLOW or REDIRECT <target>
    Check { path: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Seal { record } => seal_command(&config, record),
        Commands::Unseal { blob } => unseal_command(&config, &blob),
        Commands::Login {
            token,
            role,
            user_id,
            email,
            name,
            ttl_minutes,
            return_to,
        } => {
            let role: Role = role.parse()?;
            let mut record = SessionRecord::new(token, role.as_str());
            record.user_id = user_id;
            record.email = email;
            record.display_name = name;
            if let Some(minutes) = ttl_minutes {
                if minutes <= 0 {
                    return Err(anyhow!("--ttl-minutes must be positive"));
                }
                record.expires_at = Some(Utc::now() + Duration::minutes(minutes));
            }
            login_command(&config, &record, role, return_to.as_deref())
        }
        Commands::Logout => logout_command(&config),
        Commands::Status => status_command(&config),
        Commands::Check { path } => check_command(&config, &path),
    }
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::load(cli.config.as_deref()).context("load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn gate(config: &SessionConfig) -> Result<AuthGate> {
    let store = SessionStore::from_config(config).context("open session store")?;
    Ok(AuthGate::new(store, config.routes.clone()))
}

fn seal_command(config: &SessionConfig, record_path: Option<PathBuf>) -> Result<()> {
    let json = match record_path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("read record {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let record: SessionRecord = serde_json::from_str(&json).context("parse session record")?;
    let store = SessionStore::from_config(config)?;
    println!("{}", store.codec().seal(&record)?);
    Ok(())
}

fn unseal_command(config: &SessionConfig, blob: &str) -> Result<()> {
    let store = SessionStore::from_config(config)?;
    let record = store.codec().unseal(blob)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn login_command(
    config: &SessionConfig,
    record: &SessionRecord,
    role: Role,
    return_to: Option<&str>,
) -> Result<()> {
    let gate = gate(config)?;
    gate.store().save(record)?;
    // accepts either a bare path or the login page's query string
    let requested = return_to.and_then(|r| {
        if r.starts_with('?') {
            config.routes.return_target(r)
        } else {
            Some(r.to_string())
        }
    });
    let destination = gate.post_login_destination(role, requested.as_deref());
    info!(%role, "logged in");
    println!("{destination}");
    Ok(())
}

fn logout_command(config: &SessionConfig) -> Result<()> {
    gate(config)?.store().clear()?;
    println!("logged out");
    Ok(())
}

fn status_command(config: &SessionConfig) -> Result<()> {
    match gate(config)?.state() {
        AuthState::Unauthenticated => println!("unauthenticated"),
        AuthState::Authenticated { role, record } => {
            println!("authenticated");
            println!("role: {role}");
            if let Some(user_id) = &record.user_id {
                println!("user: {user_id}");
            }
            if let Some(expires_at) = record.expires_at {
                println!("expires: {}", expires_at.to_rfc3339());
            }
        }
    }
    Ok(())
}

fn check_command(config: &SessionConfig, path: &str) -> Result<()> {
    match gate(config)?.evaluate(path) {
        Decision::Allow => println!("ALLOW"),
        Decision::RedirectTo(target) => println!("REDIRECT {target}"),
    }
    Ok(())
}
