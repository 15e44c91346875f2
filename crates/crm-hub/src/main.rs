//! # crm-hub
//!
//! CRM realtime hub binary: loads settings, opens the database, wires the
//! SQLite providers into the WebSocket server, and runs until a shutdown
//! signal arrives. A few admin subcommands seed users and conversations.

#![deny(unsafe_code)]

mod providers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crm_core::ids::UserId;
use crm_server::auth::JwtIdentityResolver;
use crm_server::{CrmServer, RealtimeDeps, ServerConfig};
use crm_settings::CrmSettings;
use crm_store::{ConnectionConfig, ConnectionPool, ConversationRepo, NewUser, UserRepo};

use crate::providers::{ActivitySnapshot, SqliteChatStore};

/// CRM realtime hub.
#[derive(Parser, Debug)]
#[command(name = "crm-hub", about = "CRM realtime hub")]
struct Cli {
    /// Settings file (defaults to `~/.crm/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Port to bind, overriding settings (0 for auto-assign).
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the WebSocket hub (default).
    Serve,
    /// Manage user profiles.
    #[command(subcommand)]
    User(UserCommand),
    /// Manage conversations.
    #[command(subcommand)]
    Conversation(ConversationCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum UserCommand {
    /// Create a user or refresh an existing one's display fields.
    Add {
        /// User ID (the credential subject).
        id: String,
        /// Login name.
        #[arg(long)]
        username: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Employee number.
        #[arg(long, default_value = "")]
        employee_no: String,
        /// Department.
        #[arg(long, default_value = "")]
        department: String,
        /// Avatar URL.
        #[arg(long, default_value = "")]
        avatar: String,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ConversationCommand {
    /// Open (or look up) the direct conversation between two users.
    Direct {
        /// User opening the conversation.
        creator: String,
        /// The other party.
        peer: String,
        /// Display name.
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Create a group conversation.
    Group {
        /// Display name.
        name: String,
        /// Creating user; always a member.
        #[arg(long)]
        creator: String,
        /// Additional members.
        #[arg(long = "member", num_args = 1..)]
        members: Vec<String>,
    },
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<CrmSettings> {
    let path = cli.settings.clone().unwrap_or_else(crm_settings::settings_path);
    let mut settings = crm_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

fn open_database(settings: &CrmSettings) -> Result<ConnectionPool> {
    let db_path = crm_settings::resolve_db_path(settings);
    ensure_parent_dir(&db_path)?;
    let config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        ..ConnectionConfig::default()
    };
    crm_store::open(&db_path, &config)
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    crm_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let pool = open_database(&settings)?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&settings, pool).await,
        Command::User(cmd) => run_user(&pool, cmd),
        Command::Conversation(cmd) => run_conversation(&pool, cmd),
    }
}

async fn serve(settings: &CrmSettings, pool: ConnectionPool) -> Result<()> {
    let metrics = crm_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let identity =
        JwtIdentityResolver::from_settings(&settings.auth).context("Invalid auth settings")?;

    let chat = Arc::new(SqliteChatStore::new(pool.clone()));
    let deps = RealtimeDeps {
        identity: Arc::new(identity),
        directory: chat.clone(),
        messages: chat.clone(),
        profiles: chat.clone(),
        snapshots: Arc::new(ActivitySnapshot::new(pool)),
        notifications: chat,
    };

    let server = CrmServer::new(ServerConfig::from_settings(settings), deps, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    server.shutdown().track(handle);
    if let Some(dashboard) = server.spawn_dashboard() {
        server.shutdown().track(dashboard);
    }
    tracing::info!(
        version = crm_core::constants::VERSION,
        "{} listening on ws://{addr}{}",
        crm_core::constants::NAME,
        crm_server::server::WS_PATH
    );

    wait_for_signal().await?;
    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}

fn run_user(pool: &ConnectionPool, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add {
            id,
            username,
            name,
            employee_no,
            department,
            avatar,
        } => {
            let conn = pool.get().context("Failed to get DB connection")?;
            let row = UserRepo::upsert(
                &conn,
                &NewUser {
                    id: &id,
                    username: &username,
                    name: &name,
                    employee_no: &employee_no,
                    department: &department,
                    avatar: &avatar,
                },
            )
            .context("Failed to save user")?;
            println!("{}\t{}\t{}", row.id, row.username, row.name);
        }
    }
    Ok(())
}

fn run_conversation(pool: &ConnectionPool, cmd: ConversationCommand) -> Result<()> {
    let conn = pool.get().context("Failed to get DB connection")?;
    match cmd {
        ConversationCommand::Direct {
            creator,
            peer,
            name,
        } => {
            let direct = ConversationRepo::get_or_create_direct(
                &conn,
                &UserId::from(creator),
                &UserId::from(peer),
                &name,
            )
            .context("Failed to open direct conversation")?;
            let state = if direct.created { "created" } else { "existing" };
            println!("{}\t{state}", direct.conversation.id);
        }
        ConversationCommand::Group {
            name,
            creator,
            members,
        } => {
            let members: Vec<UserId> = members.into_iter().map(UserId::from).collect();
            let conv = ConversationRepo::create_group(&conn, &name, &UserId::from(creator), &members)
                .context("Failed to create group")?;
            println!("{}\t{}", conv.id, conv.name);
        }
    }
    Ok(())
}
