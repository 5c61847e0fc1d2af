use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use huddle_auth::TokenKind;
use huddle_config::{load as load_config, AppConfig};
use huddle_database::entities::format_timestamp;
use huddle_database::MessageStore;
use huddle_gateway::build_router;
use huddle_runtime::{shutdown_signal, telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Huddle realtime chat backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve,
    /// Register a user account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Create a chat room
    CreateRoom {
        #[arg(long)]
        name: String,
        /// Room id to use instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },
    /// Mint a token for an existing user
    IssueToken {
        /// Public id of the user
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "access")]
        kind: TokenKind,
    },
    /// Print the stored history of a room
    History {
        #[arg(long)]
        room: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::CreateUser { username, email } => create_user(&username, email.as_deref()).await,
        Commands::CreateRoom { name, id } => create_room(&name, id.as_deref()).await,
        Commands::IssueToken { user, kind } => issue_token(&user, kind).await,
        Commands::History { room } => print_history(&room).await,
    }
}

async fn bootstrap() -> anyhow::Result<(AppConfig, BackendServices)> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    Ok((config, services))
}

async fn run_server() -> anyhow::Result<()> {
    let (config, services) = bootstrap().await?;

    info!("starting Huddle backend");

    let state = services.gateway_state(&config);
    let registry = state.registry().clone();
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let closed = registry.drain();
            info!(sessions = closed, "closed live sessions");
        })
        .await
        .context("http server error")?;

    services.db_pool.close().await;
    info!("backend shut down");
    Ok(())
}

async fn create_user(username: &str, email: Option<&str>) -> anyhow::Result<()> {
    let (_, services) = bootstrap().await?;

    let user = services
        .users
        .create(username, email)
        .await
        .with_context(|| format!("failed to create user {username}"))?;

    println!("created user {} ({})", user.username, user.public_id);
    Ok(())
}

async fn create_room(name: &str, id: Option<&str>) -> anyhow::Result<()> {
    let (_, services) = bootstrap().await?;

    let room = services
        .rooms
        .create(name, id)
        .await
        .with_context(|| format!("failed to create room {name}"))?;

    println!("created room {} ({})", room.name, room.room_id);
    Ok(())
}

async fn issue_token(user: &str, kind: TokenKind) -> anyhow::Result<()> {
    if kind == TokenKind::Unknown {
        bail!("token kind must be access or refresh");
    }

    let (_, services) = bootstrap().await?;

    let Some(user) = services
        .users
        .find_by_public_id(user)
        .await
        .context("failed to look up user")?
    else {
        bail!("no user with id {user}");
    };

    let token = services
        .issuer
        .issue(&user.public_id, kind)
        .context("failed to issue token")?;

    println!("{token}");
    Ok(())
}

async fn print_history(room: &str) -> anyhow::Result<()> {
    let (_, services) = bootstrap().await?;

    if services.rooms.find(room).await?.is_none() {
        bail!("no room with id {room}");
    }

    let messages = services
        .messages
        .history(room)
        .await
        .with_context(|| format!("failed to load history for room {room}"))?;

    if messages.is_empty() {
        println!("No messages in room {room}");
        return Ok(());
    }

    println!("{:<28} {:<20} {}", "Timestamp", "User", "Message");
    println!("{}", "-".repeat(80));
    for message in messages {
        println!(
            "{:<28} {:<20} {}",
            format_timestamp(&message.created_at),
            message.sender_username,
            message.body
        );
    }

    Ok(())
}
