use std::sync::Arc;

use anyhow::{Context, Result};
use huddle_auth::{CredentialValidator, TokenIssuer};
use huddle_config::AppConfig;
use huddle_database::{initialize_database, MessageRepository, RoomRepository, UserRepository};
use huddle_gateway::GatewayState;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything the server and the admin commands share.
#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub users: UserRepository,
    pub rooms: RoomRepository,
    pub messages: MessageRepository,
    pub validator: CredentialValidator,
    pub issuer: TokenIssuer,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let users = UserRepository::new(db_pool.clone());
        let rooms = RoomRepository::new(db_pool.clone());
        let messages = MessageRepository::new(db_pool.clone());

        if config.auth.uses_development_secret() {
            warn!("using the development JWT secret; set HUDDLE__AUTH__JWT_SECRET in production");
        }

        let validator = CredentialValidator::from_config(&config.auth, Arc::new(users.clone()));
        let issuer =
            TokenIssuer::from_config(&config.auth).context("invalid token lifetime settings")?;

        info!(url = %config.database.url, "backend services ready");

        Ok(Self {
            db_pool,
            users,
            rooms,
            messages,
            validator,
            issuer,
        })
    }

    /// Shared state for the HTTP/WebSocket gateway.
    pub fn gateway_state(&self, config: &AppConfig) -> GatewayState {
        GatewayState::new(
            self.validator.clone(),
            Arc::new(self.messages.clone()),
            Arc::new(self.rooms.clone()),
            config.realtime.clone(),
        )
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(?error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
