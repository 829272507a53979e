#![allow(clippy::missing_errors_doc)]

use axum::Router;
use axum::routing::{get, post};
use clap::{Parser, Subcommand};
use color_eyre::eyre::Report;
use repository::{Repository, StoreOptions};
use state::SharedState;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing::instrument;

pub mod auth;
pub mod endpoints;
pub mod layers;
pub mod models;
pub mod repository;
pub mod state;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
#[must_use]
pub struct Settings {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, default_value_t = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000))]
    pub listen: SocketAddr,

    #[arg(long, default_value = "sqlite://mychat.db")]
    pub database_url: String,

    /// User whose conversation with the logged-in user is shown on `/`.
    #[arg(long, default_value = "nick")]
    pub peer: String,

    /// Store caller-supplied metadata for image and video messages instead
    /// of the fixed placeholders.
    #[arg(long)]
    pub caller_metadata: bool,

    /// Answer both unknown usernames and wrong passwords with
    /// "invalid credentials".
    #[arg(long)]
    pub unified_credential_errors: bool,
}

#[derive(Subcommand, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Command {
    /// Serve the web application (default).
    #[default]
    Serve,
    /// Create or upgrade the database schema and exit.
    Initdb,
}

impl Settings {
    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            caller_metadata: self.caller_metadata,
            unified_credential_errors: self.unified_credential_errors,
        }
    }
}

pub fn router(shared_state: SharedState) -> Router {
    Router::new()
        .route("/", get(endpoints::root))
        .route("/send", post(endpoints::send))
        .route("/conversation/{peer}", get(endpoints::conversation))
        .route(
            "/login",
            get(endpoints::account::login_page).post(endpoints::account::login),
        )
        .route(
            "/register",
            get(endpoints::account::register_page).post(endpoints::account::register),
        )
        .route(
            "/add",
            get(endpoints::account::register_page).post(endpoints::account::register),
        )
        .route("/logout", get(endpoints::account::logout))
        .layer(layers::trace_layer())
        .with_state(shared_state)
}

#[instrument]
pub async fn run(settings: Settings) -> Result<(), Report> {
    let repository = Repository::connect(&settings.database_url, settings.store_options()).await?;
    repository.initialize_schema().await?;

    if settings.command.unwrap_or_default() == Command::Initdb {
        tracing::info!("Successfully initialized the database");
        return Ok(());
    }

    let shared_state = SharedState {
        repository,
        peer: settings.peer.into(),
    };

    let listener = TcpListener::bind(settings.listen).await?;
    tracing::info!(listen_addr = ?listener.local_addr()?, "Bound to local socket");

    let service = router(shared_state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(self::shutdown_signal())
        .await?;

    Ok(())
}

#[instrument]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c()
        .await
        .inspect(|()| tracing::info!("Caught CTRL+C signal, shutting down"))
        .inspect_err(|error| tracing::error!(?error, "Failed to await CTRL+C signal"));
}
