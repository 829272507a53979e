use color_eyre::eyre::Report;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::instrument;

pub const CODE_NON_UNIQUE: &str = "2067";
pub const CODE_PRIMARY_KEY: &str = "1555";

static MIGRATOR: Migrator = sqlx::migrate!();

pub mod account;
pub mod message;
pub mod session;

/// Behaviour switches for the stores. Both default to the historical
/// behaviour of the service.
#[derive(Debug, Clone, Copy, Default)]
#[must_use]
pub struct StoreOptions {
    /// Keep caller-supplied metadata instead of the per-media placeholder.
    pub caller_metadata: bool,
    /// Report unknown usernames and wrong passwords with the same message.
    pub unified_credential_errors: bool,
}

#[derive(Debug, Clone)]
#[must_use]
pub struct Repository {
    pub accounts: account::AccountRepository,
    pub messages: message::MessageRepository,
    pub sessions: session::SessionRepository,
    connection: SqlitePool,
}

impl Repository {
    pub fn new(connection: SqlitePool, options: StoreOptions) -> Self {
        let accounts = account::AccountRepository {
            connection: connection.clone(),
            unified_credential_errors: options.unified_credential_errors,
        };
        let messages = message::MessageRepository {
            connection: connection.clone(),
            caller_metadata: options.caller_metadata,
        };
        let sessions = session::SessionRepository {
            connection: connection.clone(),
        };
        Self {
            accounts,
            messages,
            sessions,
            connection,
        }
    }

    #[instrument(skip(options))]
    pub async fn connect(database_url: &str, options: StoreOptions) -> Result<Self, Report> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(connect_options)
            .await
            .inspect_err(|error| tracing::error!(?error, "Failed to open database"))?;
        tracing::debug!("Opened database");
        Ok(Self::new(pool, options))
    }

    /// Single never-recycled connection, so the in-memory database lives as
    /// long as the pool does.
    pub async fn in_memory(options: StoreOptions) -> Result<Self, Report> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let repository = Self::new(pool, options);
        repository.initialize_schema().await?;
        Ok(repository)
    }

    /// File-backed database inside `directory`, for tests that need more
    /// than one connection.
    #[cfg(test)]
    pub(crate) async fn in_directory(directory: &std::path::Path, options: StoreOptions) -> Self {
        let database_url = format!("sqlite://{}", directory.join("mychat.db").display());
        let repository = Self::connect(&database_url, options).await.unwrap();
        repository.initialize_schema().await.unwrap();
        repository
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn initialize_schema(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.connection).await?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}
