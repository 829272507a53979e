use super::{CODE_NON_UNIQUE, CODE_PRIMARY_KEY};
use crate::models::Outcome;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;
use sqlx::SqlitePool;
use tracing::instrument;

pub const UNIFIED_CREDENTIALS_MESSAGE: &str = "invalid credentials";

#[derive(sqlx::FromRow, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

/// Credential store over the `users` table.
#[derive(Debug, Clone)]
#[must_use]
pub struct AccountRepository {
    pub(super) connection: SqlitePool,
    pub(super) unified_credential_errors: bool,
}

impl AccountRepository {
    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        tracing::trace!("Searching for user in the repository");
        sqlx::query_as::<_, User>("SELECT username, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.connection)
            .await
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, RegistrationError> {
        if username.is_empty() || password.is_empty() {
            tracing::debug!("Rejecting registration: empty credentials");
            return Err(RegistrationError::EmptyCredentials);
        }

        let existing = self
            .find_by_username(username)
            .await
            .inspect_err(|error| tracing::error!(?error, "Database error during registration"))?;
        if existing.is_some() {
            tracing::debug!("Rejecting registration: username is taken");
            return Err(RegistrationError::NameTaken);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .inspect_err(|error| tracing::error!(?error, "Failed to hash password"))
            .map_err(RegistrationError::Hash)?
            .to_string();

        let query = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash) VALUES (?, ?) RETURNING username, password_hash",
        )
        .bind(username)
        .bind(password_hash);

        query
            .fetch_one(&self.connection)
            .await
            .inspect(|_| tracing::debug!("Successfully registered new user"))
            .map_err(RegistrationError::from_insert_error)
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Outcome {
        Outcome::from_result(&self.register(username, password).await, "created")
    }

    #[instrument(skip(self, password))]
    pub async fn verify(&self, username: &str, password: &str) -> Result<User, LoginError> {
        let user = self
            .find_by_username(username)
            .await
            .inspect_err(|error| tracing::error!(?error, "Database error during login"))?
            .ok_or_else(|| {
                tracing::debug!("Rejecting login attempt: unknown username");
                LoginError::UnknownUsername
            })?;

        let stored_hash = PasswordHash::try_from(user.password_hash.as_str())
            .inspect_err(|error| tracing::error!(?error, "Stored password hash is malformed"))
            .map_err(LoginError::Hash)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &stored_hash)
            .map_err(|error| match error {
                argon2::password_hash::Error::Password => {
                    tracing::debug!("Rejecting login attempt: password incorrect");
                    LoginError::PasswordIncorrect
                }
                _ => {
                    tracing::error!(?error, "Failed to verify password hash");
                    LoginError::Hash(error)
                }
            })?;

        tracing::debug!("Credentials verified");
        Ok(user)
    }

    /// Succeeds with an empty message. Failure messages tell an unknown
    /// username apart from a wrong password unless unified errors are enabled.
    pub async fn verify_login(&self, username: &str, password: &str) -> Outcome {
        match self.verify(username, password).await {
            Ok(_) => Outcome::success(""),
            Err(LoginError::UnknownUsername | LoginError::PasswordIncorrect)
                if self.unified_credential_errors =>
            {
                Outcome::failure(UNIFIED_CREDENTIALS_MESSAGE)
            }
            Err(error) => Outcome::failure(error.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("username and password must not be empty")]
    EmptyCredentials,

    #[error("user already exists")]
    NameTaken,

    #[error("user creation failed")]
    Hash(argon2::password_hash::Error),

    #[error("user creation failed")]
    Database(#[from] sqlx::Error),
}

impl RegistrationError {
    /// A unique violation means a concurrent registration of the same name
    /// got past the existence check first.
    fn from_insert_error(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(error)
                if error
                    .code()
                    .is_some_and(|code| code == CODE_NON_UNIQUE || code == CODE_PRIMARY_KEY) =>
            {
                tracing::debug!(?error, "Rejecting registration: username is taken");
                Self::NameTaken
            }
            _ => {
                tracing::error!(?error, "Database error during registration");
                Self::Database(error)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("username not valid")]
    UnknownUsername,

    #[error("password incorrect")]
    PasswordIncorrect,

    #[error("login failed")]
    Hash(argon2::password_hash::Error),

    #[error("login failed")]
    Database(#[from] sqlx::Error),
}
