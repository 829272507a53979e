use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

#[derive(sqlx::FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub username: String,
    pub created_at: NaiveDateTime,
    pub expired: bool,
}

#[derive(Debug, Clone)]
#[must_use]
pub struct SessionRepository {
    pub(super) connection: SqlitePool,
}

impl SessionRepository {
    #[instrument(skip(self), err(Debug))]
    pub async fn open(&self, username: &str) -> Result<Session, sqlx::Error> {
        let token = Uuid::new_v4().to_string();
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (token, username) VALUES (?, ?) RETURNING *",
        )
        .bind(token)
        .bind(username)
        .fetch_one(&self.connection)
        .await?;

        tracing::debug!(session.id = session.id, "Opened new session");
        Ok(session)
    }

    /// Username behind a live session token, if any.
    #[instrument(skip_all, err(Debug))]
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT username FROM sessions WHERE token = ? AND expired = 0",
        )
        .bind(token)
        .fetch_optional(&self.connection)
        .await
    }

    #[instrument(skip_all, err(Debug))]
    pub async fn expire(&self, token: &str) -> Result<(), sqlx::Error> {
        let expired = sqlx::query("UPDATE sessions SET expired = 1 WHERE token = ?")
            .bind(token)
            .execute(&self.connection)
            .await?
            .rows_affected();
        tracing::debug!(expired, "Expired session");
        Ok(())
    }
}
