use crate::models::Outcome;
use crate::repository::Repository;
use crate::state::SharedState;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use tracing::{Level, instrument};

pub const SESSION_COOKIE_NAME: &str = "session-token";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Identity {
    pub username: String,
    pub session_token: String,
}

/// Who is behind a request. Every request starts out anonymous; a session
/// cookie naming a live session makes it authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum AuthState {
    Anonymous,
    Authenticated(Identity),
}

impl AuthState {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(&identity.username),
        }
    }

    /// Refuses anonymous callers; they have to log in again.
    pub fn require(self) -> Result<Identity, RejectionCause> {
        match self {
            Self::Authenticated(identity) => Ok(identity),
            Self::Anonymous => Err(RejectionCause::NotAuthenticated),
        }
    }
}

/// Checks the credentials and opens a session on success. The failure carries
/// the credential store's status message unchanged.
#[instrument(skip(repository, password))]
pub async fn log_in(
    repository: &Repository,
    username: &str,
    password: &str,
) -> Result<Identity, Outcome> {
    let outcome = repository.accounts.verify_login(username, password).await;
    if !outcome.success {
        return Err(outcome);
    }

    let session = repository
        .sessions
        .open(username)
        .await
        .map_err(|_| Outcome::failure("login failed"))?;

    Ok(Identity {
        username: session.username,
        session_token: session.token,
    })
}

#[instrument(skip_all, fields(username = identity.username))]
pub async fn log_out(repository: &Repository, identity: &Identity) -> Result<AuthState, sqlx::Error> {
    repository.sessions.expire(&identity.session_token).await?;
    tracing::debug!("Logged out");
    Ok(AuthState::Anonymous)
}

impl<S> FromRequestParts<S> for AuthState
where
    SharedState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RejectionCause;

    #[instrument(name = "auth_layer", skip_all, err(Debug, level = Level::WARN))]
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = SharedState::from_ref(state);
        let cookies = CookieJar::from_headers(&parts.headers);
        let Some(token) = cookies.get(SESSION_COOKIE_NAME).map(Cookie::value_trimmed) else {
            return Ok(Self::Anonymous);
        };

        let username = state
            .repository
            .sessions
            .resolve(token)
            .await
            .map_err(|_| RejectionCause::InternalServerError)?;

        match username {
            Some(username) => {
                let identity = Identity {
                    username,
                    session_token: token.to_owned(),
                };
                tracing::trace!(?identity, "Cookie authorization successful");
                Ok(Self::Authenticated(identity))
            }
            None => {
                tracing::debug!("Session cookie is stale, treating request as anonymous");
                Ok(Self::Anonymous)
            }
        }
    }
}

/// Extractor for handlers that only serve authenticated callers.
#[derive(Debug)]
#[must_use]
pub struct Session(pub Identity);

impl<S> FromRequestParts<S> for Session
where
    SharedState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RejectionCause;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        AuthState::from_request_parts(parts, state)
            .await?
            .require()
            .map(Self)
    }
}

#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum RejectionCause {
    NotAuthenticated,
    InternalServerError,
}

impl IntoResponse for RejectionCause {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Self::NotAuthenticated => Redirect::to(LOGIN_PATH).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreOptions;

    async fn repository() -> Repository {
        let repository = Repository::in_memory(StoreOptions::default())
            .await
            .unwrap();
        repository.accounts.create_user("alice", "pw").await;
        repository
    }

    #[test]
    fn anonymous_is_refused() {
        assert_eq!(
            AuthState::Anonymous.require(),
            Err(RejectionCause::NotAuthenticated)
        );
        assert_eq!(AuthState::Anonymous.username(), None);
    }

    #[tokio::test]
    async fn login_then_logout_round_trips_through_states() {
        let repository = repository().await;

        let identity = log_in(&repository, "alice", "pw").await.unwrap();
        assert_eq!(identity.username, "alice");
        let state = AuthState::Authenticated(identity.clone());
        assert_eq!(state.username(), Some("alice"));

        let state = log_out(&repository, &identity).await.unwrap();
        assert_eq!(state, AuthState::Anonymous);
        let resolved = repository
            .sessions
            .resolve(&identity.session_token)
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn failed_login_keeps_store_message() {
        let repository = repository().await;
        assert_eq!(
            log_in(&repository, "alice", "nope").await,
            Err(Outcome::failure("password incorrect"))
        );
        assert_eq!(
            log_in(&repository, "ghost", "pw").await,
            Err(Outcome::failure("username not valid"))
        );
    }
}
