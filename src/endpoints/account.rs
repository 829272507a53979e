use super::{flash, take_flash};
use crate::auth::{self, SESSION_COOKIE_NAME, Session};
use crate::state::SharedState;
use askama::Template;
use axum::response::{Html, IntoResponse, Redirect};
use axum::{Form, debug_handler, extract::State, http::StatusCode};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

const EMPTY_CREDENTIALS: &str = "username and password must not be empty";

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate<'a> {
    pub title: &'a str,
    pub error: Option<&'a str>,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate<'a> {
    pub title: &'a str,
    pub error: Option<&'a str>,
}

#[derive(Deserialize, Validate, Debug)]
#[must_use]
pub struct CredentialsForm {
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug)]
#[must_use]
pub enum AuthResult {
    Registered(Redirect),
    LoggedIn(CookieJar, Redirect),
    Rejected(Html<String>),
    Error(StatusCode),
}

impl AuthResult {
    fn rejected(template: &impl Template) -> Self {
        template
            .render()
            .map_or(Self::Error(StatusCode::INTERNAL_SERVER_ERROR), |page| {
                Self::Rejected(Html(page))
            })
    }
}

impl IntoResponse for AuthResult {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Registered(redirect) => redirect.into_response(),
            Self::LoggedIn(cookie_jar, redirect) => (cookie_jar, redirect).into_response(),
            Self::Rejected(page) => page.into_response(),
            Self::Error(status_code) => status_code.into_response(),
        }
    }
}

#[instrument(skip_all)]
#[debug_handler]
pub async fn login_page(jar: CookieJar) -> Result<impl IntoResponse, StatusCode> {
    let (jar, notice) = take_flash(jar);
    let template = LoginTemplate {
        title: env!("CARGO_CRATE_NAME"),
        error: None,
        notice,
    };

    template
        .render()
        .map(|page| (jar, Html(page)))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[instrument(skip_all, fields(username = credentials.username))]
#[debug_handler]
pub async fn login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(credentials): Form<CredentialsForm>,
) -> AuthResult {
    let rejected = |error: &str| {
        AuthResult::rejected(&LoginTemplate {
            title: env!("CARGO_CRATE_NAME"),
            error: Some(error),
            notice: None,
        })
    };

    if credentials.validate().is_err() {
        tracing::debug!("Rejecting login attempt: empty credentials");
        return rejected(EMPTY_CREDENTIALS);
    }

    match auth::log_in(&state.repository, &credentials.username, &credentials.password).await {
        Ok(identity) => {
            let base_cookie = Cookie::new(SESSION_COOKIE_NAME, identity.session_token);
            let cookie = Cookie::build(base_cookie)
                .path("/")
                .http_only(true)
                .secure(false)
                .same_site(SameSite::Lax);
            let jar = flash(jar.add(cookie), "You were logged in");
            AuthResult::LoggedIn(jar, Redirect::to("/"))
        }
        Err(outcome) => rejected(&outcome.message),
    }
}

#[instrument(skip_all)]
#[debug_handler]
pub async fn register_page() -> Result<impl IntoResponse, StatusCode> {
    RegisterTemplate {
        title: env!("CARGO_CRATE_NAME"),
        error: None,
    }
    .render()
    .map(Html)
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[instrument(skip_all, fields(username = credentials.username))]
#[debug_handler]
pub async fn register(
    State(state): State<SharedState>,
    Form(credentials): Form<CredentialsForm>,
) -> AuthResult {
    let rejected = |error: &str| {
        AuthResult::rejected(&RegisterTemplate {
            title: env!("CARGO_CRATE_NAME"),
            error: Some(error),
        })
    };

    if credentials.validate().is_err() {
        tracing::debug!("Rejecting registration: empty credentials");
        return rejected(EMPTY_CREDENTIALS);
    }

    let outcome = state
        .repository
        .accounts
        .create_user(&credentials.username, &credentials.password)
        .await;
    if outcome.success {
        AuthResult::Registered(Redirect::to(auth::LOGIN_PATH))
    } else {
        rejected(&outcome.message)
    }
}

#[instrument(skip_all, fields(username = identity.username))]
#[debug_handler]
pub async fn logout(
    State(state): State<SharedState>,
    Session(identity): Session,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), StatusCode> {
    auth::log_out(&state.repository, &identity)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let jar = jar.remove(Cookie::build((SESSION_COOKIE_NAME, "")).path("/"));
    Ok((flash(jar, "You were logged out"), Redirect::to("/")))
}
