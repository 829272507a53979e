use crate::auth::Session;
use crate::models::Outcome;
use crate::repository::message::{Media, Message};
use crate::state::SharedState;
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect};
use axum::{Form, Json, debug_handler};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use tracing::instrument;

pub mod account;

pub const FLASH_COOKIE_NAME: &str = "flash";

/// Queues a one-shot notice for the next rendered page.
pub fn flash(jar: CookieJar, notice: impl Into<String>) -> CookieJar {
    let cookie = Cookie::build((FLASH_COOKIE_NAME, notice.into()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    jar.add(cookie)
}

pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<String>) {
    let notice = jar
        .get(FLASH_COOKIE_NAME)
        .map(|cookie| cookie.value_trimmed().to_owned());
    let jar = jar.remove(Cookie::build((FLASH_COOKIE_NAME, "")).path("/"));
    (jar, notice)
}

#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatTemplate<'a> {
    pub title: &'a str,
    pub logged_in_as: &'a str,
    pub peer: &'a str,
    pub messages: Vec<Message>,
    pub notice: Option<String>,
}

#[instrument(skip_all, fields(username = identity.username))]
#[debug_handler]
pub async fn root(
    State(state): State<SharedState>,
    Session(identity): Session,
    jar: CookieJar,
) -> Result<impl IntoResponse, StatusCode> {
    tracing::trace!("Serving conversation page");
    let messages = state
        .repository
        .messages
        .fetch_conversation(&identity.username, &state.peer, 0, 0)
        .await;
    let (jar, notice) = take_flash(jar);

    let template = ChatTemplate {
        title: env!("CARGO_CRATE_NAME"),
        logged_in_as: &identity.username,
        peer: &state.peer,
        messages,
        notice,
    };

    template
        .render()
        .map(|page| (jar, Html(page)))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Deserialize, Debug)]
#[must_use]
pub struct SendForm {
    recipient: String,
    body: String,
    media: Option<String>,
    #[serde(default)]
    metadata: String,
}

#[instrument(skip_all, fields(username = identity.username, recipient = form.recipient))]
#[debug_handler]
pub async fn send(
    State(state): State<SharedState>,
    Session(identity): Session,
    jar: CookieJar,
    Form(form): Form<SendForm>,
) -> (CookieJar, Redirect) {
    let media = form.media.as_deref().map_or(Ok(Media::default()), str::parse::<Media>);
    let outcome = match media {
        Ok(media) => {
            state
                .repository
                .messages
                .insert_message(
                    &identity.username,
                    &form.recipient,
                    &form.body,
                    media,
                    &form.metadata,
                )
                .await
        }
        Err(error) => {
            tracing::debug!(?error, "Rejecting message: unknown media kind");
            Outcome::failure(error.to_string())
        }
    };
    tracing::debug!(%outcome, "Handled send request");
    (flash(jar, outcome.message), Redirect::to("/"))
}

#[derive(Deserialize, Debug, Default)]
#[must_use]
pub struct PageQuery {
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub page: u32,
}

#[instrument(skip_all, fields(username = identity.username, peer = %peer, query = ?query))]
#[debug_handler]
pub async fn conversation(
    State(state): State<SharedState>,
    Session(identity): Session,
    Path(peer): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    state
        .repository
        .messages
        .conversation(&identity.username, &peer, query.page_size, query.page)
        .await
        .inspect(|messages| tracing::debug!(count = messages.len(), "Returning conversation via API"))
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
