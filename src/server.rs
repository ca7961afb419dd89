//! HTTP adapter: `POST /login`, `GET /logout`, `GET /messages` and every declared route.
//!
//! Sessions travel as cookies: `session.id` holds the identifier and
//! `session.token.<profile>` one token per authenticated profile.

mod messages;

pub use messages::{DisplayMessage, MessageQueues, SessionInteraction};

use crate::auth::{is_valid_session_id, Credentials};
use crate::dispatcher::{Dispatcher, Request, RequestContext};
use crate::error::{AuthError, DispatchError, ValidationError};
use crate::frontend::http::RequestParams;
use crate::interaction::translate;
use axum::body::{Body, Bytes};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

pub const SESSION_ID_COOKIE: &str = "session.id";
pub const SESSION_TOKEN_PREFIX: &str = "session.token.";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared state of the HTTP adapter.
pub struct ServerState {
    pub dispatcher: Dispatcher,
    pub secure_cookies: bool,
    pub lock_timeout: Option<Duration>,
    pub messages: MessageQueues,
}

impl ServerState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            secure_cookies: true,
            lock_timeout: None,
            messages: MessageQueues::new(),
        }
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/messages", get(messages))
        .fallback(dispatch)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: Arc<ServerState>, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down HTTP server");
}

fn error_response(err: &DispatchError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.kind().is_private() {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
    (
        status,
        Json(ErrorResponseBody {
            error: err.public_message(),
        }),
    )
        .into_response()
}

fn internal_error(message: &str) -> Response {
    error!(error = %message, "Request task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponseBody {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

/// Query string plus urlencoded body; repeated keys keep every value.
fn request_params(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> RequestParams {
    let mut params = RequestParams::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);
    if is_form {
        for (key, value) in url::form_urlencoded::parse(body) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    params
}

fn single<'a>(params: &'a RequestParams, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(|values| values.last())
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_ID_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| is_valid_session_id(id))
}

fn session_credentials(jar: &CookieJar) -> Credentials {
    let Some(id) = jar.get(SESSION_ID_COOKIE) else {
        return Credentials::None;
    };
    let tokens = jar
        .iter()
        .filter_map(|cookie| {
            cookie
                .name()
                .strip_prefix(SESSION_TOKEN_PREFIX)
                .map(|profile| (profile.to_string(), cookie.value().to_string()))
        })
        .collect();
    Credentials::Session {
        id: id.value().to_string(),
        tokens,
    }
}

fn session_cookie(name: String, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .build()
}

/// Removal cookie; only sent for cookies the request carried.
fn expired_cookie(name: String) -> Cookie<'static> {
    Cookie::build((name, String::new())).path("/").build()
}

/// Profile used when the caller names none: the first namespace's default.
fn default_profile(state: &ServerState) -> Option<String> {
    state
        .dispatcher
        .tree()
        .namespaces()
        .next()
        .map(|ns| ns.global.authenticator.clone())
}

async fn login(
    State(state): State<Arc<ServerState>>,
    jar: CookieJar,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let params = request_params(query.as_deref(), &headers, &body);
    let Some(credentials) = single(&params, "credentials").map(str::to_string) else {
        return error_response(&DispatchError::from(ValidationError::Required {
            argument: "credentials".to_string(),
        }));
    };
    let Some(profile) = single(&params, "profile")
        .map(str::to_string)
        .or_else(|| default_profile(&state))
    else {
        return error_response(&DispatchError::from(AuthError::Misconfigured(
            "no authentication profile is defined".to_string(),
        )));
    };
    let existing_id = session_id(&jar);

    let task_state = state.clone();
    let task_profile = profile.clone();
    let result = tokio::task::spawn_blocking(move || {
        task_state.dispatcher.auth().login_into(
            &task_profile,
            &credentials,
            existing_id.as_deref(),
        )
    })
    .await;

    let info = match result {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => return error_response(&e.into()),
        Err(e) => return internal_error(&e.to_string()),
    };
    let Some(session) = info.session else {
        return internal_error("login did not issue a session");
    };

    let jar = jar
        .add(session_cookie(
            SESSION_ID_COOKIE.to_string(),
            session.id,
            state.secure_cookies,
        ))
        .add(session_cookie(
            format!("{}{}", SESSION_TOKEN_PREFIX, profile),
            session.token,
            state.secure_cookies,
        ));
    let body = json!({ "message": translate("logged_in"), "profile": profile });
    (jar, Json(body)).into_response()
}

async fn logout(
    State(state): State<Arc<ServerState>>,
    jar: CookieJar,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let params = request_params(query.as_deref(), &headers, &[]);
    let Some(id) = jar.get(SESSION_ID_COOKIE).map(|c| c.value().to_string()) else {
        return error_response(&AuthError::NotLoggedIn.into());
    };
    let profile = single(&params, "profile").map(str::to_string);

    let task_state = state.clone();
    let task_profile = profile.clone();
    let task_id = id.clone();
    let result = tokio::task::spawn_blocking(move || {
        task_state
            .dispatcher
            .auth()
            .logout(&task_id, task_profile.as_deref())
    })
    .await;
    match result {
        Ok(Ok(revoked)) => debug!(revoked, "Sessions revoked"),
        Ok(Err(e)) => return error_response(&e.into()),
        Err(e) => return internal_error(&e.to_string()),
    }

    let expired: Vec<String> = match &profile {
        Some(profile) => vec![format!("{}{}", SESSION_TOKEN_PREFIX, profile)],
        None => {
            state.messages.close(&id);
            jar.iter()
                .map(|cookie| cookie.name().to_string())
                .filter(|name| {
                    name.as_str() == SESSION_ID_COOKIE || name.starts_with(SESSION_TOKEN_PREFIX)
                })
                .collect()
        }
    };
    let jar = expired
        .into_iter()
        .fold(jar, |jar, name| jar.remove(expired_cookie(name)));
    let body = json!({ "message": translate("logged_out") });
    (jar, Json(body)).into_response()
}

/// Stream the session's displayed messages until its next dispatch ends.
async fn messages(
    State(state): State<Arc<ServerState>>,
    jar: CookieJar,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let Some(id) = session_id(&jar) else {
        return error_response(&AuthError::NotLoggedIn.into());
    };
    let Some(upgrade) = upgrade else {
        return error_response(&DispatchError::from(ValidationError::Usage(translate(
            "websocket_request_expected",
        ))));
    };
    // Register before answering so displays after the handshake are never lost.
    let receiver = state.messages.open(&id);
    debug!("Message stream opened");
    upgrade.on_upgrade(move |socket| stream_messages(socket, receiver))
}

async fn stream_messages(mut socket: WebSocket, mut receiver: UnboundedReceiver<DisplayMessage>) {
    while let Some(message) = receiver.recv().await {
        if let Err(e) = socket.send(Message::Text(message.to_json())).await {
            debug!(error = %e, "Message stream closed by the client");
            return;
        }
    }
    if let Err(e) = socket.send(Message::Close(None)).await {
        debug!(error = %e, "Message stream already closed");
    }
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

async fn dispatch(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = request_params(uri.query(), &headers, &body);
    let credentials = session_credentials(&jar);
    let stream_id = session_id(&jar);
    let interaction = state.messages.interaction(stream_id.as_deref());
    let request = Request::Http {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        params,
    };

    let task_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let ctx = RequestContext::new(&interaction)
            .with_credentials(credentials)
            .with_lock_timeout(task_state.lock_timeout);
        task_state.dispatcher.process(request, &ctx)
    })
    .await;
    if let Some(id) = &stream_id {
        if state.messages.close(id) {
            debug!("Message stream closed after dispatch");
        }
    }

    match result {
        Ok(Ok(value)) => {
            if method == Method::POST {
                (StatusCode::CREATED, Json(value)).into_response()
            } else if method == Method::GET || !is_empty_result(&value) {
                (StatusCode::OK, Json(value)).into_response()
            } else {
                Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response())
            }
        }
        Ok(Err(e)) => error_response(&e),
        Err(e) => internal_error(&e.to_string()),
    }
}
