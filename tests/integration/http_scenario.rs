//! Integration tests for the HTTP adapter: login, cookies, dispatch and status codes

use actionmap::server::{router, ServerState, SESSION_ID_COOKIE, SESSION_TOKEN_PREFIX};
use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use crate::integration::Sandbox;

const FORM: &str = "application/x-www-form-urlencoded";

struct Client {
    state: Arc<ServerState>,
    cookies: Vec<(String, String)>,
}

impl Client {
    fn new(sandbox: &Sandbox) -> Self {
        Self {
            state: Arc::new(
                ServerState::new(sandbox.http_dispatcher())
                    .with_secure_cookies(false)
                    .with_lock_timeout(Some(Duration::from_secs(1))),
            ),
            cookies: Vec::new(),
        }
    }

    async fn send(&mut self, method: &str, uri: &str, form: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            builder = builder.header(COOKIE, self.cookie_header());
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(CONTENT_TYPE, FORM);
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };
        let response = router(self.state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        self.keep_cookies(&response);

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn keep_cookies(&mut self, response: &Response<Body>) {
        for header in response.headers().get_all(SET_COOKIE) {
            let text = header.to_str().unwrap();
            let pair = text.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            self.cookies.retain(|(existing, _)| existing != name);
            if !text.contains("Max-Age=0") {
                self.cookies.push((name.to_string(), value.to_string()));
            }
        }
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }
}

#[tokio::test]
async fn test_public_route_needs_no_session() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);
    let (status, body) = client.send("GET", "/widgets?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"widgets": []}));
}

#[tokio::test]
async fn test_login_then_create_then_logout() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);

    let (status, body) = client
        .send("POST", "/widgets", Some("name=bolt&color=red"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert!(sandbox.store.is_empty());

    let (status, body) = client.send("POST", "/login", Some("credentials=demo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"], "default");
    let id = client.cookie(SESSION_ID_COOKIE).unwrap().to_string();
    assert_eq!(id.len(), 32);
    let token_cookie = format!("{}default", SESSION_TOKEN_PREFIX);
    assert!(client.cookie(&token_cookie).is_some());

    let (status, body) = client
        .send("POST", "/widgets", Some("name=bolt&color=red&tag=a&tag=b"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tags"], json!(["a", "b"]));

    let (status, body) = client.send("GET", "/widgets/bolt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["color"], "red");

    let (status, _) = client.send("DELETE", "/widgets/bolt", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(sandbox.store.is_empty());

    let (status, _) = client.send("GET", "/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(client.cookie(SESSION_ID_COOKIE).is_none());

    let (status, _) = client.send("POST", "/widgets", Some("name=nut")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_session_is_rejected_even_with_old_cookies() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);
    client.send("POST", "/login", Some("credentials=demo")).await;
    let stolen = client.cookies.clone();

    client.send("GET", "/logout", None).await;
    client.cookies = stolen;
    let (status, _) = client.send("POST", "/widgets", Some("name=bolt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_errors() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);

    let (status, _) = client.send("POST", "/login", Some("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client.send("POST", "/login", Some("credentials=nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(client.cookie(SESSION_ID_COOKIE).is_none());

    let (status, _) = client
        .send("POST", "/login", Some("credentials=demo&profile=nobody"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = client.send("GET", "/logout", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_codes_for_failures() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);

    let (status, body) = client.send("GET", "/gadgets", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/gadgets"));

    let (status, _) = client.send("GET", "/widgets/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = client.send("GET", "/widgets?limit=lots", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    client.send("POST", "/login", Some("credentials=demo")).await;
    let (status, body) = client.send("POST", "/widgets", Some("name=Bolt!")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("lowercase letters"));

    client.send("POST", "/widgets", Some("name=bolt")).await;
    let (status, _) = client.send("POST", "/widgets", Some("name=bolt")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_required_extra_over_http() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);
    client.send("POST", "/login", Some("credentials=demo")).await;
    client.send("POST", "/widgets", Some("name=bolt")).await;

    let (status, _) = client.send("POST", "/widgets/bolt/parts", Some("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = client
        .send("POST", "/widgets/bolt/parts", Some("part=nut&part=washer"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["parts"], json!(["nut", "washer"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_stream_carries_displays() {
    let sandbox = Sandbox::new();
    let mut client = Client::new(&sandbox);

    let (status, _) = client.send("GET", "/messages", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "a stream needs a session");
    client.send("POST", "/login", Some("credentials=demo")).await;
    let (status, body) = client.send("GET", "/messages", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("WebSocket"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = router(client.state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });

    let mut request = format!("ws://{}/messages", address)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(COOKIE, client.cookie_header().parse().unwrap());
    let (mut stream, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 101);

    let (status, _) = client
        .send("POST", "/widgets", Some("name=bolt&color=red"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("message stream stalled");
        match frame {
            Some(Ok(Message::Text(text))) => frames.push(serde_json::from_str::<Value>(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("message stream failed: {}", e),
        }
    }
    assert_eq!(frames, vec![json!({"success": "Widget created 'bolt'"})]);

    let id = client.cookie(SESSION_ID_COOKIE).unwrap();
    assert!(
        !client.state.messages.is_open(id),
        "the stream ends with the dispatch"
    );
}
