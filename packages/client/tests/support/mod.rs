//! In-process mock of the chat backend: the WebSocket endpoint plus the REST
//! routes the client calls.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Form, Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use snoochat_client::{BotConfig, session::Session};
use tempfile::TempDir;

pub const BOT_NAME: &str = "snoobot";
pub const SESSION_KEY: &str = "session-key-1";
pub const GOOD_BEARER: &str = "good-bearer";
pub const FIELDLESS_BEARER: &str = "fieldless-bearer";

/// Account accepted by the web login.
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "hunter2";
/// Account whose login succeeds but whose chat page embeds no token.
pub const TOKENLESS_USERNAME: &str = "tokenless";

/// What the mock does with one accepted WebSocket connection.
#[derive(Debug, Clone)]
pub enum Script {
    /// Accept the upgrade and hang up before sending `LOGI`
    DropBeforeLogin,
    /// Answer with an error `LOGI`
    RejectLogin,
    /// Log the bot in, push `frames`, then do `then`
    Serve { frames: Vec<String>, then: After },
}

#[derive(Debug, Clone, Copy)]
pub enum After {
    /// Hang up without a close frame
    Drop,
    /// Keep reading and recording what the bot sends
    StayOpen,
    /// Keep the socket but never read it, so pings go unanswered
    Ignore,
}

impl Script {
    pub fn serve(frames: Vec<String>, then: After) -> Self {
        Script::Serve { frames, then }
    }
}

#[derive(Clone, Default)]
struct MockState {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    channels: Arc<Vec<(String, String)>>,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
    session_keys: Arc<Mutex<Vec<String>>>,
    channel_requests: Arc<AtomicUsize>,
    session_requests: Arc<AtomicUsize>,
    login_requests: Arc<AtomicUsize>,
    stall_channels: Arc<AtomicBool>,
}

pub struct MockBackend {
    addr: SocketAddr,
    state: MockState,
    scratch: TempDir,
}

impl MockBackend {
    pub async fn start(scripts: Vec<Script>) -> Self {
        Self::start_with_channels(scripts, &[]).await
    }

    pub async fn start_with_channels(scripts: Vec<Script>, channels: &[(&str, &str)]) -> Self {
        let state = MockState {
            scripts: Arc::new(Mutex::new(scripts.into())),
            channels: Arc::new(
                channels
                    .iter()
                    .map(|(url, name)| (url.to_string(), name.to_string()))
                    .collect(),
            ),
            ..MockState::default()
        };

        let app = Router::new()
            .route("/", get(ws_handler))
            .route("/v3/users/{user_id}/my_group_channels", get(channels_handler))
            .route("/api/v1/sendbird/me", get(sendbird_me_handler))
            .route("/api/v1/me.json", get(me_handler))
            .route("/post/login", post(login_handler))
            .route("/chat/", get(chat_page_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock backend crashed");
        });

        let scratch = TempDir::new().expect("Failed to create temp dir");

        Self {
            addr,
            state,
            scratch,
        }
    }

    /// Make the channel listing route accept requests and never answer.
    pub fn stall_channel_listing(&self) {
        self.state.stall_channels.store(true, Ordering::SeqCst);
    }

    /// Bot settings pointing every endpoint at this mock.
    pub fn config(&self) -> BotConfig {
        let http = format!("http://{}", self.addr);
        BotConfig {
            oauth_host: http.clone(),
            sendbird_host: http.clone(),
            www_host: http.clone(),
            sendbird_api_url: http,
            ws_url: format!("ws://{}/", self.addr),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            reconnect_backoff: Duration::from_millis(10),
            max_reconnect_backoff: Duration::from_millis(50),
            session_dir: self.scratch.path().join("sessions"),
            ..BotConfig::default()
        }
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn channel_requests(&self) -> usize {
        self.state.channel_requests.load(Ordering::SeqCst)
    }

    pub fn session_requests(&self) -> usize {
        self.state.session_requests.load(Ordering::SeqCst)
    }

    pub fn login_requests(&self) -> usize {
        self.state.login_requests.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.state.queries.lock().unwrap().clone()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.state.user_agents.lock().unwrap().clone()
    }

    pub fn session_keys(&self) -> Vec<String> {
        self.state.session_keys.lock().unwrap().clone()
    }

    /// `message` fields of every `MESG` frame the bot sent.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_bodies()
            .iter()
            .filter_map(|body| body["message"].as_str().map(str::to_string))
            .collect()
    }

    pub fn sent_bodies(&self) -> Vec<Value> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| frame.strip_prefix("MESG"))
            .filter_map(|body| serde_json::from_str(body.trim_end()).ok())
            .collect()
    }

    /// Poll until the bot has sent `count` messages or `timeout` passes.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent_texts();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn session() -> Session {
    Session {
        access_token: "sb-token".to_string(),
        user_id: "t2_bot".to_string(),
    }
}

pub fn mesg(sender: &str, text: &str) -> String {
    format!(
        "MESG{}",
        json!({
            "channel_url": "c1",
            "message": text,
            "user": { "name": sender, "guest_id": "t2_x" },
        })
    )
}

pub fn join(nickname: &str, inviter: &str) -> String {
    format!(
        "SYEV{}",
        json!({
            "cat": 10000,
            "channel_url": "c1",
            "data": { "users": [{ "nickname": nickname, "inviter": { "nickname": inviter } }] },
        })
    )
}

pub fn leave(nickname: &str) -> String {
    format!(
        "SYEV{}",
        json!({ "cat": 10001, "channel_url": "c1", "data": { "nickname": nickname } })
    )
}

fn login_frame() -> String {
    format!(
        "LOGI{}",
        json!({ "key": SESSION_KEY, "user_id": "t2_bot", "nickname": BOT_NAME })
    )
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<MockState>,
) -> Response {
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.queries.lock().unwrap().push(query);
    if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        state.user_agents.lock().unwrap().push(agent.to_string());
    }
    let script = state
        .scripts
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Script::Serve {
            frames: Vec::new(),
            then: After::StayOpen,
        });

    ws.on_upgrade(move |socket| run_script(socket, script, state))
}

async fn run_script(mut socket: WebSocket, script: Script, state: MockState) {
    let (frames, then) = match script {
        Script::DropBeforeLogin => return,
        Script::RejectLogin => {
            let frame = format!(
                "LOGI{}",
                json!({ "error": true, "message": "invalid access token", "code": 400302 })
            );
            let _ = socket.send(Message::Text(frame.into())).await;
            while let Some(Ok(_)) = socket.recv().await {}
            return;
        }
        Script::Serve { frames, then } => (frames, then),
    };

    if socket.send(Message::Text(login_frame().into())).await.is_err() {
        return;
    }
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    match then {
        After::Drop => {}
        After::Ignore => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        After::StayOpen => {
            while let Some(Ok(message)) = socket.recv().await {
                match message {
                    Message::Text(text) => state.received.lock().unwrap().push(text.as_str().to_string()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn channels_handler(
    Path(_user_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<MockState>,
) -> Response {
    state.channel_requests.fetch_add(1, Ordering::SeqCst);
    if state.stall_channels.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }
    let Some(key) = headers.get("session-key").and_then(|v| v.to_str().ok()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    state.session_keys.lock().unwrap().push(key.to_string());

    // Two channels per page, continuation token is the next offset.
    let offset: usize = query
        .get("token")
        .and_then(|token| token.parse().ok())
        .unwrap_or(0);
    let page: Vec<Value> = state
        .channels
        .iter()
        .skip(offset)
        .take(2)
        .map(|(url, name)| json!({ "channel_url": url, "name": name }))
        .collect();
    let next = if offset + 2 < state.channels.len() {
        (offset + 2).to_string()
    } else {
        String::new()
    };

    Json(json!({ "channels": page, "next": next })).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn sendbird_me_handler(headers: HeaderMap, State(state): State<MockState>) -> Response {
    state.session_requests.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers) {
        Some(GOOD_BEARER) => Json(json!({ "sb_access_token": "sb-token" })).into_response(),
        Some(FIELDLESS_BEARER) => Json(json!({})).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn me_handler(headers: HeaderMap, State(state): State<MockState>) -> Response {
    state.session_requests.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers) {
        Some(GOOD_BEARER) => Json(json!({ "id": "abc", "name": BOT_NAME })).into_response(),
        Some(FIELDLESS_BEARER) => Json(json!({ "name": BOT_NAME })).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn login_handler(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.login_requests.fetch_add(1, Ordering::SeqCst);
    let user = form.get("user").map(String::as_str);
    let accepted = form.get("op").map(String::as_str) == Some("login")
        && match user {
            Some(USERNAME) | Some(TOKENLESS_USERNAME) => {
                form.get("passwd").map(String::as_str) == Some(PASSWORD)
            }
            _ => false,
        };
    if !accepted {
        // Wrong credentials re-render the login form without a session cookie.
        return (StatusCode::OK, "<html>wrong password</html>").into_response();
    }

    let cookie = format!("reddit_session=session-{}; Path=/", user.unwrap_or_default());
    (
        StatusCode::FOUND,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, "/".to_string()),
        ],
    )
        .into_response()
}

async fn chat_page_handler(headers: HeaderMap) -> Response {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if cookie == format!("reddit_session=session-{}", USERNAME) {
        let page = format!(
            r#"<script>window.___r = {{"user":{{"session":{{"accessToken":"{}"}}}}}}</script>"#,
            GOOD_BEARER
        );
        (StatusCode::OK, page).into_response()
    } else if cookie == format!("reddit_session=session-{}", TOKENLESS_USERNAME) {
        (StatusCode::OK, "<html>chat is loading</html>").into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}
