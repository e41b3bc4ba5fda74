//! Connection manager: the single WebSocket to the chat server.
//!
//! The receive loop runs on the caller's task and dispatches hooks
//! synchronously. Writes go through an unbounded channel drained by a
//! dedicated writer task, so hooks can send without waiting on the loop.

pub mod channels;
pub mod outbound;

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use snoochat_shared::time::Clock;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header},
        protocol::Message,
    },
};
use url::Url;

use self::{
    channels::ChannelDirectory,
    outbound::{ConnectionState, Outbound},
};
use crate::{
    config::BotConfig,
    domain::{reconnect_delay, should_attempt_reconnect},
    error::{AuthError, ConnectError},
    frame::{self, EventFrame, LoginFrame},
    hooks::{HookContext, HookRegistry},
    session::Session,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SESSION_KEY_HEADER: &str = "Session-Key";
const CHANNEL_PAGE_LIMIT: &str = "100";
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Stops a running [`ConnectionManager`] from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the run loop to close the connection and return `Ok(())`.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Deserialize)]
struct ChannelPage {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct ChannelEntry {
    channel_url: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct ConnectionManager {
    config: Arc<BotConfig>,
    session: Session,
    http: reqwest::Client,
    outbound: Outbound,
    channels: ChannelDirectory,
    own_name: Option<String>,
    reader: Option<SplitStream<WsStream>>,
    writer_task: Option<JoinHandle<()>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub fn new(config: Arc<BotConfig>, session: Session, clock: &dyn Clock) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            session,
            http: reqwest::Client::new(),
            outbound: Outbound::new(clock),
            channels: ChannelDirectory::new(),
            own_name: None,
            reader: None,
            writer_task: None,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn channels(&self) -> &ChannelDirectory {
        &self.channels
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.outbound.state()
    }

    /// Nickname reported by the last successful login.
    pub fn own_name(&self) -> Option<&str> {
        self.own_name.as_deref()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// WebSocket URL including the session and client parameters.
    pub fn connect_url(&self) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.config.ws_url).map_err(|e| {
            ConnectError::Handshake(format!("invalid url '{}': {}", self.config.ws_url, e))
        })?;
        let params = &self.config.client_params;
        url.query_pairs_mut()
            .append_pair("p", &params.platform)
            .append_pair("pv", &params.platform_version)
            .append_pair("sv", &params.sdk_version)
            .append_pair("ai", &params.app_id)
            .append_pair("SB-User-Agent", &params.sdk_user_agent)
            .append_pair("active", "1")
            .append_pair("user_id", &self.session.user_id)
            .append_pair("access_token", &self.session.access_token);
        Ok(url)
    }

    /// Open the connection and wait for the login acknowledgement.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.reader.is_some() {
            self.teardown(ConnectionState::Reconnecting);
        }
        let url = self.connect_url()?;
        if self.outbound.state() != ConnectionState::Reconnecting {
            self.outbound.set_state(ConnectionState::Connecting);
        }
        tracing::info!("Connecting to {} as {}", self.config.ws_url, self.session.user_id);

        let handshake_timeout = self.config.handshake_timeout;
        let opened = match time::timeout(handshake_timeout, self.open(url)).await {
            Ok(opened) => opened,
            Err(_) => Err(ConnectError::Timeout(handshake_timeout)),
        };
        let (stream, login) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                if self.outbound.state() == ConnectionState::Connecting {
                    self.outbound.set_state(ConnectionState::Disconnected);
                }
                return Err(e);
            }
        };

        self.on_login(login).await;

        let (sink, reader) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        self.writer_task = Some(writer_loop(rx, sink));
        self.reader = Some(reader);
        self.outbound.attach(tx);

        tracing::info!(
            "Connected to chat server as '{}'",
            self.own_name.as_deref().unwrap_or(&self.session.user_id)
        );
        Ok(())
    }

    /// Drive the connection until shutdown, reconnecting on retryable failures.
    pub async fn run(
        &mut self,
        hooks: &HookRegistry,
        auto_reconnect: bool,
        max_retries: u32,
    ) -> Result<(), ConnectError> {
        let mut retries = 0u32;

        loop {
            if self.is_shutdown() {
                self.close().await;
                return Ok(());
            }

            let result = if self.reader.is_some() {
                Ok(())
            } else {
                self.connect().await
            };
            let result = match result {
                Ok(()) => {
                    retries = 0;
                    self.receive(hooks).await
                }
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(()) => {
                    self.close().await;
                    tracing::info!("Connection closed on request");
                    return Ok(());
                }
                Err(e) => e,
            };

            if !should_attempt_reconnect(&error, auto_reconnect, retries, max_retries) {
                self.teardown(ConnectionState::Terminated);
                return Err(error);
            }

            self.teardown(ConnectionState::Reconnecting);
            let delay = reconnect_delay(
                retries,
                self.config.reconnect_backoff,
                self.config.max_reconnect_backoff,
            );
            retries += 1;
            tracing::warn!(
                "Connection lost: {}. Reconnecting in {:?} (attempt {}/{})",
                error,
                delay,
                retries,
                max_retries
            );

            if !self.wait_or_shutdown(delay).await {
                self.close().await;
                return Ok(());
            }
        }
    }

    async fn open(&self, url: Url) -> Result<(WsStream, LoginFrame), ConnectError> {
        let mut request = url.as_str().into_client_request()?;
        let user_agent = HeaderValue::from_str(&self.config.user_agent)
            .map_err(|e| ConnectError::Handshake(format!("invalid user agent: {}", e)))?;
        request.headers_mut().insert(header::USER_AGENT, user_agent);

        let (mut stream, _response) = connect_async(request).await?;

        loop {
            let Some(message) = stream.next().await else {
                return Err(ConnectError::Closed(
                    "connection ended before login".to_string(),
                ));
            };
            match message? {
                Message::Text(text) => match frame::decode_str(&text) {
                    Ok(EventFrame::Login(login)) if login.error => {
                        return Err(ConnectError::LoginRejected(
                            login
                                .message
                                .unwrap_or_else(|| "no reason given".to_string()),
                        ));
                    }
                    Ok(EventFrame::Login(login)) => return Ok((stream, login)),
                    Ok(other) => tracing::debug!("Ignoring {} frame before login", other.tag()),
                    Err(e) => tracing::warn!("Dropping frame before login: {}", e),
                },
                Message::Close(_) => {
                    return Err(ConnectError::Closed(
                        "server closed the connection before login".to_string(),
                    ));
                }
                _ => {}
            }
        }
    }

    async fn on_login(&mut self, login: LoginFrame) {
        self.own_name = login.nickname;

        let Some(session_key) = login.key else {
            tracing::debug!("Login frame carried no session key, skipping channel listing");
            return;
        };
        let limit = self.config.handshake_timeout;
        match time::timeout(limit, self.fetch_channels(&session_key)).await {
            Ok(Ok(listing)) => {
                tracing::info!("Subscribed to {} channels", listing.len());
                self.channels.extend(listing);
            }
            Ok(Err(e)) => tracing::warn!("Failed to list channels: {}", e),
            Err(_) => tracing::warn!("Channel listing did not finish within {:?}", limit),
        }
    }

    async fn fetch_channels(&self, session_key: &str) -> Result<HashMap<String, String>, AuthError> {
        let endpoint = format!(
            "{}/v3/users/{}/my_group_channels",
            self.config.sendbird_api_url, self.session.user_id
        );
        let mut listing = HashMap::new();
        let mut token = String::new();

        loop {
            let response = self
                .http
                .get(&endpoint)
                .header(SESSION_KEY_HEADER, session_key)
                .header(reqwest::header::USER_AGENT, &self.config.user_agent)
                .query(&[("limit", CHANNEL_PAGE_LIMIT), ("token", token.as_str())])
                .send()
                .await
                .map_err(|source| AuthError::Request {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(AuthError::Status {
                    endpoint,
                    status: status.as_u16(),
                });
            }

            let page: ChannelPage = response.json().await.map_err(|source| AuthError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;
            listing.extend(
                page.channels
                    .into_iter()
                    .filter_map(|channel| Some((channel.channel_url, channel.name?))),
            );

            match page.next {
                Some(next) if !next.is_empty() && next != token => token = next,
                _ => break,
            }
        }

        Ok(listing)
    }

    /// Read frames until the connection fails (`Err`) or shutdown is requested (`Ok`).
    async fn receive(&mut self, hooks: &HookRegistry) -> Result<(), ConnectError> {
        let Some(mut reader) = self.reader.take() else {
            return Err(ConnectError::Closed("no open connection".to_string()));
        };
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        let ping_interval = self.config.ping_interval;
        let ping_timeout = self.config.ping_timeout;
        let mut ping = time::interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_payload(text.as_bytes(), hooks),
                    Some(Ok(Message::Binary(data))) => self.handle_payload(&data, hooks),
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(close))) => {
                        let reason = close
                            .map(|close| format!("{} {}", close.code, close.reason))
                            .unwrap_or_else(|| "no close frame".to_string());
                        return Err(ConnectError::Closed(format!("server closed the connection ({})", reason)));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(ConnectError::Closed("stream ended".to_string())),
                },
                _ = ping.tick() => {
                    if self.outbound.send_control(Message::Ping(Default::default())).is_err() {
                        return Err(ConnectError::Closed("writer task stopped".to_string()));
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + ping_timeout);
                    }
                }
                _ = time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    return Err(ConnectError::Closed(format!("no pong within {:?}", ping_timeout)));
                }
            }
        }
    }

    fn handle_payload(&self, payload: &[u8], hooks: &HookRegistry) {
        let frame = match frame::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };
        tracing::debug!("Received {} frame", frame.tag());

        if let (Some(channel_url), Some(name)) = (
            frame.channel_url(),
            frame.channel().and_then(|channel| channel.name.as_deref()),
        ) && self.channels.insert(channel_url, name)
        {
            tracing::debug!("Channel {} is now labelled '{}'", channel_url, name);
        }

        if let EventFrame::Message(message) = &frame {
            let label = self
                .channels
                .label(&message.channel_url)
                .unwrap_or_else(|| message.channel_url.clone());
            tracing::info!("{}@{}: {}", message.user.name, label, message.message);
        }

        let ctx = HookContext::new(&self.outbound, &self.channels, self.own_name.as_deref());
        let summary = hooks.dispatch(&frame, &ctx);
        if summary.failed > 0 {
            tracing::debug!(
                "{} frame: {} hooks fired, {} failed",
                frame.tag(),
                summary.fired,
                summary.failed
            );
        }
    }

    /// Sleep for `delay`; returns `false` if shutdown was requested meanwhile.
    async fn wait_or_shutdown(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = time::sleep(delay) => true,
            _ = shutdown.changed() => false,
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Send a close frame, let the writer drain and mark the connection terminated.
    async fn close(&mut self) {
        if self.outbound.send_control(Message::Close(None)).is_ok() {
            tracing::debug!("Sent close frame");
        }
        self.outbound.detach(ConnectionState::Terminated);
        self.reader = None;
        if let Some(writer_task) = self.writer_task.take()
            && time::timeout(CLOSE_GRACE, writer_task).await.is_err()
        {
            tracing::debug!("Writer task did not finish within {:?}", CLOSE_GRACE);
        }
    }

    fn teardown(&mut self, state: ConnectionState) {
        self.outbound.detach(state);
        self.reader = None;
        if let Some(writer_task) = self.writer_task.take() {
            writer_task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(writer_task) = self.writer_task.take() {
            writer_task.abort();
        }
    }
}

fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<Message>,
    mut sink: SplitSink<WsStream, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                tracing::debug!("Writer stopped: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    })
}
