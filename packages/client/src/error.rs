//! Error types for the chat bot client.

use std::{io, time::Duration};

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Credential exchange or session REST call failed. Never retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Transport-level failure talking to an auth or REST endpoint
    #[error("HTTP request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-2xx status
    #[error("{endpoint} responded with status {status}")]
    Status { endpoint: String, status: u16 },

    /// Endpoint answered 2xx but the body lacks the expected field
    #[error("response from {endpoint} is missing '{field}'")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },

    /// Password login did not hand back a session cookie
    #[error("login for '{0}' did not return a session cookie")]
    NoSessionCookie(String),

    /// Chat page did not embed an access token
    #[error("chat page did not contain an access token")]
    NoAccessToken,
}

/// Opening or keeping the WebSocket connection failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Connection closed unexpectedly (stream ended, reset, pong timeout)
    #[error("connection closed unexpectedly: {0}")]
    Closed(String),

    /// Handshake did not complete in time
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established at all (DNS, TLS, HTTP upgrade)
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Chat server refused the session
    #[error("login rejected by chat server: {0}")]
    LoginRejected(String),
}

impl ConnectError {
    /// Whether the run loop may reconnect after this failure.
    ///
    /// Only an unexpected close (and a handshake that stalled) qualifies;
    /// everything else terminates the loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Closed(_) | ConnectError::Timeout(_))
    }
}

impl From<tungstenite::Error> for ConnectError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(_) => ConnectError::Closed(error.to_string()),
            tungstenite::Error::Io(ref e) if is_disconnect(e.kind()) => {
                ConnectError::Closed(error.to_string())
            }
            tungstenite::Error::Http(ref response) => {
                ConnectError::Handshake(format!("server answered {}", response.status()))
            }
            other => ConnectError::Handshake(other.to_string()),
        }
    }
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// A single inbound frame could not be decoded. The frame is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("frame does not start with a type tag: {0:?}")]
    InvalidTag(String),

    #[error("{tag} frame has no body")]
    MissingBody { tag: String },

    #[error("{tag} frame body is not valid JSON: {source}")]
    Json {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{tag} frame body does not match its type: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Sending requires an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not connected to the chat server")]
    NotConnected,
}

/// A hook's predicate or action failed. Logged and isolated by the dispatcher.
#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error("{0}")]
    Failed(String),
}

/// Invalid hook or bot configuration, reported at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("template must contain the {{{0}}} placeholder")]
    MissingPlaceholder(&'static str),

    #[error("template uses unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    #[error("no credentials given: pass a token or a username and password")]
    MissingCredential,
}

/// Errors surfaced to callers of the bot.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
