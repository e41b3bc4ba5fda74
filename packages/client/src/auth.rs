//! Credentials and the provider exchanging them for a bearer token.

use std::{fmt, sync::LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{
    header::{COOKIE, USER_AGENT},
    redirect::Policy,
};

use crate::error::AuthError;

const SESSION_COOKIE: &str = "reddit_session";

static ACCESS_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""accessToken":"(.*?)""#).expect("access token pattern is valid")
});

/// How the bot proves who it is.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A bearer token obtained elsewhere
    Token(String),
    /// Account name and password, exchanged through the web login
    Password { username: String, password: String },
}

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Credential::Token(token.into())
    }

    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Key under which the resolved session is cached.
    pub fn cache_key(&self) -> &str {
        match self {
            Credential::Token(token) => token,
            Credential::Password { username, .. } => username,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Exchanges a credential for a bearer token accepted by the REST API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<String, AuthError>;
}

/// Provider talking to the real web login.
pub struct RedditAuthProvider {
    http: reqwest::Client,
    www_host: String,
    user_agent: String,
}

impl RedditAuthProvider {
    pub fn new(
        www_host: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let www_host = www_host.into();
        // Login answers with a redirect that carries the session cookie.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|source| AuthError::Request {
                endpoint: www_host.clone(),
                source,
            })?;

        Ok(Self {
            http,
            www_host,
            user_agent: user_agent.into(),
        })
    }

    async fn password_login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let login_url = format!("{}/post/login", self.www_host);
        let response = self
            .http
            .post(&login_url)
            .header(USER_AGENT, &self.user_agent)
            .form(&[("op", "login"), ("user", username), ("passwd", password)])
            .send()
            .await
            .map_err(|source| AuthError::Request {
                endpoint: login_url.clone(),
                source,
            })?;

        let session_cookie = response
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| AuthError::NoSessionCookie(username.to_string()))?;

        let chat_url = format!("{}/chat/", self.www_host);
        let response = self
            .http
            .get(&chat_url)
            .header(USER_AGENT, &self.user_agent)
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, session_cookie))
            .send()
            .await
            .map_err(|source| AuthError::Request {
                endpoint: chat_url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(AuthError::Status {
                endpoint: chat_url,
                status: response.status().as_u16(),
            });
        }

        let page = response.text().await.map_err(|source| AuthError::Request {
            endpoint: chat_url,
            source,
        })?;

        extract_access_token(&page).ok_or(AuthError::NoAccessToken)
    }
}

#[async_trait]
impl AuthProvider for RedditAuthProvider {
    async fn authenticate(&self, credential: &Credential) -> Result<String, AuthError> {
        match credential {
            Credential::Token(token) => Ok(token.clone()),
            Credential::Password { username, password } => {
                tracing::info!("Logging in as '{}'", username);
                self.password_login(username, password).await
            }
        }
    }
}

/// Pull the embedded access token out of the chat page.
pub fn extract_access_token(page: &str) -> Option<String> {
    ACCESS_TOKEN
        .captures(page)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
        .filter(|token| !token.is_empty())
}
