//! Session resolution: credential -> (chat access token, user id), with an
//! optional on-disk cache keyed by the credential.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::{
    auth::{AuthProvider, Credential, RedditAuthProvider},
    config::BotConfig,
    error::AuthError,
};

/// Prefix turning a numeric account id into a chat user id.
pub const USER_ID_PREFIX: &str = "t2_";

const MAX_PLAIN_KEY_LEN: usize = 64;

/// Everything needed to open the chat connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

/// The two REST calls that turn a bearer token into a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `GET /api/v1/sendbird/me` -> `sb_access_token`
    async fn chat_access_token(&self, bearer: &str) -> Result<String, AuthError>;

    /// `GET /api/v1/me.json` -> `id`
    async fn account_id(&self, bearer: &str) -> Result<String, AuthError>;
}

/// Keyed persistence for resolved sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Option<Session>;

    async fn save(&self, key: &str, session: &Session) -> io::Result<()>;
}

/// `SessionApi` backed by the vendor REST endpoints.
pub struct RestSessionApi {
    http: reqwest::Client,
    oauth_host: String,
    sendbird_host: String,
    user_agent: String,
}

impl RestSessionApi {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            oauth_host: config.oauth_host.clone(),
            sendbird_host: config.sendbird_host.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    async fn fetch_field(
        &self,
        endpoint: String,
        bearer: &str,
        field: &'static str,
    ) -> Result<String, AuthError> {
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(bearer)
            .header(USER_AGENT, &self.user_agent)
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

        let body: serde_json::Value =
            response.json().await.map_err(|source| AuthError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        match body.get(field) {
            Some(serde_json::Value::String(value)) if !value.is_empty() => Ok(value.clone()),
            Some(serde_json::Value::Number(value)) => Ok(value.to_string()),
            _ => Err(AuthError::MissingField { endpoint, field }),
        }
    }
}

#[async_trait]
impl SessionApi for RestSessionApi {
    async fn chat_access_token(&self, bearer: &str) -> Result<String, AuthError> {
        let endpoint = format!("{}/api/v1/sendbird/me", self.sendbird_host);
        self.fetch_field(endpoint, bearer, "sb_access_token").await
    }

    async fn account_id(&self, bearer: &str) -> Result<String, AuthError> {
        let endpoint = format!("{}/api/v1/me.json", self.oauth_host);
        self.fetch_field(endpoint, bearer, "id").await
    }
}

/// One JSON file per cache key inside a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    ///
    /// Short keys made of filename-safe characters are used verbatim; anything
    /// else (long bearer tokens in particular) is replaced by its SHA-256.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let is_plain = key.len() <= MAX_PLAIN_KEY_LEN
            && !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        let stem = if is_plain {
            key.to_string()
        } else {
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            hex::encode(hasher.finalize())
        };

        self.dir.join(format!("{}-stored.json", stem))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &str) -> Option<Session> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read session file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Ignoring corrupt session file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn save(&self, key: &str, session: &Session) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(session).map_err(io::Error::other)?;
        fs::write(self.path_for(key), json).await
    }
}

/// Turns credentials into sessions, consulting the store first when asked to.
pub struct SessionResolver {
    auth: Arc<dyn AuthProvider>,
    api: Arc<dyn SessionApi>,
    store: Arc<dyn SessionStore>,
}

impl SessionResolver {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        api: Arc<dyn SessionApi>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self { auth, api, store }
    }

    /// Resolver wired to the real vendor endpoints and the file store.
    pub fn from_config(config: &BotConfig) -> Result<Self, AuthError> {
        Ok(Self::new(
            Arc::new(RedditAuthProvider::new(
                config.www_host.clone(),
                config.user_agent.clone(),
            )?),
            Arc::new(RestSessionApi::new(config)),
            Arc::new(FileSessionStore::new(config.session_dir.clone())),
        ))
    }

    /// Resolve a session for `credential`.
    ///
    /// With `use_cache` a stored session is returned as-is; on a miss the
    /// freshly acquired session is written back. Write failures are logged
    /// and do not fail the call.
    pub async fn resolve(
        &self,
        credential: &Credential,
        use_cache: bool,
    ) -> Result<Session, AuthError> {
        if !use_cache {
            return self.acquire(credential).await;
        }

        let key = credential.cache_key();
        if let Some(session) = self.store.load(key).await {
            tracing::info!("Loaded cached session for {}", session.user_id);
            return Ok(session);
        }

        let session = self.acquire(credential).await?;
        if let Err(e) = self.store.save(key, &session).await {
            tracing::warn!("Failed to persist session for {}: {}", session.user_id, e);
        }

        Ok(session)
    }

    async fn acquire(&self, credential: &Credential) -> Result<Session, AuthError> {
        let bearer = self.auth.authenticate(credential).await?;
        let access_token = self.api.chat_access_token(&bearer).await?;
        let account_id = self.api.account_id(&bearer).await?;

        let session = Session {
            access_token,
            user_id: format!("{}{}", USER_ID_PREFIX, account_id),
        };
        tracing::info!("Acquired new session for {}", session.user_id);

        Ok(session)
    }
}
