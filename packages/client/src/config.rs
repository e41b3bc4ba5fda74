//! Bot configuration: vendor endpoints, client identity and timing knobs.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

pub const DEFAULT_OAUTH_HOST: &str = "https://oauth.reddit.com";
pub const DEFAULT_SENDBIRD_HOST: &str = "https://s.reddit.com";
pub const DEFAULT_WWW_HOST: &str = "https://www.reddit.com";
pub const DEFAULT_WS_URL: &str = "wss://sendbirdproxyk8s.chat.redditmedia.com";
pub const DEFAULT_SENDBIRD_API_URL: &str = "https://sendbirdproxyk8s.chat.redditmedia.com";
pub const DEFAULT_USER_AGENT: &str = "Reddit/Version 2020.41.1/Build 296539/Android 11";

/// Fixed client parameters sent with the WebSocket handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientParams {
    pub platform: String,
    pub platform_version: String,
    pub sdk_version: String,
    pub app_id: String,
    pub sdk_user_agent: String,
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            platform: "Android".to_string(),
            platform_version: "30".to_string(),
            sdk_version: "3.0.144".to_string(),
            app_id: "2515BDA8-9D3A-47CF-9325-330BC37ADA13".to_string(),
            sdk_user_agent: "Android/c3.0.144".to_string(),
        }
    }
}

/// Everything the bot needs besides credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Host answering `/api/v1/me.json`
    pub oauth_host: String,
    /// Host answering `/api/v1/sendbird/me`
    pub sendbird_host: String,
    /// Host used for the password login exchange
    pub www_host: String,
    /// WebSocket endpoint of the chat service
    pub ws_url: String,
    /// REST endpoint of the chat service (channel listing)
    pub sendbird_api_url: String,
    pub user_agent: String,
    pub client_params: ClientParams,
    #[serde(with = "positive_secs")]
    pub ping_interval: Duration,
    #[serde(with = "positive_secs")]
    pub ping_timeout: Duration,
    /// Also bounds the channel listing that follows login
    #[serde(with = "positive_secs")]
    pub handshake_timeout: Duration,
    /// First reconnect delay; doubled per consecutive failed attempt
    #[serde(with = "secs")]
    pub reconnect_backoff: Duration,
    #[serde(with = "secs")]
    pub max_reconnect_backoff: Duration,
    /// Directory holding cached sessions
    pub session_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            oauth_host: DEFAULT_OAUTH_HOST.to_string(),
            sendbird_host: DEFAULT_SENDBIRD_HOST.to_string(),
            www_host: DEFAULT_WWW_HOST.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            sendbird_api_url: DEFAULT_SENDBIRD_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            client_params: ClientParams::default(),
            ping_interval: Duration::from_secs(15),
            ping_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            reconnect_backoff: Duration::from_secs(1),
            max_reconnect_backoff: Duration::from_secs(30),
            session_dir: PathBuf::from("."),
        }
    }
}

/// Seconds as a number, fractions allowed.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}

/// Like [`secs`], rejecting zero.
mod positive_secs {
    use std::time::Duration;

    use serde::{Deserializer, de::Error};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let duration = super::secs::deserialize(deserializer)?;
        if duration.is_zero() {
            return Err(D::Error::custom("duration must be greater than zero"));
        }
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_vendor_endpoints() {
        // テスト項目: デフォルト設定がベンダーのエンドポイントと 15 秒/5 秒の ping 設定を持つ
        // given (前提条件):

        // when (操作):
        let config = BotConfig::default();

        // then (期待する結果):
        assert_eq!(config.oauth_host, "https://oauth.reddit.com");
        assert_eq!(config.sendbird_host, "https://s.reddit.com");
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_config_keeps_defaults() {
        // テスト項目: 一部のみ指定した設定でも残りはデフォルト値になる
        // given (前提条件):
        let json = r#"{"ws_url": "ws://127.0.0.1:9000", "ping_interval": 0.5}"#;

        // when (操作):
        let config: BotConfig = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(config.ws_url, "ws://127.0.0.1:9000");
        assert_eq!(config.ping_interval, Duration::from_millis(500));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.client_params, ClientParams::default());
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        // テスト項目: 負の秒数はパニックせずデシリアライズエラーになる
        // given (前提条件):
        let json = r#"{"ping_interval": -1}"#;

        // when (操作):
        let result = serde_json::from_str::<BotConfig>(json);

        // then (期待する結果):
        let error = result.unwrap_err().to_string();
        assert!(error.contains("invalid duration"), "unexpected error: {error}");
    }

    #[test]
    fn test_overflowing_duration_is_rejected() {
        // テスト項目: 表現できないほど大きい秒数はデシリアライズエラーになる
        // given (前提条件):
        let json = r#"{"reconnect_backoff": 1e300}"#;

        // when (操作):
        let result = serde_json::from_str::<BotConfig>(json);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timing_values_are_rejected() {
        // テスト項目: ping 間隔・ping タイムアウト・ハンドシェイクタイムアウトの 0 は拒否される
        // given (前提条件):
        let fields = ["ping_interval", "ping_timeout", "handshake_timeout"];

        // when (操作):
        let errors: Vec<String> = fields
            .iter()
            .map(|field| {
                serde_json::from_str::<BotConfig>(&format!(r#"{{"{}": 0}}"#, field))
                    .unwrap_err()
                    .to_string()
            })
            .collect();

        // then (期待する結果):
        for error in errors {
            assert!(error.contains("greater than zero"), "unexpected error: {error}");
        }
    }

    #[test]
    fn test_zero_backoff_is_allowed() {
        // テスト項目: 再接続待ち時間の 0 は許可される
        // given (前提条件):
        let json = r#"{"reconnect_backoff": 0}"#;

        // when (操作):
        let config: BotConfig = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(config.reconnect_backoff, Duration::ZERO);
    }
}
