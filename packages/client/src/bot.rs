//! `ChatBot`: session, connection and hooks wired together.

use std::sync::Arc;

use snoochat_shared::time::SystemClock;

use crate::{
    auth::Credential,
    config::BotConfig,
    connection::{
        ConnectionManager, ShutdownHandle,
        channels::ChannelDirectory,
        outbound::{ConnectionState, Outbound},
    },
    error::{ClientError, ConfigError, HookError, SendError},
    frame::EventFrame,
    hooks::{
        Hook, HookContext, HookRegistry,
        builtin::{self, AutoResponder},
    },
    session::{Session, SessionResolver},
};

pub struct ChatBot {
    connection: ConnectionManager,
    hooks: HookRegistry,
}

impl ChatBot {
    /// Resolve a session for `credential` and build a bot around it.
    ///
    /// With `store_session` the session is read from and written to
    /// `config.session_dir`. The WebSocket is opened by [`ChatBot::open`] or
    /// [`ChatBot::run_forever`].
    pub async fn connect(
        credential: &Credential,
        config: BotConfig,
        store_session: bool,
    ) -> Result<Self, ClientError> {
        let resolver = SessionResolver::from_config(&config)?;
        let session = resolver.resolve(credential, store_session).await?;
        Ok(Self::with_session(session, config))
    }

    pub fn with_session(session: Session, config: BotConfig) -> Self {
        Self {
            connection: ConnectionManager::new(Arc::new(config), session, &SystemClock),
            hooks: HookRegistry::new(),
        }
    }

    pub fn register(&mut self, hook: Hook) {
        self.hooks.register(hook);
    }

    /// Run `action` after every frame tagged `tag` (`MESG`, `SYEV`, ...).
    pub fn after_frame<A>(&mut self, tag: &str, action: A)
    where
        A: Fn(&EventFrame, &HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let name = format!("after-frame:{}:{}", tag, self.hooks.len());
        self.register(Hook::for_tag(name, tag, action));
    }

    pub fn set_respond_hook(&mut self, responder: AutoResponder) -> Result<(), ConfigError> {
        let hook = responder.build()?;
        self.register(hook);
        Ok(())
    }

    pub fn set_welcome_message<I, S>(&mut self, template: &str, channels: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hook = builtin::welcome_message(template, channels)?;
        self.register(hook);
        Ok(())
    }

    pub fn set_farewell_message<I, S>(&mut self, template: &str, channels: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hook = builtin::farewell_message(template, channels)?;
        self.register(hook);
        Ok(())
    }

    pub fn send_message(&self, text: &str, channel_url: &str) -> Result<(), SendError> {
        self.connection.outbound().send_message(text, channel_url)
    }

    pub fn send_snoomoji(&self, snoomoji: &str, channel_url: &str) -> Result<(), SendError> {
        self.connection.outbound().send_snoomoji(snoomoji, channel_url)
    }

    /// Cloneable handle for sending from other tasks.
    pub fn outbound(&self) -> Outbound {
        self.connection.outbound().clone()
    }

    pub fn channels(&self) -> &ChannelDirectory {
        self.connection.channels()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn session(&self) -> &Session {
        self.connection.session()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.connection.shutdown_handle()
    }

    /// Open the WebSocket now instead of on the first `run_forever` iteration.
    pub async fn open(&mut self) -> Result<(), ClientError> {
        Ok(self.connection.connect().await?)
    }

    /// Process frames until shutdown or a terminal connection error.
    pub async fn run_forever(
        &mut self,
        auto_reconnect: bool,
        max_retries: u32,
    ) -> Result<(), ClientError> {
        self.connection
            .run(&self.hooks, auto_reconnect, max_retries)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> ChatBot {
        let session = Session {
            access_token: "sb-token".to_string(),
            user_id: "t2_abc".to_string(),
        };
        ChatBot::with_session(session, BotConfig::default())
    }

    #[test]
    fn test_builtin_hooks_are_registered_in_order() {
        // テスト項目: 組み込みフックとユーザー定義フックが登録順に並ぶ
        // given (前提条件):
        let mut bot = bot();

        // when (操作):
        bot.set_respond_hook(AutoResponder::new("ping", "pong {nickname}"))
            .unwrap();
        bot.set_welcome_message("welcome {nickname}", Vec::<String>::new())
            .unwrap();
        bot.after_frame("MESG", |_, _| Ok(()));
        bot.set_farewell_message("bye {nickname}", ["rustchat"])
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            bot.hooks().names(),
            vec![
                "auto-responder:ping",
                "welcome-message",
                "after-frame:MESG:2",
                "farewell-message",
            ]
        );
    }

    #[test]
    fn test_invalid_respond_hook_is_not_registered() {
        // テスト項目: 不正なテンプレートの自動応答はエラーになり登録されない
        // given (前提条件):
        let mut bot = bot();

        // when (操作):
        let result = bot.set_respond_hook(AutoResponder::new("ping", "pong"));

        // then (期待する結果):
        assert_eq!(result, Err(ConfigError::MissingPlaceholder("nickname")));
        assert!(bot.hooks().is_empty());
    }

    #[test]
    fn test_send_before_open_fails() {
        // テスト項目: 接続前の送信は NotConnected エラーになる
        // given (前提条件):
        let bot = bot();

        // when (操作):
        let text = bot.send_message("hello", "c1");
        let snoomoji = bot.send_snoomoji("partyparrot", "c1");

        // then (期待する結果):
        assert_eq!(text, Err(SendError::NotConnected));
        assert_eq!(snoomoji, Err(SendError::NotConnected));
        assert_eq!(bot.state(), ConnectionState::Disconnected);
    }
}
