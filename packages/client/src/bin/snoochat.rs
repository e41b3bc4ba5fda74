//! Reddit chat bot with an auto responder and optional welcome/farewell
//! messages.
//!
//! Credentials can come from flags, the environment or a `.env` file.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin snoochat -- --token $TOKEN --trigger ping --response "pong {nickname}"
//! SNOOCHAT_USERNAME=alice SNOOCHAT_PASSWORD=... cargo run --bin snoochat -- --welcome "hi {nickname}"
//! ```

use std::{fs, path::PathBuf};

use clap::Parser;

use snoochat_client::{
    AutoResponder, BotConfig, ChatBot, Credential, error::ConfigError,
    hooks::builtin::MatchMode,
};
use snoochat_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "snoochat")]
#[command(about = "Reddit chat bot that answers triggers and greets channel members", long_about = None)]
struct Args {
    /// Bearer token (takes precedence over username/password)
    #[arg(short = 't', long, env = "SNOOCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(short = 'u', long, env = "SNOOCHAT_USERNAME")]
    username: Option<String>,

    #[arg(short = 'p', long, env = "SNOOCHAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// JSON file with bot settings (hosts, timeouts, ...)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not read or write the cached session
    #[arg(long)]
    no_session_cache: bool,

    /// Directory holding cached sessions
    #[arg(long, env = "SNOOCHAT_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Message that triggers the auto responder
    #[arg(long)]
    trigger: Option<String>,

    /// Auto responder reply; must contain {nickname}
    #[arg(long, default_value = "hello {nickname}")]
    response: String,

    /// Reply when the message contains the trigger instead of equalling it
    #[arg(long)]
    contains: bool,

    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Only answer these users (repeatable)
    #[arg(long = "allow-user")]
    allowed_users: Vec<String>,

    /// Restrict all hooks to these channels, by url or name (repeatable)
    #[arg(short = 'c', long = "channel")]
    channels: Vec<String>,

    /// Welcome template; may use {nickname} and {inviter}
    #[arg(long)]
    welcome: Option<String>,

    /// Farewell template; may use {nickname}
    #[arg(long)]
    farewell: Option<String>,

    #[arg(long)]
    no_reconnect: bool,

    #[arg(long, default_value_t = 100)]
    max_retries: u32,

    /// Override the chat WebSocket endpoint
    #[arg(long, env = "SNOOCHAT_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn credential(&self) -> Result<Credential, ConfigError> {
        match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) => Ok(Credential::token(token)),
            (None, Some(username), Some(password)) => Ok(Credential::password(username, password)),
            _ => Err(ConfigError::MissingCredential),
        }
    }

    fn bot_config(&self) -> Result<BotConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => BotConfig::default(),
        };
        if let Some(ws_url) = &self.ws_url {
            config.ws_url = ws_url.clone();
        }
        if let Some(session_dir) = &self.session_dir {
            config.session_dir = session_dir.clone();
        }
        Ok(config)
    }

    fn install_hooks(&self, bot: &mut ChatBot) -> Result<(), ConfigError> {
        if let Some(trigger) = &self.trigger {
            let mode = if self.contains {
                MatchMode::Contains
            } else {
                MatchMode::Exact
            };
            bot.set_respond_hook(
                AutoResponder::new(trigger, &self.response)
                    .allowed_users(self.allowed_users.iter().cloned())
                    .channels(self.channels.iter().cloned())
                    .case_insensitive(self.ignore_case)
                    .match_mode(mode),
            )?;
        }
        if let Some(welcome) = &self.welcome {
            bot.set_welcome_message(welcome, self.channels.iter().cloned())?;
        }
        if let Some(farewell) = &self.farewell {
            bot.set_farewell_message(farewell, self.channels.iter().cloned())?;
        }
        Ok(())
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let credential = args.credential()?;
    let config = args.bot_config()?;

    let mut bot = ChatBot::connect(&credential, config, !args.no_session_cache).await?;
    args.install_hooks(&mut bot)?;
    tracing::info!(
        "Starting bot for {} with {} hooks",
        bot.session().user_id,
        bot.hooks().len()
    );

    let shutdown = bot.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
            shutdown.shutdown();
        }
    });

    bot.run_forever(!args.no_reconnect, args.max_retries).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    setup_logger(
        &[env!("CARGO_PKG_NAME"), env!("CARGO_BIN_NAME")],
        &args.log_level,
    );

    if let Err(e) = run(args).await {
        tracing::error!("Bot error: {}", e);
        std::process::exit(1);
    }
}
