//! Built-in hooks: auto responder, welcome and farewell messages.

use std::sync::Arc;

use super::{Hook, HookContext, template::Template};
use crate::{
    error::{ConfigError, HookError},
    frame::{EventFrame, MESSAGE_TAG, SYSTEM_TAG, SystemEvent},
};

pub const NICKNAME: &str = "nickname";
pub const INVITER: &str = "inviter";

/// How a message is compared against the trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

/// Replies to messages matching a trigger.
///
/// ```no_run
/// # use snoochat_client::hooks::builtin::{AutoResponder, MatchMode};
/// let hook = AutoResponder::new("ping", "pong {nickname}")
///     .case_insensitive(true)
///     .match_mode(MatchMode::Exact)
///     .build()?;
/// # Ok::<(), snoochat_client::error::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct AutoResponder {
    trigger: String,
    response: String,
    allowed_users: Vec<String>,
    channels: Vec<String>,
    case_insensitive: bool,
    exclude_self: bool,
    match_mode: MatchMode,
}

impl AutoResponder {
    pub fn new(trigger: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            response: response.into(),
            allowed_users: Vec::new(),
            channels: Vec::new(),
            case_insensitive: false,
            exclude_self: true,
            match_mode: MatchMode::Exact,
        }
    }

    /// Only reply to these senders; empty means anyone.
    pub fn allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Only reply in these channels, given by url or label; empty means all.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    pub fn exclude_self(mut self, enabled: bool) -> Self {
        self.exclude_self = enabled;
        self
    }

    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Validate the response template and turn the responder into a hook.
    pub fn build(self) -> Result<Hook, ConfigError> {
        let template = Template::parse(&self.response, &[NICKNAME], &[NICKNAME])?;
        let name = format!("auto-responder:{}", self.trigger);
        let trigger = if self.case_insensitive {
            self.trigger.to_lowercase()
        } else {
            self.trigger.clone()
        };
        let settings = Arc::new(self);

        let predicate = {
            let settings = Arc::clone(&settings);
            move |frame: &EventFrame, ctx: &HookContext<'_>| {
                let EventFrame::Message(message) = frame else {
                    return false;
                };
                let sender = message.user.name.as_str();

                if settings.exclude_self && ctx.own_name() == Some(sender) {
                    return false;
                }
                if !settings.allowed_users.is_empty()
                    && !settings.allowed_users.iter().any(|user| user == sender)
                {
                    return false;
                }
                if !channel_allowed(&settings.channels, frame, ctx) {
                    return false;
                }

                let text = if settings.case_insensitive {
                    message.message.to_lowercase()
                } else {
                    message.message.clone()
                };
                match settings.match_mode {
                    MatchMode::Exact => text == trigger,
                    MatchMode::Contains => text.contains(&trigger),
                }
            }
        };

        let action = move |frame: &EventFrame, ctx: &HookContext<'_>| -> Result<(), HookError> {
            if let EventFrame::Message(message) = frame {
                let reply = template.render(&[(NICKNAME, &message.user.name)]);
                ctx.send_message(&reply, &message.channel_url)?;
            }
            Ok(())
        };

        Ok(Hook::new(name, predicate, action).on_tag(MESSAGE_TAG))
    }
}

/// Greet the first user of a join event, naming whoever invited them.
///
/// The template may use `{nickname}` and `{inviter}`. Join events missing
/// either name are skipped.
pub fn welcome_message<I, S>(template: &str, channels: I) -> Result<Hook, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let template = Template::parse(template, &[NICKNAME, INVITER], &[])?;
    let channels: Vec<String> = channels.into_iter().map(Into::into).collect();

    let predicate = move |frame: &EventFrame, ctx: &HookContext<'_>| {
        if joined(frame).is_none() {
            if is_join(frame) {
                tracing::debug!("Join event without nickname or inviter, not greeting");
            }
            return false;
        }
        channel_allowed(&channels, frame, ctx)
    };

    let action = move |frame: &EventFrame, ctx: &HookContext<'_>| -> Result<(), HookError> {
        if let Some((channel_url, nickname, inviter)) = joined(frame) {
            let text = template.render(&[(NICKNAME, nickname), (INVITER, inviter)]);
            ctx.send_message(&text, channel_url)?;
        }
        Ok(())
    };

    Ok(Hook::new("welcome-message", predicate, action).on_tag(SYSTEM_TAG))
}

/// Say goodbye when someone leaves. The template may use `{nickname}`.
pub fn farewell_message<I, S>(template: &str, channels: I) -> Result<Hook, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let template = Template::parse(template, &[NICKNAME], &[])?;
    let channels: Vec<String> = channels.into_iter().map(Into::into).collect();

    let predicate = move |frame: &EventFrame, ctx: &HookContext<'_>| {
        departed(frame).is_some() && channel_allowed(&channels, frame, ctx)
    };

    let action = move |frame: &EventFrame, ctx: &HookContext<'_>| -> Result<(), HookError> {
        if let Some((channel_url, nickname)) = departed(frame) {
            let text = template.render(&[(NICKNAME, nickname)]);
            ctx.send_message(&text, channel_url)?;
        }
        Ok(())
    };

    Ok(Hook::new("farewell-message", predicate, action).on_tag(SYSTEM_TAG))
}

fn is_join(frame: &EventFrame) -> bool {
    matches!(frame, EventFrame::System(system) if matches!(system.event, SystemEvent::Join { .. }))
}

fn joined(frame: &EventFrame) -> Option<(&str, &str, &str)> {
    let EventFrame::System(system) = frame else {
        return None;
    };
    let SystemEvent::Join { users } = &system.event else {
        return None;
    };
    let user = users.first()?;
    let nickname = user.nickname.as_deref()?;
    let inviter = user.inviter.as_ref()?.nickname.as_deref()?;
    Some((system.channel_url.as_str(), nickname, inviter))
}

fn departed(frame: &EventFrame) -> Option<(&str, &str)> {
    let EventFrame::System(system) = frame else {
        return None;
    };
    let SystemEvent::Leave { nickname } = &system.event else {
        return None;
    };
    Some((system.channel_url.as_str(), nickname.as_deref()?))
}

/// Empty filters allow everything; otherwise the frame's channel url or
/// label must be listed.
fn channel_allowed(filters: &[String], frame: &EventFrame, ctx: &HookContext<'_>) -> bool {
    if filters.is_empty() {
        return true;
    }
    let Some(channel_url) = frame.channel_url() else {
        return false;
    };
    let label = ctx
        .channel_label(channel_url)
        .or_else(|| frame.channel().and_then(|channel| channel.name.clone()));

    filters
        .iter()
        .any(|filter| filter == channel_url || label.as_deref() == Some(filter.as_str()))
}
