//! Hook registry and dispatcher.
//!
//! A hook is a named `(predicate, action)` pair, optionally bound to a frame
//! tag. Every decoded frame is offered to every hook in registration order;
//! a hook that fails or panics is logged and skipped so later hooks still run.

pub mod builtin;
pub mod template;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use crate::{
    connection::{channels::ChannelDirectory, outbound::Outbound},
    error::{HookError, SendError},
    frame::EventFrame,
};

type Predicate = Box<dyn Fn(&EventFrame, &HookContext<'_>) -> bool + Send + Sync>;
type Action = Box<dyn Fn(&EventFrame, &HookContext<'_>) -> Result<(), HookError> + Send + Sync>;

/// What a hook can see and do while handling a frame.
pub struct HookContext<'a> {
    outbound: &'a Outbound,
    channels: &'a ChannelDirectory,
    own_name: Option<&'a str>,
}

impl<'a> HookContext<'a> {
    pub fn new(
        outbound: &'a Outbound,
        channels: &'a ChannelDirectory,
        own_name: Option<&'a str>,
    ) -> Self {
        Self {
            outbound,
            channels,
            own_name,
        }
    }

    pub fn outbound(&self) -> &Outbound {
        self.outbound
    }

    pub fn channels(&self) -> &ChannelDirectory {
        self.channels
    }

    pub fn channel_label(&self, channel_url: &str) -> Option<String> {
        self.channels.label(channel_url)
    }

    /// Nickname the chat server assigned to the bot at login.
    pub fn own_name(&self) -> Option<&str> {
        self.own_name
    }

    pub fn send_message(&self, text: &str, channel_url: &str) -> Result<(), SendError> {
        self.outbound.send_message(text, channel_url)
    }

    pub fn send_snoomoji(&self, snoomoji: &str, channel_url: &str) -> Result<(), SendError> {
        self.outbound.send_snoomoji(snoomoji, channel_url)
    }
}

pub struct Hook {
    name: String,
    tag: Option<String>,
    predicate: Predicate,
    action: Action,
}

impl Hook {
    pub fn new<P, A>(name: impl Into<String>, predicate: P, action: A) -> Self
    where
        P: Fn(&EventFrame, &HookContext<'_>) -> bool + Send + Sync + 'static,
        A: Fn(&EventFrame, &HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tag: None,
            predicate: Box::new(predicate),
            action: Box::new(action),
        }
    }

    /// A hook that runs `action` on every frame carrying `tag`.
    pub fn for_tag<A>(name: impl Into<String>, tag: impl Into<String>, action: A) -> Self
    where
        A: Fn(&EventFrame, &HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self::new(name, |_, _| true, action).on_tag(tag)
    }

    /// Restrict the hook to frames carrying `tag`.
    pub fn on_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns whether the action ran.
    fn run(&self, frame: &EventFrame, ctx: &HookContext<'_>) -> Result<bool, HookError> {
        if self.tag.as_deref().is_some_and(|tag| tag != frame.tag()) {
            return Ok(false);
        }
        if !(self.predicate)(frame, ctx) {
            return Ok(false);
        }
        (self.action)(frame, ctx)?;
        Ok(true)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Outcome of offering one frame to every hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub fired: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Hook) {
        tracing::debug!("Registered hook '{}'", hook.name());
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(Hook::name).collect()
    }

    pub fn dispatch(&self, frame: &EventFrame, ctx: &HookContext<'_>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for hook in &self.hooks {
            match panic::catch_unwind(AssertUnwindSafe(|| hook.run(frame, ctx))) {
                Ok(Ok(true)) => summary.fired += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    tracing::warn!("Hook '{}' failed on {} frame: {}", hook.name(), frame.tag(), e);
                }
                Err(_) => {
                    summary.failed += 1;
                    tracing::error!("Hook '{}' panicked on {} frame", hook.name(), frame.tag());
                }
            }
        }

        summary
    }
}
