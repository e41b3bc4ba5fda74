//! Channel directory: channel url -> human readable label.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Mapping shared between the receive loop (the only writer) and callers
/// that want a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self, channel_url: &str) -> Option<String> {
        self.read().get(channel_url).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Record a label; returns whether anything changed.
    pub(crate) fn insert(&self, channel_url: &str, label: &str) -> bool {
        let mut channels = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if channels.get(channel_url).is_some_and(|current| current == label) {
            return false;
        }
        channels.insert(channel_url.to_string(), label.to_string());
        true
    }

    /// Merge a freshly fetched listing over what is already known.
    pub(crate) fn extend(&self, listing: HashMap<String, String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(listing);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
