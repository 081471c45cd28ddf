//! Active-event providers.
//!
//! The polling caches ask a provider for the event keys worth tracking at the
//! start of every cycle. The server ships a fixed list taken from
//! configuration.

use std::collections::HashSet;

use async_trait::async_trait;
use devilscout_cache::ActiveKeys;

#[derive(Debug, Default)]
pub struct StaticActiveEvents {
    events: HashSet<String>,
}

impl StaticActiveEvents {
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl ActiveKeys<String> for StaticActiveEvents {
    async fn active_keys(&self) -> anyhow::Result<HashSet<String>> {
        Ok(self.events.clone())
    }
}
