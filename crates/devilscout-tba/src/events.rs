//! Event information, fetched when first requested.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use time::Date;
use time::macros::format_description;

use devilscout_cache::{Cacheable, DataSource, FetchPool, FetchResult, MalformedDatum, OnDemandCache};

use crate::client::{TbaClient, event_path};
use crate::model::{Event, format_location, replace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventInfo {
    pub key: String,
    pub name: String,
    pub location: String,
    pub start: Date,
    pub end: Date,
    /// One-based competition week
    pub week: Option<u8>,
}

impl EventInfo {
    pub fn from_event(event: &Event) -> Result<Self, MalformedDatum> {
        let mut info = Self {
            key: event.key.clone(),
            name: String::new(),
            location: String::new(),
            start: Date::MIN,
            end: Date::MIN,
            week: None,
        };
        info.update(event)?;
        Ok(info)
    }
}

impl Cacheable<Event> for EventInfo {
    fn update(&mut self, event: &Event) -> Result<bool, MalformedDatum> {
        let start = parse_date(&event.start_date)?;
        let end = parse_date(&event.end_date)?;
        let location = format_location(&event.city, &event.state_prov, &event.country);
        let week = event.week.map(|week| week + 1);

        let mut changed = false;
        changed |= replace(&mut self.name, event.name.clone());
        changed |= replace(&mut self.location, location);
        changed |= replace(&mut self.start, start);
        changed |= replace(&mut self.end, end);
        changed |= replace(&mut self.week, week);
        Ok(changed)
    }

    fn same_key(&self, event: &Event) -> bool {
        self.key == event.key
    }
}

fn parse_date(raw: &str) -> Result<Date, MalformedDatum> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|e| MalformedDatum::new(format!("invalid date '{raw}': {e}")))
}

pub struct EventSource {
    client: Arc<TbaClient>,
}

impl EventSource {
    pub fn new(client: Arc<TbaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for EventSource {
    type Key = String;
    type Datum = Event;
    type Value = EventInfo;

    async fn fetch(&self, key: &String) -> FetchResult<Option<Event>> {
        self.client.event(key).await
    }

    fn create(&self, _key: &String, event: &Event) -> Result<EventInfo, MalformedDatum> {
        EventInfo::from_event(event)
    }

    fn evicted(&self, key: &String) {
        self.client.forget(&event_path(key));
    }
}

pub type EventCache = OnDemandCache<EventSource>;

pub fn event_cache(client: Arc<TbaClient>, pool: FetchPool, purge_ttl: Duration) -> EventCache {
    OnDemandCache::new("events", Arc::new(EventSource::new(client)), pool, purge_ttl)
}
