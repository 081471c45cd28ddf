//! In-memory fixtures shared by the unit tests of this crate.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cell::Cacheable;
use crate::error::{FetchError, FetchResult, MalformedDatum};
use crate::list::{ListSpec, ListValue};
use crate::source::{ActiveKeys, DataSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDatum {
    pub key: String,
    pub text: String,
}

impl NoteDatum {
    pub fn new(key: &str, text: &str) -> Self {
        Self {
            key: key.to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub key: String,
    pub text: String,
}

impl Note {
    pub fn from_datum(datum: &NoteDatum) -> Self {
        Self {
            key: datum.key.clone(),
            text: datum.text.clone(),
        }
    }
}

impl Cacheable<NoteDatum> for Note {
    fn update(&mut self, data: &NoteDatum) -> Result<bool, MalformedDatum> {
        if data.text.is_empty() {
            return Err(MalformedDatum::new("empty text"));
        }
        if self.text == data.text {
            return Ok(false);
        }
        self.text = data.text.clone();
        Ok(true)
    }

    fn same_key(&self, data: &NoteDatum) -> bool {
        self.key == data.key
    }
}

/// Notes ordered by key length, then lexicographically.
pub struct NoteList;

impl ListSpec for NoteList {
    type Key = String;
    type Item = NoteDatum;
    type Entry = Note;

    fn key_of(item: &NoteDatum) -> String {
        item.key.clone()
    }

    fn create(_key: &String, item: &NoteDatum) -> Result<Note, MalformedDatum> {
        if item.text.is_empty() {
            return Err(MalformedDatum::new("empty text"));
        }
        Ok(Note::from_datum(item))
    }

    fn compare(a: &String, b: &String) -> Ordering {
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

/// Canned upstream answer for one key.
#[derive(Debug, Clone)]
enum Reply {
    Found(String),
    Fail,
    Hang,
}

/// Scriptable single-note source with call counters.
#[derive(Debug, Default)]
pub struct MockSource {
    replies: DashMap<String, Reply>,
    pub fetches: AtomicUsize,
    pub creates: AtomicUsize,
    evicted: parking_lot::Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long first, to widen race windows.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set(&self, key: &str, text: &str) {
        self.replies
            .insert(key.to_string(), Reply::Found(text.to_string()));
    }

    pub fn fail(&self, key: &str) {
        self.replies.insert(key.to_string(), Reply::Fail);
    }

    /// Fetches for `key` never complete.
    pub fn hang(&self, key: &str) {
        self.replies.insert(key.to_string(), Reply::Hang);
    }

    pub fn remove(&self, key: &str) {
        self.replies.remove(key);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(AtomicOrdering::SeqCst)
    }

    /// Keys the cache reported as dropped, in order.
    pub fn evicted_keys(&self) -> Vec<String> {
        self.evicted.lock().clone()
    }
}

#[async_trait]
impl DataSource for MockSource {
    type Key = String;
    type Datum = NoteDatum;
    type Value = Note;

    async fn fetch(&self, key: &String) -> FetchResult<Option<NoteDatum>> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.get(key).map(|reply| reply.clone());
        match reply {
            None => Ok(None),
            Some(Reply::Found(text)) => Ok(Some(NoteDatum::new(key, &text))),
            Some(Reply::Fail) => Err(FetchError::upstream("injected failure")),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }

    fn create(&self, _key: &String, datum: &NoteDatum) -> Result<Note, MalformedDatum> {
        self.creates.fetch_add(1, AtomicOrdering::SeqCst);
        if datum.text.is_empty() {
            return Err(MalformedDatum::new("empty text"));
        }
        Ok(Note::from_datum(datum))
    }

    fn evicted(&self, key: &String) {
        self.evicted.lock().push(key.clone());
    }
}

/// Scriptable source of note lists, one list per key.
#[derive(Debug, Default)]
pub struct MockListSource {
    lists: DashMap<String, Vec<NoteDatum>>,
}

impl MockListSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, items: &[(&str, &str)]) {
        let items = items
            .iter()
            .map(|(child, text)| NoteDatum::new(child, text))
            .collect();
        self.lists.insert(key.to_string(), items);
    }
}

#[async_trait]
impl DataSource for MockListSource {
    type Key = String;
    type Datum = Vec<NoteDatum>;
    type Value = ListValue<NoteList>;

    async fn fetch(&self, key: &String) -> FetchResult<Option<Vec<NoteDatum>>> {
        Ok(self.lists.get(key).map(|list| list.clone()))
    }

    fn create(
        &self,
        _key: &String,
        datum: &Vec<NoteDatum>,
    ) -> Result<ListValue<NoteList>, MalformedDatum> {
        ListValue::from_items(datum)
    }
}

/// Active-key provider with a fixed answer.
#[derive(Debug, Default)]
pub struct FixedKeys {
    keys: parking_lot::Mutex<Option<HashSet<String>>>,
}

impl FixedKeys {
    pub fn new(keys: &[&str]) -> Self {
        let fixed = Self::default();
        fixed.set(keys);
        fixed
    }

    pub fn set(&self, keys: &[&str]) {
        *self.keys.lock() = Some(keys.iter().map(|key| key.to_string()).collect());
    }

    /// Make the provider fail from now on.
    pub fn break_down(&self) {
        *self.keys.lock() = None;
    }
}

#[async_trait]
impl ActiveKeys<String> for FixedKeys {
    async fn active_keys(&self) -> anyhow::Result<HashSet<String>> {
        self.keys
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("active key store unavailable"))
    }
}

pub fn keys(keys: &[&str]) -> HashSet<String> {
    keys.iter().map(|key| key.to_string()).collect()
}
