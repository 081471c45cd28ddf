//! HTTP client for The Blue Alliance API v3.
//!
//! Every request carries the `X-TBA-Auth-Key` header. The client remembers the
//! `ETag` and body of the last successful response per path and revalidates
//! with `If-None-Match`; a `304 Not Modified` is answered from the remembered
//! body, which costs no upstream quota and decodes to identical data. The
//! caches call [`TbaClient::forget`] when they evict an event, so remembered
//! bodies live no longer than the entries built from them.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderValue, IF_NONE_MATCH};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use devilscout_cache::{FetchError, FetchResult};

use crate::error::{TbaError, fetch_error};
use crate::model::{Event, EventOprs, EventRankings, Match, Team};

pub const DEFAULT_BASE_URL: &str = "https://www.thebluealliance.com/api/v3";

const AUTH_HEADER: &str = "X-TBA-Auth-Key";

/// Connection settings for [`TbaClient`].
#[derive(Debug, Clone)]
pub struct TbaClientConfig {
    pub base_url: String,
    pub auth_key: String,
    pub request_timeout: Duration,
}

impl Default for TbaClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_key: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Last validated response for one path.
struct Revalidation {
    etag: HeaderValue,
    body: Vec<u8>,
}

pub struct TbaClient {
    http: reqwest::Client,
    base_url: Url,
    auth_key: String,
    timeout: Duration,
    revalidations: DashMap<String, Revalidation>,
}

impl TbaClient {
    pub fn new(config: TbaClientConfig) -> Result<Self, TbaError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| TbaError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TbaError::InvalidBaseUrl {
                url: config.base_url,
                reason: "URL cannot be a base".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("devilscout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            auth_key: config.auth_key,
            timeout: config.request_timeout,
            revalidations: DashMap::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn event(&self, event_key: &str) -> FetchResult<Option<Event>> {
        self.get(&event_path(event_key)).await
    }

    pub async fn event_teams(&self, event_key: &str) -> FetchResult<Option<Vec<Team>>> {
        self.get(&teams_path(event_key)).await
    }

    pub async fn event_matches(&self, event_key: &str) -> FetchResult<Option<Vec<Match>>> {
        self.get(&matches_path(event_key)).await
    }

    pub async fn event_rankings(&self, event_key: &str) -> FetchResult<Option<EventRankings>> {
        self.get(&rankings_path(event_key)).await
    }

    pub async fn event_oprs(&self, event_key: &str) -> FetchResult<Option<EventOprs>> {
        self.get(&oprs_path(event_key)).await
    }

    /// Drop the remembered response for `path`, so the next request for it is
    /// unconditional. Returns whether anything was remembered.
    pub fn forget(&self, path: &str) -> bool {
        self.revalidations.remove(path).is_some()
    }

    /// Number of paths with a remembered response.
    pub fn remembered(&self) -> usize {
        self.revalidations.len()
    }

    /// GET `path` relative to the base URL.
    ///
    /// `Ok(None)` for `404 Not Found` and for a literal `null` body, which the
    /// API returns for resources that exist but have no data yet.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> FetchResult<Option<T>> {
        let url = self.url(path);
        let mut request = self
            .http
            .get(url.as_str())
            .header(AUTH_HEADER, &self.auth_key);
        if let Some(cached) = self.revalidations.get(path) {
            request = request.header(IF_NONE_MATCH, cached.etag.clone());
        }

        trace!(url = %url, "Requesting");
        let response = request
            .send()
            .await
            .map_err(|e| fetch_error(e, self.timeout))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                debug!(path, "Upstream not modified, reusing last body");
                let cached = self
                    .revalidations
                    .get(path)
                    .ok_or(FetchError::Http(StatusCode::NOT_MODIFIED.as_u16()))?;
                decode(&cached.body)
            }
            StatusCode::NOT_FOUND => {
                self.revalidations.remove(path);
                Ok(None)
            }
            status if status.is_success() => {
                let etag = response.headers().get(ETAG).cloned();
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| fetch_error(e, self.timeout))?;
                let decoded = decode(&body)?;
                match etag {
                    Some(etag) => {
                        self.revalidations.insert(
                            path.to_string(),
                            Revalidation {
                                etag,
                                body: body.to_vec(),
                            },
                        );
                    }
                    None => {
                        self.revalidations.remove(path);
                    }
                }
                Ok(decoded)
            }
            status => Err(FetchError::Http(status.as_u16())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for TbaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TbaClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) fn event_path(event_key: &str) -> String {
    format!("event/{event_key}")
}

pub(crate) fn teams_path(event_key: &str) -> String {
    format!("event/{event_key}/teams/simple")
}

pub(crate) fn matches_path(event_key: &str) -> String {
    format!("event/{event_key}/matches")
}

pub(crate) fn rankings_path(event_key: &str) -> String {
    format!("event/{event_key}/rankings")
}

pub(crate) fn oprs_path(event_key: &str) -> String {
    format!("event/{event_key}/oprs")
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> FetchResult<Option<T>> {
    serde_json::from_slice(body).map_err(|e| FetchError::malformed(e.to_string()))
}
