//! Mail provider API client
//!
//! Minimal client for the three provider endpoints a snapshot needs: the identity
//! lookup, the message listing, and the storage quota.

use crate::Result;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "    client";
const USER_AGENT: &str = concat!("mailpulse/", env!("CARGO_PKG_VERSION"));

/// Base URLs of the provider endpoints.
///
/// Missing entries fall back to the provider's public URLs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    /// Returns the display name and email of the token's owner.
    pub identity: String,

    /// Lists messages matching a search predicate, one page at a time.
    pub messages: String,

    /// Returns storage usage for the account.
    pub quota: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity: "https://www.googleapis.com/oauth2/v1/userinfo".to_string(),
            messages: "https://gmail.googleapis.com/gmail/v1/users/me/messages".to_string(),
            quota: "https://www.googleapis.com/drive/v3/about".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at the same base URL, using the provider's path layout.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            identity: format!("{base}/oauth2/v1/userinfo"),
            messages: format!("{base}/gmail/v1/users/me/messages"),
            quota: format!("{base}/drive/v3/about"),
        }
    }
}

/// Per-call timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub identity: Duration,
    pub quota: Duration,
    pub list: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            identity: Duration::from_secs(10),
            quota: Duration::from_secs(10),
            list: Duration::from_secs(15),
        }
    }
}

/// The account owner as reported by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// One page of the message listing.
#[derive(Debug, Default, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// Minimal message info, only the identifier is needed for counting
#[derive(Debug, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct About {
    #[serde(rename = "storageQuota")]
    storage_quota: Option<StorageQuota>,
}

/// The provider encodes 64-bit integers as JSON strings.
#[derive(Debug, Deserialize)]
struct StorageQuota {
    usage: Option<String>,
}

/// Result of a provider API call
#[derive(Debug)]
pub enum ApiResult<T> {
    /// Request succeeded
    Success(T),

    /// The provider asked us to back off, optionally saying for how long
    RateLimited(Option<Duration>),

    /// Request failed (transport error, timeout, non-success status, or bad body)
    Failed(ohno::AppError),
}

/// Provider API client.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoints: Endpoints,
    timeouts: Timeouts,
}

impl Client {
    pub fn new(endpoints: Endpoints, timeouts: Timeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .into_app_err("unable to create HTTP client")?;

        Ok(Self { http, endpoints, timeouts })
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Look up the owner of `credential`.
    pub async fn identity(&self, credential: &str) -> Result<Identity> {
        let request = self
            .http
            .get(&self.endpoints.identity)
            .bearer_auth(credential)
            .timeout(self.timeouts.identity);

        match self.api_call(request).await {
            ApiResult::Success(resp) => resp.json().await.into_app_err("decoding identity response"),
            ApiResult::RateLimited(_) => Err(app_err!("identity lookup was rate limited")),
            ApiResult::Failed(e) => Err(e),
        }
    }

    /// Bytes of storage used by the account.
    pub async fn storage_used_bytes(&self, credential: &str) -> Result<u64> {
        let request = self
            .http
            .get(&self.endpoints.quota)
            .bearer_auth(credential)
            .query(&[("fields", "storageQuota")])
            .timeout(self.timeouts.quota);

        let about: About = match self.api_call(request).await {
            ApiResult::Success(resp) => resp.json().await.into_app_err("decoding storage quota response")?,
            ApiResult::RateLimited(_) => return Err(app_err!("storage quota lookup was rate limited")),
            ApiResult::Failed(e) => return Err(e),
        };

        let usage = about.storage_quota.and_then(|q| q.usage).unwrap_or_default();
        if usage.is_empty() {
            return Ok(0);
        }

        usage
            .parse::<u64>()
            .into_app_err_with(|| format!("invalid storage usage value '{usage}'"))
    }

    /// Fetch one page of messages matching `query`.
    pub async fn list_messages(&self, credential: &str, query: &str, page_size: u32, page_token: Option<&str>) -> ApiResult<MessagePage> {
        let mut params = vec![("q", query.to_string()), ("maxResults", page_size.to_string())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let request = self
            .http
            .get(&self.endpoints.messages)
            .bearer_auth(credential)
            .query(&params)
            .timeout(self.timeouts.list);

        match self.api_call(request).await {
            ApiResult::Success(resp) => match resp.json().await {
                Ok(page) => ApiResult::Success(page),
                Err(e) => ApiResult::Failed(ohno::AppError::from(e)),
            },
            ApiResult::RateLimited(delay) => ApiResult::RateLimited(delay),
            ApiResult::Failed(e) => ApiResult::Failed(e),
        }
    }

    /// Send a request and classify the response
    async fn api_call(&self, request: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    log::debug!(target: LOG_TARGET, "Request timed out: {e}");
                }
                return ApiResult::Failed(e.into());
            }
        };

        let status = resp.status();
        if status.is_success() {
            return ApiResult::Success(resp);
        }

        let retry_after = parse_retry_after(resp.headers());

        // Rate-limited (429), or a secondary limit signalled by 403 with Retry-After
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || (status == reqwest::StatusCode::FORBIDDEN && retry_after.is_some()) {
            return ApiResult::RateLimited(retry_after);
        }

        match resp.error_for_status() {
            Err(e) => ApiResult::Failed(e.into()),
            Ok(_) => ApiResult::Failed(app_err!("unexpected HTTP status {status}")),
        }
    }
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
