use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use lookervault_codec::Value;
use lookervault_ratelimit::{CancellationToken, RateLimiter};
use lookervault_store::ContentType;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use crate::convert::{json_to_value, value_to_json};
use crate::error::ClientError;
use crate::params::{IterateParams, SelfInfo};

/// Retries are deadline-bound (via `backoff`), but the spec also caps the
/// attempt count; `backoff` itself only knows elapsed time.
const MAX_ATTEMPTS: u32 = 5;

pub trait LookerClient: Send + Sync {
    fn iterate(
        &self,
        content_type: ContentType,
        params: IterateParams,
        cx: CancellationToken,
    ) -> Box<dyn Iterator<Item = Result<Value, ClientError>> + Send>;

    /// Fetches exactly one page at `params.offset`. Used by orchestrator
    /// workers that claim their own offset ranges from a coordinator rather
    /// than draining a single sequential [`iterate`](Self::iterate) stream.
    fn fetch_page(
        &self,
        content_type: ContentType,
        params: &IterateParams,
        cx: &CancellationToken,
    ) -> Result<Vec<Value>, ClientError>;

    fn create(&self, content_type: ContentType, payload: &Value, cx: &CancellationToken) -> Result<i64, ClientError>;
    fn update(
        &self,
        content_type: ContentType,
        id: i64,
        payload: &Value,
        cx: &CancellationToken,
    ) -> Result<(), ClientError>;
    fn exists(&self, content_type: ContentType, id: i64, cx: &CancellationToken) -> Result<bool, ClientError>;

    /// Fetches the current destination object, or `None` on 404. Used by
    /// restore's `skip_if_modified` comparison, which needs the
    /// destination's `updated_at`, not just a boolean existence check.
    fn get(&self, content_type: ContentType, id: i64, cx: &CancellationToken) -> Result<Option<Value>, ClientError>;

    fn self_info(&self) -> Result<SelfInfo, ClientError>;
}

/// Maps a `ContentType` to its Looker REST resource path. Looker's actual
/// API nests some of these (e.g. explores under a model); this is the flat
/// shape LookerVault's extraction/restoration code addresses.
fn endpoint_path(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Dashboard => "dashboards",
        ContentType::Look => "looks",
        ContentType::LookmlModel => "lookml_models",
        ContentType::Explore => "explores",
        ContentType::Folder => "folders",
        ContentType::Board => "boards",
        ContentType::User => "users",
        ContentType::Group => "groups",
        ContentType::Role => "roles",
        ContentType::PermissionSet => "permission_sets",
        ContentType::ModelSet => "model_sets",
        ContentType::ScheduledPlan => "scheduled_plans",
    }
}

fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }
    if !status.is_success() {
        let permanent = status.is_client_error();
        let body = response.text().unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            permanent,
            body,
        });
    }
    Ok(response)
}

struct Inner {
    base_url: String,
    http: Client,
    rate_limiter: Arc<dyn RateLimiter>,
    timeout: Duration,
}

impl Inner {
    fn url_for(&self, content_type: ContentType) -> String {
        format!("{}/{}", self.base_url, endpoint_path(content_type))
    }

    /// Wraps `op` with rate limiting, exponential backoff with jitter, and
    /// the attempt/deadline caps from the retry policy: 1s -> 60s backoff,
    /// at most 5 attempts, 10 minute overall deadline.
    fn call_with_retry<T>(
        &self,
        cx: &CancellationToken,
        mut op: impl FnMut() -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(Some(Duration::from_secs(10 * 60)))
            .build();

        let attempts = Cell::new(0u32);

        backoff::retry_notify(
            backoff,
            move || {
                if cx.is_cancelled() {
                    return Err(BackoffError::permanent(ClientError::Cancelled));
                }
                attempts.set(attempts.get() + 1);
                if attempts.get() > MAX_ATTEMPTS {
                    return Err(BackoffError::permanent(ClientError::Timeout));
                }
                if self.rate_limiter.acquire(cx).is_err() {
                    return Err(BackoffError::permanent(ClientError::Cancelled));
                }

                match op() {
                    Ok(value) => {
                        self.rate_limiter.on_success();
                        Ok(value)
                    }
                    Err(ClientError::RateLimited) => {
                        self.rate_limiter.on_429();
                        Err(BackoffError::transient(ClientError::RateLimited))
                    }
                    Err(err) if err.is_permanent() => Err(BackoffError::permanent(err)),
                    Err(err) => Err(BackoffError::transient(err)),
                }
            },
            |err, dur| {
                tracing::warn!(error = %err, backoff = ?dur, "retrying looker API call");
            },
        )
        .map_err(|err| match err {
            BackoffError::Permanent(e) => e,
            BackoffError::Transient { err, .. } => err,
        })
    }

    fn fetch_page(
        &self,
        content_type: ContentType,
        params: &IterateParams,
        cx: &CancellationToken,
    ) -> Result<Vec<Value>, ClientError> {
        self.call_with_retry(cx, || {
            let mut req = self
                .http
                .get(self.url_for(content_type))
                .timeout(self.timeout)
                .query(&[("offset", params.offset), ("limit", params.batch_size)]);

            if content_type.supports_folder_filter() {
                if let Some(folder_id) = params.folder_id {
                    req = req.query(&[("folder_id", folder_id)]);
                }
            } else if params.folder_id.is_some() {
                tracing::warn!(
                    %content_type,
                    "folder filtering is not supported for this content type; extracting all"
                );
            }
            if let Some(fields) = &params.fields {
                req = req.query(&[("fields", fields.join(","))]);
            }
            if let Some(updated_after) = params.updated_after {
                req = req.query(&[(
                    "filter[updated_at]",
                    format!(">{}", lookervault_codec::timestamp::format(updated_after)),
                )]);
            }

            let response = ensure_success(req.send()?)?;
            let body: serde_json::Value = response.json()?;
            let items = body
                .as_array()
                .ok_or_else(|| ClientError::Malformed("expected a JSON array page".to_string()))?;
            items.iter().map(json_to_value).collect()
        })
    }

    fn do_create(
        &self,
        content_type: ContentType,
        payload: &Value,
        cx: &CancellationToken,
    ) -> Result<i64, ClientError> {
        self.call_with_retry(cx, || {
            let body = value_to_json(payload);
            let response = ensure_success(
                self.http
                    .post(self.url_for(content_type))
                    .timeout(self.timeout)
                    .json(&body)
                    .send()?,
            )?;
            let parsed: serde_json::Value = response.json()?;
            parsed
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ClientError::Malformed("create response missing id".to_string()))
        })
    }

    fn do_update(
        &self,
        content_type: ContentType,
        id: i64,
        payload: &Value,
        cx: &CancellationToken,
    ) -> Result<(), ClientError> {
        self.call_with_retry(cx, || {
            let body = value_to_json(payload);
            ensure_success(
                self.http
                    .patch(format!("{}/{id}", self.url_for(content_type)))
                    .timeout(self.timeout)
                    .json(&body)
                    .send()?,
            )?;
            Ok(())
        })
    }

    fn do_exists(
        &self,
        content_type: ContentType,
        id: i64,
        cx: &CancellationToken,
    ) -> Result<bool, ClientError> {
        self.call_with_retry(cx, || {
            let response = self
                .http
                .get(format!("{}/{id}", self.url_for(content_type)))
                .timeout(self.timeout)
                .send()?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            ensure_success(response)?;
            Ok(true)
        })
    }

    fn do_get(
        &self,
        content_type: ContentType,
        id: i64,
        cx: &CancellationToken,
    ) -> Result<Option<Value>, ClientError> {
        self.call_with_retry(cx, || {
            let response = self
                .http
                .get(format!("{}/{id}", self.url_for(content_type)))
                .timeout(self.timeout)
                .send()?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = ensure_success(response)?;
            let body: serde_json::Value = response.json()?;
            json_to_value(&body).map(Some)
        })
    }

    fn do_self_info(&self) -> Result<SelfInfo, ClientError> {
        let cx = CancellationToken::new();
        self.call_with_retry(&cx, || {
            let response = ensure_success(
                self.http
                    .get(format!("{}/user", self.base_url))
                    .timeout(self.timeout)
                    .send()?,
            )?;
            let body: serde_json::Value = response.json()?;
            let user_id = body
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ClientError::Malformed("self_info response missing id".to_string()))?;
            let email = body
                .get("email")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            Ok(SelfInfo {
                user_id,
                email,
                instance_url: self.base_url.clone(),
            })
        })
    }
}

/// The production [`LookerClient`]: `reqwest::blocking` (see the threading
/// model notes on why this is synchronous, not `tokio`), `rustls-tls`, and an
/// injected `RateLimiter` — no hidden globals.
pub struct HttpLookerClient {
    inner: Arc<Inner>,
}

impl HttpLookerClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                http,
                rate_limiter,
                timeout,
            }),
        })
    }
}

impl LookerClient for HttpLookerClient {
    fn iterate(
        &self,
        content_type: ContentType,
        params: IterateParams,
        cx: CancellationToken,
    ) -> Box<dyn Iterator<Item = Result<Value, ClientError>> + Send> {
        Box::new(PageIterator {
            inner: self.inner.clone(),
            content_type,
            params,
            cx,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    fn fetch_page(
        &self,
        content_type: ContentType,
        params: &IterateParams,
        cx: &CancellationToken,
    ) -> Result<Vec<Value>, ClientError> {
        self.inner.fetch_page(content_type, params, cx)
    }

    fn create(&self, content_type: ContentType, payload: &Value, cx: &CancellationToken) -> Result<i64, ClientError> {
        self.inner.do_create(content_type, payload, cx)
    }

    fn update(
        &self,
        content_type: ContentType,
        id: i64,
        payload: &Value,
        cx: &CancellationToken,
    ) -> Result<(), ClientError> {
        self.inner.do_update(content_type, id, payload, cx)
    }

    fn exists(&self, content_type: ContentType, id: i64, cx: &CancellationToken) -> Result<bool, ClientError> {
        self.inner.do_exists(content_type, id, cx)
    }

    fn get(&self, content_type: ContentType, id: i64, cx: &CancellationToken) -> Result<Option<Value>, ClientError> {
        self.inner.do_get(content_type, id, cx)
    }

    fn self_info(&self) -> Result<SelfInfo, ClientError> {
        self.inner.do_self_info()
    }
}

/// A single-use, non-restartable, lazily-fetched sequence of items in the
/// API's pagination order. Stops at the first empty page.
struct PageIterator {
    inner: Arc<Inner>,
    content_type: ContentType,
    params: IterateParams,
    cx: CancellationToken,
    buffer: VecDeque<Value>,
    exhausted: bool,
}

impl Iterator for PageIterator {
    type Item = Result<Value, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            match self.inner.fetch_page(self.content_type, &self.params, &self.cx) {
                Ok(page) => {
                    if page.is_empty() {
                        self.exhausted = true;
                        continue;
                    }
                    self.params.offset += page.len() as i64;
                    self.buffer.extend(page);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
