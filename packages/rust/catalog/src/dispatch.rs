//! Fire-and-forget submission to CKAN's `package_create` action.
//!
//! [`Dispatcher::dispatch`] spawns a detached task and returns immediately.
//! The caller gets no completion guarantee: outcomes are only logged and
//! counted in [`DispatchStats`]. A host that is about to exit can call
//! [`Dispatcher::drain`] to let in-flight requests finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use url::Url;

use catalogwriter_shared::{CatalogWriterError, Result};

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("catalogwriter/", env!("CARGO_PKG_VERSION"));

/// Path of the dataset creation action, relative to the catalog base URL.
pub const PACKAGE_CREATE_PATH: &str = "/api/3/action/package_create";

/// Longest response body excerpt kept in failure logs.
const MAX_LOGGED_BODY: usize = 512;

/// Counters of dispatch outcomes.
#[derive(Debug, Default)]
pub struct DispatchStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    /// Requests answered with a 2xx status.
    pub sent: u64,
    /// Requests that failed in transport or got a non-2xx status.
    pub failed: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Posts envelopes to the catalog without awaiting the response.
#[derive(Debug)]
pub struct Dispatcher {
    client: Client,
    endpoint: Url,
    api_key: Arc<str>,
    tracker: TaskTracker,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Build a dispatcher for `<base_url>/api/3/action/package_create`.
    pub fn new(base_url: &Url, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CatalogWriterError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: package_create_url(base_url)?,
            api_key: Arc::from(api_key),
            tracker: TaskTracker::new(),
            stats: Arc::new(DispatchStats::default()),
        })
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Launch the POST in a detached task.
    ///
    /// The returned handle may be dropped; dropping it does not cancel the
    /// request.
    pub fn dispatch(&self, payload: String) -> JoinHandle<()> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let api_key = Arc::clone(&self.api_key);
        let stats = Arc::clone(&self.stats);
        let bytes = payload.len();

        self.tracker.spawn(async move {
            let response = client
                .post(endpoint.as_str())
                .header(AUTHORIZATION, &*api_key)
                .header(CONTENT_TYPE, "application/json")
                .body(payload)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    stats.sent.fetch_add(1, Ordering::Relaxed);
                    debug!(%endpoint, status = %resp.status(), bytes, "dataset submitted");
                }
                Ok(resp) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let excerpt: String = body.chars().take(MAX_LOGGED_BODY).collect();
                    warn!(%endpoint, %status, body = %excerpt, "catalog rejected dataset");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(%endpoint, error = %e, "dataset submission failed");
                }
            }
        })
    }

    /// Wait for every dispatch launched so far to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of dispatches still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

/// `<base_url>/api/3/action/package_create`, keeping any path prefix of the base.
pub fn package_create_url(base_url: &Url) -> Result<Url> {
    let joined = format!(
        "{}{PACKAGE_CREATE_PATH}",
        base_url.as_str().trim_end_matches('/')
    );
    Url::parse(&joined)
        .map_err(|e| CatalogWriterError::config(format!("invalid catalog endpoint '{joined}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("https://data.example.org/ckan/").unwrap();
        assert_eq!(
            package_create_url(&base).unwrap().as_str(),
            "https://data.example.org/ckan/api/3/action/package_create"
        );

        let base = Url::parse("http://localhost:5000").unwrap();
        assert_eq!(
            package_create_url(&base).unwrap().as_str(),
            "http://localhost:5000/api/3/action/package_create"
        );
    }

    #[tokio::test]
    async fn posts_payload_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PACKAGE_CREATE_PATH))
            .and(header("authorization", "secret-key"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "name": "trees", "extras": [] })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success": true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dispatcher = Dispatcher::new(&base, "secret-key").unwrap();
        let handle = dispatcher.dispatch(r#"{"name":"trees","extras":[]}"#.to_string());
        handle.await.expect("dispatch task");

        assert_eq!(dispatcher.stats(), DispatchSnapshot { sent: 1, failed: 0 });
    }

    #[tokio::test]
    async fn rejected_submission_is_counted_not_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PACKAGE_CREATE_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_string("name already in use"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dispatcher = Dispatcher::new(&base, "k").unwrap();
        dispatcher.dispatch("{}".into()).await.unwrap();

        assert_eq!(dispatcher.stats(), DispatchSnapshot { sent: 0, failed: 1 });
    }

    #[tokio::test]
    async fn transport_failure_is_counted() {
        // Nothing listens on the discard port.
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let dispatcher = Dispatcher::new(&base, "k").unwrap();
        dispatcher.dispatch("{}".into()).await.unwrap();
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn drain_waits_for_dropped_handles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .expect(3)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dispatcher = Dispatcher::new(&base, "k").unwrap();
        for _ in 0..3 {
            drop(dispatcher.dispatch("{}".into()));
        }
        dispatcher.drain().await;

        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.stats().sent, 3);
    }
}
