//! Per-message processing: graph in, `package_create` request out.
//!
//! 1. Skip absent or empty payloads
//! 2. Deserialize the N-Triples graph
//! 3. Make sure the conversion context exists (first account's API key)
//! 4. Convert the dataset to a CKAN envelope
//! 5. Extract configured quality metrics and merge them into `extras`
//! 6. Dispatch without waiting for the catalog's answer

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use url::Url;

use catalogwriter_catalog::{ConversionContext, Converter};
use catalogwriter_graph::Graph;
use catalogwriter_shared::{AppConfig, CatalogAccount, CatalogWriterError, MetricMapping, Result};
use catalogwriter_storage::Storage;

use crate::lazy::LazyResource;
use crate::quality::{extract_metrics, merge_extras};

/// One queue message: serialized graph bytes, or nothing.
pub type Message = Option<Vec<u8>>;

/// Source of catalog credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All known accounts; the first one is used.
    async fn list_accounts(&self) -> Result<Vec<CatalogAccount>>;
}

#[async_trait]
impl CredentialStore for Storage {
    async fn list_accounts(&self) -> Result<Vec<CatalogAccount>> {
        Storage::list_accounts(self).await
    }
}

/// Settings for [`CatalogWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Catalog base URL.
    pub base_url: Url,
    /// Suffix colliding dataset names with a number.
    pub append_number: bool,
    /// Quality metrics to copy into `extras`.
    pub metrics: MetricMapping,
}

impl WriterConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url()?,
            append_number: config.catalog.append_number,
            metrics: config.quality.metrics.clone(),
        })
    }
}

/// What happened to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Empty or absent payload; nothing was done.
    Skipped,
    /// A request was launched.
    Dispatched {
        /// Number of quality metrics merged into `extras`.
        metrics: usize,
        /// Size of the posted JSON body.
        bytes: usize,
    },
}

/// Turns graph messages into catalog submissions.
pub struct CatalogWriter {
    config: WriterConfig,
    store: Arc<dyn CredentialStore>,
    context: LazyResource<ConversionContext>,
}

impl CatalogWriter {
    pub fn new(config: WriterConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            store,
            context: LazyResource::new(),
        }
    }

    /// The conversion context, if a message has already created it.
    pub fn context(&self) -> Option<&ConversionContext> {
        self.context.get()
    }

    /// Return the conversion context, creating it from the first stored
    /// account if needed.
    ///
    /// Concurrent callers share a single creation. With no account stored
    /// this fails with [`CatalogWriterError::MissingCredential`] and the
    /// next call tries again.
    pub async fn ensure_context(&self) -> Result<&ConversionContext> {
        self.context
            .get_or_try_init(|| async {
                let accounts = self.store.list_accounts().await?;
                let account = accounts
                    .into_iter()
                    .next()
                    .ok_or(CatalogWriterError::MissingCredential)?;
                info!(
                    account = %account.name,
                    key = %account.masked_key(),
                    base_url = %self.config.base_url,
                    "catalog converter initialized"
                );
                ConversionContext::new(
                    &self.config.base_url,
                    &account.api_key,
                    self.config.append_number,
                )
            })
            .await
    }

    /// Process one message.
    ///
    /// Returns once the request is launched; its result is only logged.
    #[instrument(skip_all, fields(bytes = message.as_ref().map_or(0, Vec::len)))]
    pub async fn process(&self, message: Message) -> Result<Outcome> {
        let bytes = match message {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                debug!("empty message skipped");
                return Ok(Outcome::Skipped);
            }
        };

        let graph = catalogwriter_graph::deserialize(&bytes)?;
        let context = self.ensure_context().await?;
        let (payload, metrics) = build_payload(context.converter(), &graph, &self.config.metrics)?;

        let size = payload.len();
        drop(context.dispatcher().dispatch(payload));
        debug!(triples = graph.len(), metrics, size, "dataset dispatched");

        Ok(Outcome::Dispatched {
            metrics,
            bytes: size,
        })
    }

    /// Wait for launched requests to settle.
    pub async fn drain(&self) {
        if let Some(context) = self.context.get() {
            context.dispatcher().drain().await;
        }
    }
}

/// Convert `graph` and merge its quality metrics into the envelope.
///
/// Returns the JSON body and the number of metrics merged.
pub fn build_payload(
    converter: &Converter,
    graph: &Graph,
    metrics: &MetricMapping,
) -> Result<(String, usize)> {
    let mut envelope = converter.convert(graph)?;
    let extracted = extract_metrics(graph, metrics);
    merge_extras(&mut envelope.extras, &extracted);
    Ok((envelope.into_payload(), extracted.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use catalogwriter_shared::MetricEntry;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const DATASET: &str = r#"<http://ex.org/ds/1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/dcat#Dataset> .
<http://ex.org/ds/1> <http://purl.org/dc/terms/title> "Street Trees" .
_:m1 <http://www.w3.org/ns/dqv#isMeasurementOf> <http://dice-research.org/opal/metrics/Availability> .
_:m1 <http://www.w3.org/ns/dqv#value> "0.9" .
"#;

    /// Counts lookups; hands out an account once `ready` is set.
    struct FakeStore {
        calls: AtomicUsize,
        ready: AtomicBool,
    }

    impl FakeStore {
        fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                ready: AtomicBool::new(ready),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialStore for FakeStore {
        async fn list_accounts(&self) -> Result<Vec<CatalogAccount>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.ready.load(Ordering::SeqCst) {
                Ok(vec![
                    CatalogAccount::new("first", "first-key"),
                    CatalogAccount::new("second", "second-key"),
                ])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn config(base_url: &str) -> WriterConfig {
        WriterConfig {
            base_url: Url::parse(base_url).unwrap(),
            append_number: true,
            metrics: vec![MetricEntry {
                key: "availability".into(),
                measurement: "http://dice-research.org/opal/metrics/Availability".into(),
                name: Some("Availability".into()),
            }]
            .into(),
        }
    }

    async fn catalog() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/3/action/package_create"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn empty_messages_touch_nothing() {
        let store = FakeStore::new(true);
        let writer = CatalogWriter::new(config("http://127.0.0.1:9"), store.clone());

        assert_eq!(writer.process(None).await.unwrap(), Outcome::Skipped);
        assert_eq!(writer.process(Some(Vec::new())).await.unwrap(), Outcome::Skipped);
        assert_eq!(store.calls(), 0);
        assert!(writer.context().is_none());
    }

    #[tokio::test]
    async fn malformed_graph_fails_before_credentials() {
        let store = FakeStore::new(true);
        let writer = CatalogWriter::new(config("http://127.0.0.1:9"), store.clone());

        let err = writer
            .process(Some(b"{\"not\": \"rdf\"}".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogWriterError::Deserialization { .. }));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_first_use_initializes_once() {
        let server = catalog().await;
        let store = FakeStore::new(true);
        let writer = Arc::new(CatalogWriter::new(config(&server.uri()), store.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                writer.process(Some(DATASET.as_bytes().to_vec())).await
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(matches!(outcome, Outcome::Dispatched { metrics: 1, .. }));
        }

        assert_eq!(store.calls(), 1);
        writer.drain().await;
        let stats = writer.context().unwrap().dispatcher().stats();
        assert_eq!(stats.sent, 8);
    }

    #[tokio::test]
    async fn missing_account_is_retried_on_next_message() {
        let server = catalog().await;
        let store = FakeStore::new(false);
        let writer = CatalogWriter::new(config(&server.uri()), store.clone());

        let err = writer
            .process(Some(DATASET.as_bytes().to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_missing_credential());
        assert!(writer.context().is_none());

        store.ready.store(true, Ordering::SeqCst);
        let outcome = writer.process(Some(DATASET.as_bytes().to_vec())).await.unwrap();
        assert!(matches!(outcome, Outcome::Dispatched { .. }));
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn posts_envelope_with_metrics_and_first_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/3/action/package_create"))
            .and(header("authorization", "first-key"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let writer = CatalogWriter::new(config(&server.uri()), FakeStore::new(true));
        writer.process(Some(DATASET.as_bytes().to_vec())).await.unwrap();
        writer.drain().await;

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["title"], "Street Trees");
        assert_eq!(body["name"], "street-trees");
        assert_eq!(body["extras"][0]["key"], "Availability");
        assert_eq!(body["extras"][0]["value"], "0.9");
    }

    #[test]
    fn payload_without_metrics_keeps_extras_empty() {
        let converter = Converter::new(false);
        let graph = catalogwriter_graph::deserialize(
            b"<http://ex.org/d> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/dcat#Dataset> .",
        )
        .unwrap();
        let (payload, merged) =
            build_payload(&converter, &graph, &MetricMapping::default()).unwrap();
        assert_eq!(merged, 0);
        let body: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(body["extras"], serde_json::json!([]));
    }
}
