//! DQV quality measurement extraction and the CKAN extras merge.
//!
//! For every configured metric the graph is searched for a
//! `dqv:QualityMeasurement` that `dqv:isMeasurementOf` the metric's IRI; its
//! `dqv:value` literal becomes one `{"key": ..., "value": ...}` extras entry.
//! Extraction is best-effort per metric: a malformed measurement only drops
//! that metric.

use serde_json::Value;
use tracing::debug;

use catalogwriter_graph::vocab::dqv;
use catalogwriter_graph::{Graph, NamedNodeRef, Term};
use catalogwriter_shared::{MetricEntry, MetricMapping};

/// A display-name / literal-value pair pulled from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetric {
    pub name: String,
    pub value: String,
}

impl ExtractedMetric {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Why a configured metric produced no extras entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSkip {
    /// No resource is `dqv:isMeasurementOf` the metric.
    NoMeasurement,
    /// The measurement has no `dqv:value`.
    NoValue,
    /// The first `dqv:value` is an IRI or blank node.
    NotLiteral,
    /// The metric key has no configured display name.
    MissingDisplayName,
}

impl std::fmt::Display for ExtractionSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::NoMeasurement => "no measurement",
            Self::NoValue => "measurement has no value",
            Self::NotLiteral => "value is not a literal",
            Self::MissingDisplayName => "no display name configured",
        };
        f.write_str(reason)
    }
}

/// Extract the metric `entry` of `mapping`.
///
/// Only the first measurement resource and its first value are considered.
/// The extras key is the display name `mapping` holds for the entry's key.
pub fn extract_metric(
    graph: &Graph,
    mapping: &MetricMapping,
    entry: &MetricEntry,
) -> Result<ExtractedMetric, ExtractionSkip> {
    let metric = NamedNodeRef::new_unchecked(&entry.measurement);
    let measurements = graph.subjects_with(dqv::IS_MEASUREMENT_OF, metric.into());
    let measurement = measurements
        .first()
        .copied()
        .ok_or(ExtractionSkip::NoMeasurement)?;

    let value = graph
        .objects_of(measurement.as_ref(), dqv::HAS_VALUE)
        .next()
        .ok_or(ExtractionSkip::NoValue)?;
    let Term::Literal(literal) = value else {
        return Err(ExtractionSkip::NotLiteral);
    };

    let name = mapping
        .display_name_of(&entry.key)
        .ok_or(ExtractionSkip::MissingDisplayName)?;

    Ok(ExtractedMetric::new(name, literal.value()))
}

/// Extract every configured metric, in mapping order, skipping failures.
pub fn extract_metrics(graph: &Graph, mapping: &MetricMapping) -> Vec<ExtractedMetric> {
    mapping
        .iter()
        .filter_map(|entry| match extract_metric(graph, mapping, entry) {
            Ok(metric) => Some(metric),
            Err(reason) => {
                debug!(key = %entry.key, %reason, "quality metric skipped");
                None
            }
        })
        .collect()
}

/// Append metrics to an extras fragment as `{"key":<name>, "value":<value>}`.
///
/// Entries are comma-separated, with a leading comma only when `extras`
/// already holds entries. Names and values are JSON-escaped.
pub fn merge_extras(extras: &mut String, metrics: &[ExtractedMetric]) {
    for metric in metrics {
        if !extras.is_empty() {
            extras.push(',');
        }
        extras.push_str(&format!(
            "{{\"key\":{}, \"value\":{}}}",
            json_string(&metric.name),
            json_string(&metric.value)
        ));
    }
}

fn json_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
