//! DCAT graph → CKAN `package_create` envelope.
//!
//! Maps the first `dcat:Dataset` in a graph onto CKAN dataset fields:
//! - `name` / `title` from `dct:title`
//! - `notes`, `url`, `license_id`, `tags`
//! - `resources` from `dcat:distribution`
//!
//! The extras fragment is left empty for the quality enrichment step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use catalogwriter_graph::vocab::{dcat, dct};
use catalogwriter_graph::{Graph, Subject, SubjectRef, Term, as_subject};
use catalogwriter_shared::{CatalogWriterError, Result};

/// CKAN's maximum length for dataset names and tags.
const MAX_NAME_LEN: usize = 100;

/// Issued names remembered for collision suffixing; older ones are forgotten.
const MAX_TRACKED_NAMES: usize = 10_000;

/// Name used when a title slugs to fewer than two characters.
const FALLBACK_NAME: &str = "dataset";

/// Runs of characters CKAN does not accept in dataset names.
static NAME_INVALID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").expect("name regex"));

/// Runs of dashes left behind after replacement.
static DASH_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("dash regex"));

/// Characters CKAN does not accept in tags.
static TAG_INVALID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.-]+").expect("tag regex"));

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The in-progress submission: dataset fields plus the extras list.
///
/// Both halves are JSON fragments without their surrounding brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Comma-joined `"key":value` members of the dataset object.
    pub body: String,
    /// Comma-joined extras objects.
    pub extras: String,
}

impl Envelope {
    /// Assemble `{<body>,"extras":[<extras>]}`.
    pub fn into_payload(self) -> String {
        if self.body.is_empty() {
            format!("{{\"extras\":[{}]}}", self.extras)
        } else {
            format!("{{{},\"extras\":[{}]}}", self.body, self.extras)
        }
    }
}

// ---------------------------------------------------------------------------
// Name registry
// ---------------------------------------------------------------------------

/// Bounded record of issued dataset names.
///
/// Each name maps to the last suffix handed out for it, so a repeat
/// resumes from there. Past `capacity` the oldest name is dropped and may
/// be issued again.
#[derive(Debug)]
struct NameRegistry {
    last_suffix: HashMap<String, u32>,
    order: VecDeque<String>,
    capacity: usize,
}

impl NameRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            last_suffix: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn len(&self) -> usize {
        self.last_suffix.len()
    }

    fn contains(&self, name: &str) -> bool {
        self.last_suffix.contains_key(name)
    }

    fn remember(&mut self, name: String) {
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.last_suffix.remove(&oldest);
            }
        }
        self.last_suffix.insert(name.clone(), 0);
        self.order.push_back(name);
    }

    /// Issue `base`, or `base-<n>` with the first free `n` when taken.
    fn issue(&mut self, base: &str) -> String {
        let Some(&last) = self.last_suffix.get(base) else {
            self.remember(base.to_string());
            return base.to_string();
        };

        let mut n = last.saturating_add(1);
        let candidate = loop {
            let suffix = format!("-{n}");
            let stem = clip(base, MAX_NAME_LEN - suffix.len()).trim_end_matches('-');
            let candidate = format!("{stem}{suffix}");
            if !self.contains(&candidate) {
                break candidate;
            }
            n = n.saturating_add(1);
        };

        if let Some(last) = self.last_suffix.get_mut(base) {
            *last = n;
        }
        self.remember(candidate.clone());
        candidate
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Converts dataset graphs into CKAN envelopes.
#[derive(Debug)]
pub struct Converter {
    append_number: bool,
    names: Mutex<NameRegistry>,
}

impl Converter {
    /// `append_number` suffixes repeated dataset names with `-1`, `-2`, ...
    pub fn new(append_number: bool) -> Self {
        Self::with_name_capacity(append_number, MAX_TRACKED_NAMES)
    }

    /// Like [`new`](Self::new), remembering at most `capacity` issued names.
    pub fn with_name_capacity(append_number: bool, capacity: usize) -> Self {
        Self {
            append_number,
            names: Mutex::new(NameRegistry::new(capacity)),
        }
    }

    /// Map the graph's dataset onto an envelope with empty extras.
    pub fn convert(&self, graph: &Graph) -> Result<Envelope> {
        let datasets = graph.instances_of(dcat::DATASET);
        let dataset = datasets
            .first()
            .copied()
            .ok_or_else(|| CatalogWriterError::conversion("graph contains no dcat:Dataset"))?;
        if datasets.len() > 1 {
            debug!(count = datasets.len(), "multiple datasets in graph, converting the first");
        }

        let title = graph
            .first_literal(dataset.as_ref(), dct::TITLE)
            .map(str::to_string)
            .unwrap_or_else(|| subject_text(dataset));
        let dataset = dataset.as_ref();
        let name = self.unique_name(&slugify(&title));

        let mut fields: Vec<(&str, Value)> = vec![
            ("name", Value::String(name)),
            ("title", Value::String(title)),
        ];

        if let Some(notes) = graph.first_literal(dataset, dct::DESCRIPTION) {
            fields.push(("notes", json!(notes)));
        }
        if let Some(url) = graph.objects_of(dataset, dcat::LANDING_PAGE).next() {
            fields.push(("url", json!(term_text(url))));
        }
        if let Some(license) = graph.objects_of(dataset, dct::LICENSE).next() {
            fields.push(("license_id", json!(term_text(license))));
        }

        let tags = tags(graph, dataset);
        if !tags.is_empty() {
            fields.push(("tags", Value::Array(tags)));
        }

        let resources = resources(graph, dataset);
        if !resources.is_empty() {
            fields.push(("resources", Value::Array(resources)));
        }

        let mut body = String::new();
        for (key, value) in &fields {
            if !body.is_empty() {
                body.push(',');
            }
            body.push_str(&to_json(&Value::String((*key).to_string()))?);
            body.push(':');
            body.push_str(&to_json(value)?);
        }

        Ok(Envelope {
            body,
            extras: String::new(),
        })
    }

    /// Reserve a dataset name, suffixing it when it was recently issued.
    fn unique_name(&self, base: &str) -> String {
        if !self.append_number {
            return base.to_string();
        }

        let name = self
            .names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .issue(base);
        if name != base {
            debug!(base, %name, "dataset name taken, appended number");
        }
        name
    }
}

/// Lowercase, CKAN-safe dataset name derived from a title.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let replaced = NAME_INVALID_RE.replace_all(&lower, "-");
    let collapsed = DASH_RUN_RE.replace_all(&replaced, "-");
    let slug = clip(collapsed.trim_matches('-'), MAX_NAME_LEN).trim_end_matches('-');
    if slug.len() < 2 {
        FALLBACK_NAME.to_string()
    } else {
        slug.to_string()
    }
}

/// First `max` bytes of an ASCII slug.
fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Text of a term: IRI, blank label, or literal lexical form.
fn term_text(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => node.as_str().to_string(),
        Term::Literal(lit) => lit.value().to_string(),
    }
}

fn subject_text(subject: &Subject) -> String {
    match subject {
        Subject::NamedNode(node) => node.as_str().to_string(),
        Subject::BlankNode(node) => node.as_str().to_string(),
    }
}

fn to_json(value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CatalogWriterError::conversion(e.to_string()))
}

fn tags(graph: &Graph, dataset: SubjectRef<'_>) -> Vec<Value> {
    let mut seen = HashSet::new();
    graph
        .objects_of(dataset, dcat::KEYWORD)
        .filter_map(|term| match term {
            Term::Literal(lit) => Some(lit),
            _ => None,
        })
        .filter_map(|lit| {
            let cleaned = TAG_INVALID_RE.replace_all(lit.value(), " ");
            let tag = clip(cleaned.trim(), MAX_NAME_LEN).trim().to_string();
            (tag.chars().count() >= 2 && seen.insert(tag.clone())).then(|| json!({ "name": tag }))
        })
        .collect()
}

fn resources(graph: &Graph, dataset: SubjectRef<'_>) -> Vec<Value> {
    graph
        .objects_of(dataset, dcat::DISTRIBUTION)
        .filter_map(|term| {
            let Some(dist) = as_subject(term) else {
                debug!(distribution = %term, "distribution is a literal, skipping");
                return None;
            };
            let url = graph
                .objects_of(dist, dcat::ACCESS_URL)
                .chain(graph.objects_of(dist, dcat::DOWNLOAD_URL))
                .next()
                .map(term_text);
            let Some(url) = url else {
                debug!(distribution = %dist, "distribution has no URL, skipping");
                return None;
            };

            let mut resource = serde_json::Map::new();
            resource.insert("url".into(), json!(url));
            if let Some(name) = graph.first_literal(dist, dct::TITLE) {
                resource.insert("name".into(), json!(name));
            }
            if let Some(description) = graph.first_literal(dist, dct::DESCRIPTION) {
                resource.insert("description".into(), json!(description));
            }
            if let Some(format) = graph
                .objects_of(dist, dct::FORMAT)
                .chain(graph.objects_of(dist, dcat::MEDIA_TYPE))
                .next()
            {
                resource.insert("format".into(), json!(term_text(format)));
            }
            Some(Value::Object(resource))
        })
        .collect()
}
