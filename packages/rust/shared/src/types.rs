//! Core domain types shared across catalogwriter crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for catalog account identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new time-sortable account identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CatalogAccount
// ---------------------------------------------------------------------------

/// A catalog user account whose API key authorizes dataset writes.
#[derive(Clone, Serialize, Deserialize)]
pub struct CatalogAccount {
    pub id: AccountId,
    /// Human-readable label for the account.
    pub name: String,
    /// CKAN API key (sent in the `Authorization` header).
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

impl CatalogAccount {
    /// Build a fresh account record stamped with the current time.
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            api_key: api_key.into(),
            created_at: Utc::now(),
        }
    }

    /// The API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let visible: String = {
            let chars: Vec<char> = self.api_key.chars().collect();
            let start = chars.len().saturating_sub(4);
            chars[start..].iter().collect()
        };
        format!("****{visible}")
    }
}

// Keep API keys out of logs.
impl std::fmt::Debug for CatalogAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &self.masked_key())
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Quality metric mapping
// ---------------------------------------------------------------------------

/// One configured quality metric: short key, measurement IRI, display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Short metric key (e.g. `availability`).
    pub key: String,
    /// IRI of the metric a `dqv:QualityMeasurement` points at.
    pub measurement: String,
    /// Name written as the extras key. Entries without one are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Ordered metric key → (measurement IRI, display name) table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricMapping(pub Vec<MetricEntry>);

impl MetricMapping {
    /// Entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricEntry> {
        self.0.iter()
    }

    /// Display name configured for `key`, if any.
    pub fn display_name_of(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.name.as_deref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<MetricEntry>> for MetricMapping {
    fn from(entries: Vec<MetricEntry>) -> Self {
        Self(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_roundtrip() {
        let id = AccountId::new();
        let s = id.to_string();
        let parsed: AccountId = s.parse().expect("parse account id");
        assert_eq!(id, parsed);
    }

    #[test]
    fn masked_key_hides_prefix() {
        let account = CatalogAccount::new("ops", "abcdef123456");
        assert_eq!(account.masked_key(), "****3456");
        let debug = format!("{account:?}");
        assert!(!debug.contains("abcdef"));

        let short = CatalogAccount::new("ops", "ab");
        assert_eq!(short.masked_key(), "****ab");
    }

    #[test]
    fn display_name_lookup() {
        let mapping = MetricMapping::from(vec![
            MetricEntry {
                key: "availability".into(),
                measurement: "http://example.org/m/Availability".into(),
                name: Some("Availability".into()),
            },
            MetricEntry {
                key: "unnamed".into(),
                measurement: "http://example.org/m/Unnamed".into(),
                name: None,
            },
        ]);
        assert_eq!(mapping.display_name_of("availability"), Some("Availability"));
        assert_eq!(mapping.display_name_of("unnamed"), None);
        assert_eq!(mapping.display_name_of("missing"), None);
        assert_eq!(mapping.len(), 2);
    }
}
