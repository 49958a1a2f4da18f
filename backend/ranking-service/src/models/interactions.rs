use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Interaction kinds the decay engine knows how to weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Apply,
    Save,
    Click,
    ClickFromSimilar,
    ClickFromRecommended,
    ClickFromSearch,
    SkipFromSimilar,
    SkipFromRecommended,
    SkipFromSearch,
}

impl InteractionType {
    pub const ALL: [InteractionType; 9] = [
        InteractionType::Apply,
        InteractionType::Save,
        InteractionType::Click,
        InteractionType::ClickFromSimilar,
        InteractionType::ClickFromRecommended,
        InteractionType::ClickFromSearch,
        InteractionType::SkipFromSimilar,
        InteractionType::SkipFromRecommended,
        InteractionType::SkipFromSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Apply => "APPLY",
            InteractionType::Save => "SAVE",
            InteractionType::Click => "CLICK",
            InteractionType::ClickFromSimilar => "CLICK_FROM_SIMILAR",
            InteractionType::ClickFromRecommended => "CLICK_FROM_RECOMMENDED",
            InteractionType::ClickFromSearch => "CLICK_FROM_SEARCH",
            InteractionType::SkipFromSimilar => "SKIP_FROM_SIMILAR",
            InteractionType::SkipFromRecommended => "SKIP_FROM_RECOMMENDED",
            InteractionType::SkipFromSearch => "SKIP_FROM_SEARCH",
        }
    }

    /// Case-insensitive lookup; keys outside the allow-list return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == upper)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction timestamp in epoch seconds.
///
/// Deserialization never fails: numbers, numeric strings and RFC 3339 strings
/// are accepted, anything else becomes `None` and is treated as "now" by the
/// decay engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LenientTimestamp(pub Option<f64>);

impl LenientTimestamp {
    pub fn at(epoch_seconds: f64) -> Self {
        Self(Some(epoch_seconds))
    }

    pub fn missing() -> Self {
        Self(None)
    }

    pub fn seconds(&self) -> Option<f64> {
        self.0
    }

    fn from_value(value: &Value) -> Self {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed.parse::<f64>().ok().or_else(|| {
                    DateTime::parse_from_rfc3339(trimmed)
                        .ok()
                        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
                })
            }
            _ => None,
        };
        Self(parsed.filter(|ts| ts.is_finite()))
    }
}

impl<'de> Deserialize<'de> for LenientTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl Serialize for LenientTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Entries recorded under one interaction type.
///
/// Callers send either a plain list of job ids or a `job_id -> timestamp`
/// object; the shape is resolved once here. Ids that are not integers are
/// dropped, as is any other payload shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InteractionEntries {
    Ids(BTreeSet<i64>),
    TimestampedIds(BTreeMap<i64, LenientTimestamp>),
}

fn job_id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for InteractionEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let entries = match value {
            Value::Array(items) => {
                InteractionEntries::Ids(items.iter().filter_map(job_id_from_value).collect())
            }
            Value::Object(map) => InteractionEntries::TimestampedIds(
                map.iter()
                    .filter_map(|(key, ts)| {
                        key.trim()
                            .parse::<i64>()
                            .ok()
                            .map(|id| (id, LenientTimestamp::from_value(ts)))
                    })
                    .collect(),
            ),
            other => {
                debug!(payload = %other, "Ignoring interaction entries with unsupported shape");
                InteractionEntries::Ids(BTreeSet::new())
            }
        };
        Ok(entries)
    }
}

impl InteractionEntries {
    pub fn len(&self) -> usize {
        match self {
            InteractionEntries::Ids(ids) => ids.len(),
            InteractionEntries::TimestampedIds(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(job_id, timestamp)` pairs; plain ids carry no timestamp.
    pub fn entries(&self) -> Vec<(i64, Option<f64>)> {
        match self {
            InteractionEntries::Ids(ids) => ids.iter().map(|id| (*id, None)).collect(),
            InteractionEntries::TimestampedIds(map) => {
                map.iter().map(|(id, ts)| (*id, ts.seconds())).collect()
            }
        }
    }

    pub fn job_ids(&self) -> Vec<i64> {
        match self {
            InteractionEntries::Ids(ids) => ids.iter().copied().collect(),
            InteractionEntries::TimestampedIds(map) => map.keys().copied().collect(),
        }
    }
}

/// A user's interaction history keyed by raw interaction-type name.
///
/// Unknown keys are kept (they still count towards the total) but are skipped
/// by [`InteractionLog::typed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionLog {
    entries: BTreeMap<String, InteractionEntries>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entries: InteractionEntries) {
        self.entries.insert(key.into(), entries);
    }

    /// Builder-style insert keyed by a known interaction type.
    pub fn with(mut self, kind: InteractionType, entries: InteractionEntries) -> Self {
        self.insert(kind.as_str(), entries);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(InteractionEntries::is_empty)
    }

    /// Number of recorded entries across every key, known or not.
    pub fn total_count(&self) -> usize {
        self.entries.values().map(InteractionEntries::len).sum()
    }

    pub fn typed(&self) -> impl Iterator<Item = (InteractionType, &InteractionEntries)> {
        self.entries
            .iter()
            .filter_map(|(key, entries)| InteractionType::parse(key).map(|kind| (kind, entries)))
    }

    /// Every job id the user has touched, regardless of interaction type.
    pub fn job_ids(&self) -> BTreeSet<i64> {
        self.entries
            .values()
            .flat_map(InteractionEntries::job_ids)
            .collect()
    }
}
