use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Text condition. Numbers and booleans are stringified; any other JSON
/// type yields `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Boolean flag from a JSON bool, `"true"`/`"false"` or `1`/`0`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Structured search/recommendation filters as sent by callers.
///
/// Every field tolerates a mistyped value. Numeric and date fields are kept
/// as raw JSON so a malformed value only drops its own condition when the
/// predicate is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(alias = "job_role", deserialize_with = "lenient_string")]
    pub job_role: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub seniority: Option<String>,
    #[serde(alias = "work_mode", deserialize_with = "lenient_string")]
    pub work_mode: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(alias = "salary_min")]
    pub salary_min: Option<Value>,
    #[serde(alias = "salary_max")]
    pub salary_max: Option<Value>,
    /// Exact epoch-ms timestamp, `[start, end]` range, or `last_7_days` / `last_30_days`.
    #[serde(alias = "date_posted")]
    pub date_posted: Option<Value>,
    /// `never`, `active`, `expired`, `next_7_days`, `next_30_days`, an exact
    /// timestamp or a `[start, end]` range.
    #[serde(alias = "date_expires")]
    pub date_expires: Option<Value>,
    #[serde(alias = "exclude_expired", deserialize_with = "lenient_bool")]
    pub exclude_expired: Option<bool>,
}

impl FilterSpec {
    /// True when the caller supplied no condition at all.
    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }
}

/// Parsed `datePosted` / `dateExpires` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Exact(i64),
    Range { start_ms: i64, end_ms: i64 },
    /// Within the last N days, resolved against the request clock.
    LastDays(i64),
    /// Within the next N days, resolved against the request clock.
    NextDays(i64),
}

/// Parsed `dateExpires` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Jobs without an expiry date (`date_expires == 0`).
    Never,
    /// Not yet expired, including jobs that never expire.
    Active,
    /// Already expired.
    Expired,
    Window(DateWindow),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_and_snake_case() {
        let camel: FilterSpec =
            serde_json::from_str(r#"{"jobRole": "Backend", "salaryMin": 1000, "excludeExpired": false}"#)
                .unwrap();
        let snake: FilterSpec =
            serde_json::from_str(r#"{"job_role": "Backend", "salary_min": 1000, "exclude_expired": false}"#)
                .unwrap();

        assert_eq!(camel, snake);
        assert_eq!(camel.job_role.as_deref(), Some("Backend"));
        assert_eq!(camel.exclude_expired, Some(false));
    }

    #[test]
    fn test_mistyped_fields_do_not_reject_the_spec() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"company": 123, "salaryMin": 50000}"#).unwrap();
        assert_eq!(spec.company.as_deref(), Some("123"));
        assert_eq!(spec.salary_min, Some(Value::from(50000)));

        let spec: FilterSpec = serde_json::from_str(
            r#"{"excludeExpired": "false", "workMode": "REMOTE", "location": ["x"], "status": null}"#,
        )
        .unwrap();
        assert_eq!(spec.exclude_expired, Some(false));
        assert_eq!(spec.work_mode.as_deref(), Some("REMOTE"));
        assert_eq!(spec.location, None);
        assert_eq!(spec.status, None);

        let spec: FilterSpec = serde_json::from_str(r#"{"excludeExpired": "maybe"}"#).unwrap();
        assert_eq!(spec.exclude_expired, None);
    }

    #[test]
    fn test_empty_object_is_empty_spec() {
        let spec: FilterSpec = serde_json::from_str("{}").unwrap();
        assert!(spec.is_empty());
    }
}
