//! Translates [`FilterSpec`] into a vector-index boolean predicate.
//!
//! Conditions are ANDed. A condition whose value cannot be interpreted is
//! dropped on its own; it never aborts the rest of the predicate.

use crate::models::{DateWindow, ExpiryPolicy, FilterSpec};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

pub const DEFAULT_STATUS: &str = "PUBLISHED";
const DAY_MS: i64 = 86_400_000;

pub struct FilterBuilder;

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Integer or float literal from a JSON number or numeric string.
fn number_literal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.to_string())
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(i.to_string())
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.to_string())
            }
        }
        _ => None,
    }
}

fn timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// `last_N_days` / `next_N_days`.
fn relative_days(keyword: &str) -> Option<DateWindow> {
    let keyword = keyword.trim().to_ascii_lowercase();
    let (direction, rest) = keyword.split_once('_')?;
    let days: i64 = rest.strip_suffix("_days")?.parse().ok()?;
    if days <= 0 || days.checked_mul(DAY_MS).is_none() {
        return None;
    }
    match direction {
        "last" => Some(DateWindow::LastDays(days)),
        "next" => Some(DateWindow::NextDays(days)),
        _ => None,
    }
}

impl FilterBuilder {
    /// Exact epoch-ms timestamp, `[start, end]` range, or relative keyword.
    pub fn parse_date_window(value: &Value) -> Option<DateWindow> {
        match value {
            Value::Array(items) if items.len() == 2 => {
                let start_ms = timestamp_ms(&items[0])?;
                let end_ms = timestamp_ms(&items[1])?;
                Some(DateWindow::Range { start_ms, end_ms })
            }
            Value::String(s) => relative_days(s).or_else(|| timestamp_ms(value).map(DateWindow::Exact)),
            Value::Number(_) => timestamp_ms(value).map(DateWindow::Exact),
            _ => None,
        }
    }

    pub fn parse_expiry_policy(value: &Value) -> Option<ExpiryPolicy> {
        if let Value::String(s) = value {
            match s.trim().to_ascii_lowercase().as_str() {
                "never" => return Some(ExpiryPolicy::Never),
                "active" => return Some(ExpiryPolicy::Active),
                "expired" => return Some(ExpiryPolicy::Expired),
                _ => {}
            }
        }
        Self::parse_date_window(value).map(ExpiryPolicy::Window)
    }

    /// `None` when a relative window falls outside the representable range.
    fn window_condition(field: &str, window: DateWindow, now_ms: i64) -> Option<String> {
        let condition = match window {
            DateWindow::Exact(ts) => format!("{} == {}", field, ts),
            DateWindow::Range { start_ms, end_ms } => {
                format!("{} >= {} and {} <= {}", field, start_ms, field, end_ms)
            }
            DateWindow::LastDays(days) => {
                let start_ms = days
                    .checked_mul(DAY_MS)
                    .and_then(|span| now_ms.checked_sub(span))?;
                format!("{} >= {} and {} <= {}", field, start_ms, field, now_ms)
            }
            DateWindow::NextDays(days) => {
                let end_ms = days
                    .checked_mul(DAY_MS)
                    .and_then(|span| now_ms.checked_add(span))?;
                format!("{} > {} and {} <= {}", field, now_ms, field, end_ms)
            }
        };
        Some(condition)
    }

    fn expiry_condition(policy: ExpiryPolicy, now_ms: i64) -> Option<String> {
        match policy {
            ExpiryPolicy::Never => Some("date_expires == 0".to_string()),
            ExpiryPolicy::Active => Some(Self::not_expired(now_ms)),
            ExpiryPolicy::Expired => Some(format!(
                "(date_expires > 0 and date_expires <= {})",
                now_ms
            )),
            ExpiryPolicy::Window(window) => Self::window_condition("date_expires", window, now_ms),
        }
    }

    fn not_expired(now_ms: i64) -> String {
        format!("(date_expires == 0 or date_expires > {})", now_ms)
    }

    pub fn build(filters: Option<&FilterSpec>, now_ms: i64) -> String {
        let default_spec = FilterSpec::default();
        let spec = filters.unwrap_or(&default_spec);
        let mut conditions: Vec<String> = Vec::new();

        let status = non_blank(&spec.status).unwrap_or(DEFAULT_STATUS);
        conditions.push(format!("status == {}", quote(status)));

        if spec.exclude_expired != Some(false) {
            conditions.push(Self::not_expired(now_ms));
        }

        let equality_fields = [
            ("company", &spec.company),
            ("job_role", &spec.job_role),
            ("seniority", &spec.seniority),
            ("work_mode", &spec.work_mode),
            ("currency", &spec.currency),
        ];
        for (field, value) in equality_fields {
            if let Some(value) = non_blank(value) {
                conditions.push(format!("{} == {}", field, quote(value)));
            }
        }

        if let Some(location) = non_blank(&spec.location) {
            conditions.push(format!("location like {}", quote(&format!("%{}%", location))));
        }

        let salary_bounds = [
            ("salary_min", ">=", &spec.salary_min),
            ("salary_max", "<=", &spec.salary_max),
        ];
        for (field, op, value) in salary_bounds {
            let Some(value) = value else { continue };
            match number_literal(value) {
                Some(literal) => conditions.push(format!("{} {} {}", field, op, literal)),
                None => debug!(field, value = %value, "Dropping non-numeric salary filter"),
            }
        }

        if let Some(value) = &spec.date_posted {
            let condition = match Self::parse_date_window(value) {
                Some(DateWindow::NextDays(_)) | None => None,
                Some(window) => Self::window_condition("date_posted", window, now_ms),
            };
            match condition {
                Some(condition) => conditions.push(condition),
                None => debug!(value = %value, "Dropping unsupported datePosted filter"),
            }
        }

        if let Some(value) = &spec.date_expires {
            let condition = Self::parse_expiry_policy(value)
                .and_then(|policy| Self::expiry_condition(policy, now_ms));
            match condition {
                Some(condition) => conditions.push(condition),
                None => debug!(value = %value, "Dropping unsupported dateExpires filter"),
            }
        }

        conditions.join(" and ")
    }

    /// Adds `id not in [...]` to an existing predicate.
    pub fn exclude_ids(predicate: &str, job_ids: &BTreeSet<i64>) -> String {
        if job_ids.is_empty() {
            return predicate.to_string();
        }
        let ids = job_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if predicate.trim().is_empty() {
            format!("id not in [{}]", ids)
        } else {
            format!("{} and id not in [{}]", predicate, ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn spec(raw: Value) -> FilterSpec {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_default_predicate_for_none_and_empty() {
        let expected = format!(
            "status == \"PUBLISHED\" and (date_expires == 0 or date_expires > {})",
            NOW
        );
        assert_eq!(FilterBuilder::build(None, NOW), expected);
        assert_eq!(FilterBuilder::build(Some(&FilterSpec::default()), NOW), expected);
    }

    #[test]
    fn test_exclude_expired_false_drops_expiry_condition() {
        let filters = spec(json!({"excludeExpired": false}));
        assert_eq!(
            FilterBuilder::build(Some(&filters), NOW),
            "status == \"PUBLISHED\""
        );
    }

    #[test]
    fn test_equality_location_and_salary() {
        let filters = spec(json!({
            "company": "Acme \"Labs\"",
            "workMode": "REMOTE",
            "location": "Berlin",
            "salaryMin": "50000",
            "salaryMax": 90000,
            "excludeExpired": false
        }));

        assert_eq!(
            FilterBuilder::build(Some(&filters), NOW),
            "status == \"PUBLISHED\" and company == \"Acme \\\"Labs\\\"\" and work_mode == \"REMOTE\" \
             and location like \"%Berlin%\" and salary_min >= 50000 and salary_max <= 90000"
        );
    }

    #[test]
    fn test_malformed_values_are_dropped_individually() {
        let filters = spec(json!({
            "salaryMin": "lots",
            "salaryMax": 1000,
            "datePosted": "yesterday-ish",
            "excludeExpired": false
        }));

        assert_eq!(
            FilterBuilder::build(Some(&filters), NOW),
            "status == \"PUBLISHED\" and salary_max <= 1000"
        );
    }

    #[test]
    fn test_mistyped_text_fields_keep_other_conditions() {
        let filters: FilterSpec = serde_json::from_str(
            r#"{"company": 123, "seniority": {"level": 3}, "salaryMin": 50000, "excludeExpired": "false"}"#,
        )
        .unwrap();
        assert_eq!(
            FilterBuilder::build(Some(&filters), NOW),
            "status == \"PUBLISHED\" and company == \"123\" and salary_min >= 50000"
        );
    }

    #[test]
    fn test_out_of_range_relative_windows_are_dropped() {
        let filters = spec(json!({
            "datePosted": "last_200000000000_days",
            "dateExpires": "next_200000000000_days",
            "salaryMax": 1000,
            "excludeExpired": false
        }));
        assert_eq!(
            FilterBuilder::build(Some(&filters), NOW),
            "status == \"PUBLISHED\" and salary_max <= 1000"
        );
        assert_eq!(FilterBuilder::parse_date_window(&json!("last_200000000000_days")), None);

        let near_limit = spec(json!({"datePosted": "last_90_days", "excludeExpired": false}));
        assert_eq!(
            FilterBuilder::build(Some(&near_limit), i64::MIN + DAY_MS),
            "status == \"PUBLISHED\""
        );
    }

    #[test]
    fn test_date_posted_variants() {
        let exact = spec(json!({"datePosted": 1_699_000_000_000i64, "excludeExpired": false}));
        assert!(FilterBuilder::build(Some(&exact), NOW).ends_with("date_posted == 1699000000000"));

        let range = spec(json!({"datePosted": [1, 2], "excludeExpired": false}));
        assert!(FilterBuilder::build(Some(&range), NOW).ends_with("date_posted >= 1 and date_posted <= 2"));

        let relative = spec(json!({"datePosted": "last_7_days", "excludeExpired": false}));
        let week_ago = NOW - 7 * DAY_MS;
        assert!(FilterBuilder::build(Some(&relative), NOW)
            .ends_with(&format!("date_posted >= {} and date_posted <= {}", week_ago, NOW)));
    }

    #[test]
    fn test_expiry_policies() {
        assert_eq!(
            FilterBuilder::parse_expiry_policy(&json!("never")),
            Some(ExpiryPolicy::Never)
        );
        assert_eq!(
            FilterBuilder::parse_expiry_policy(&json!("next_30_days")),
            Some(ExpiryPolicy::Window(DateWindow::NextDays(30)))
        );
        assert_eq!(FilterBuilder::parse_expiry_policy(&json!({"x": 1})), None);

        let expired = spec(json!({"dateExpires": "expired", "excludeExpired": false}));
        assert!(FilterBuilder::build(Some(&expired), NOW)
            .ends_with(&format!("(date_expires > 0 and date_expires <= {})", NOW)));
    }

    #[test]
    fn test_status_override() {
        let filters = spec(json!({"status": "DRAFT", "excludeExpired": false}));
        assert_eq!(FilterBuilder::build(Some(&filters), NOW), "status == \"DRAFT\"");
    }

    #[test]
    fn test_exclude_ids() {
        let ids: BTreeSet<i64> = [3, 1].into_iter().collect();
        assert_eq!(
            FilterBuilder::exclude_ids("status == \"PUBLISHED\"", &ids),
            "status == \"PUBLISHED\" and id not in [1, 3]"
        );
        assert_eq!(FilterBuilder::exclude_ids("x", &BTreeSet::new()), "x");
    }
}
