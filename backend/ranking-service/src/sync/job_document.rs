//! Normalizes job payloads published by the job service into
//! [`JobSearchDocument`] rows for the vector index.
//!
//! Payloads arrive in either camelCase (API format) or snake_case. Fields
//! that cannot be interpreted fall back to their empty value rather than
//! rejecting the whole job; only a missing id is fatal.

use crate::error::{AppError, Result};
use crate::models::JobSearchDocument;
use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::warn;

/// A job ready for embedding and upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDocument {
    pub id: i64,
    pub fields: JobSearchDocument,
}

fn field<'a>(job: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    job.get(snake)
        .filter(|v| !v.is_null())
        .or_else(|| job.get(camel).filter(|v| !v.is_null()))
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Collapses runs of whitespace into single spaces.
pub fn clean_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Skill names from a list of strings or a list of `{"name": ...}` objects.
pub fn extract_skill_names(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => obj.get("name").map(|name| text(Some(name))),
            other => Some(text(Some(other))),
        })
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Epoch milliseconds from a number, a numeric string, or an ISO-8601 /
/// RFC 3339 timestamp. Timestamps without an offset are read as UTC.
/// Unparsable values yield 0.
pub fn parse_timestamp_ms(value: Option<&Value>, field_name: &str) -> i64 {
    let Some(value) = value else {
        return 0;
    };
    if let Some(ms) = integer(Some(value)) {
        return ms;
    }
    let Value::String(raw) = value else {
        warn!(field = field_name, value = %value, "Unsupported date value");
        return 0;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc().timestamp_millis();
    }
    warn!(field = field_name, value = raw, "Failed to parse date");
    0
}

impl JobDocument {
    /// Builds a document from a job payload object. `fallback_id` is used
    /// when the payload itself carries no usable id.
    pub fn from_payload(payload: &Value, fallback_id: Option<i64>) -> Result<Self> {
        let Value::Object(job) = payload else {
            return Err(AppError::Validation(
                "job payload must be a JSON object".to_string(),
            ));
        };

        let id = integer(job.get("id"))
            .or(fallback_id)
            .ok_or_else(|| AppError::Validation("job payload has no id".to_string()))?;

        let fields = JobSearchDocument {
            title: text(job.get("title")),
            company: text(job.get("company")),
            job_role: text(field(job, "jobRole", "job_role")),
            seniority: text(job.get("seniority")),
            min_experience_years: integer(field(job, "minExperienceYears", "min_experience_years"))
                .unwrap_or(0),
            work_mode: text(field(job, "workMode", "work_mode")),
            salary_min: integer(field(job, "salaryMin", "salary_min")).unwrap_or(0),
            salary_max: integer(field(job, "salaryMax", "salary_max")).unwrap_or(0),
            currency: text(job.get("currency")),
            status: text(job.get("status")),
            date_posted: parse_timestamp_ms(field(job, "datePosted", "date_posted"), "date_posted"),
            date_expires: parse_timestamp_ms(
                field(job, "dateExpires", "date_expires"),
                "date_expires",
            ),
            skills: extract_skill_names(job.get("skills")),
            location: text(job.get("location")).trim().to_string(),
        };

        Ok(Self { id, fields })
    }

    /// Text that gets embedded for this job.
    pub fn combined_text(&self) -> String {
        let doc = &self.fields;
        let skills = doc.skills.join(" ");
        [
            doc.title.as_str(),
            skills.as_str(),
            doc.company.as_str(),
            doc.job_role.as_str(),
            doc.seniority.as_str(),
            doc.location.as_str(),
            doc.work_mode.as_str(),
        ]
        .iter()
        .map(|part| clean_text(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
    }
}
