//! Phase input and output value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

use crate::phase_id::PhaseId;

/// Flat business-context mapping captured during onboarding
/// (e.g. `website_url`, `business_name`).
pub type Profile = BTreeMap<String, Value>;

/// Input handed to a single phase invocation.
///
/// Built fresh for every invocation and passed by value, so nothing a phase
/// does to its copy is visible to any later phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInput {
    subject_id: String,
    keywords: Vec<String>,
    profile: Profile,
    #[serde(default)]
    previous_outputs: BTreeMap<PhaseId, PhaseOutput>,
}

impl PhaseInput {
    pub fn new(subject_id: impl Into<String>, keywords: Vec<String>, profile: Profile) -> Self {
        Self {
            subject_id: subject_id.into(),
            keywords,
            profile,
            previous_outputs: BTreeMap::new(),
        }
    }

    /// Return a new input that additionally carries `output` under its phase id.
    pub fn with_previous_output(mut self, output: PhaseOutput) -> Self {
        self.previous_outputs.insert(output.phase(), output);
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Look up a string-valued profile entry.
    pub fn profile_str(&self, key: &str) -> Option<&str> {
        self.profile.get(key).and_then(Value::as_str)
    }

    pub fn previous_outputs(&self) -> &BTreeMap<PhaseId, PhaseOutput> {
        &self.previous_outputs
    }

    pub fn previous_output(&self, phase: PhaseId) -> Option<&PhaseOutput> {
        self.previous_outputs.get(&phase)
    }

    /// Payload of a previous phase, if that phase ran and succeeded.
    pub fn previous_data(&self, phase: PhaseId) -> Option<&Value> {
        self.previous_output(phase)
            .filter(|o| o.is_success())
            .map(PhaseOutput::data)
    }

    /// Keywords a phase should work on: the tuned `final_keywords` when the
    /// tuning phase has run, otherwise the input keyword set.
    pub fn working_keywords(&self) -> Vec<String> {
        self.previous_data(PhaseId::Tuning)
            .and_then(|d| d.get("final_keywords"))
            .and_then(string_list)
            .unwrap_or_else(|| self.keywords.clone())
    }
}

/// Interpret a JSON value as a list of strings, skipping non-string items.
pub fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

/// Result of one phase invocation.
///
/// The error message is present if and only if `success` is false. The
/// constructors are the only way to build a value, and deserialization
/// rejects records that break the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PhaseOutputRecord", into = "PhaseOutputRecord")]
pub struct PhaseOutput {
    phase: PhaseId,
    success: bool,
    data: Value,
    error: Option<String>,
    completed_at: DateTime<Utc>,
}

/// Raised when a persisted output record violates the success/error rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOutput {
    #[error("output for {0} is marked failed but carries no error message")]
    MissingError(PhaseId),
    #[error("output for {0} is marked successful but carries an error message")]
    UnexpectedError(PhaseId),
}

impl PhaseOutput {
    pub fn success(phase: PhaseId, data: Value) -> Self {
        Self {
            phase,
            success: true,
            data,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(phase: PhaseId, error: impl Into<String>) -> Self {
        Self {
            phase,
            success: false,
            data: Value::Object(Map::new()),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    /// Convert a fallible phase computation into an output, so handlers can
    /// use `?` internally and still honour the no-fault contract.
    pub fn from_result<E: Display>(phase: PhaseId, result: Result<Value, E>) -> Self {
        match result {
            Ok(data) => Self::success(phase, data),
            Err(e) => Self::failure(phase, e.to_string()),
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Look up a top-level field of the payload.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[derive(Serialize, Deserialize)]
struct PhaseOutputRecord {
    phase_name: PhaseId,
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
    completed_at: DateTime<Utc>,
}

impl TryFrom<PhaseOutputRecord> for PhaseOutput {
    type Error = InvalidOutput;

    fn try_from(record: PhaseOutputRecord) -> Result<Self, Self::Error> {
        match (record.success, &record.error) {
            (false, None) => return Err(InvalidOutput::MissingError(record.phase_name)),
            (true, Some(_)) => return Err(InvalidOutput::UnexpectedError(record.phase_name)),
            _ => {}
        }
        Ok(Self {
            phase: record.phase_name,
            success: record.success,
            data: record.data,
            error: record.error,
            completed_at: record.completed_at,
        })
    }
}

impl From<PhaseOutput> for PhaseOutputRecord {
    fn from(output: PhaseOutput) -> Self {
        Self {
            phase_name: output.phase,
            success: output.success,
            data: output.data,
            error: output.error,
            completed_at: output.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> Profile {
        let mut p = Profile::new();
        p.insert("website_url".into(), json!("https://example.com"));
        p
    }

    #[test]
    fn test_failure_has_error_and_empty_data() {
        let out = PhaseOutput::failure(PhaseId::Market, "quota exceeded");
        assert!(!out.is_success());
        assert_eq!(out.error(), Some("quota exceeded"));
        assert_eq!(out.data(), &json!({}));
    }

    #[test]
    fn test_from_result_maps_err_to_failure() {
        let ok = PhaseOutput::from_result::<String>(PhaseId::Tuning, Ok(json!({"a": 1})));
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let err = PhaseOutput::from_result(PhaseId::Tuning, Err::<Value, _>("boom"));
        assert!(!err.is_success());
        assert_eq!(err.error(), Some("boom"));
    }

    #[test]
    fn test_output_roundtrip_uses_phase_name_field() {
        let out = PhaseOutput::success(PhaseId::RealityCheck, json!({"gsc_data": []}));
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["phase_name"], "phase3_gsc");
        assert!(value["error"].is_null());
        let back: PhaseOutput = serde_json::from_value(value).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn test_deserialize_rejects_failed_output_without_error() {
        let raw = json!({
            "phase_name": "phase2_market",
            "success": false,
            "data": {},
            "error": null,
            "completed_at": "2026-01-01T00:00:00Z"
        });
        let err = serde_json::from_value::<PhaseOutput>(raw).unwrap_err();
        assert!(err.to_string().contains("no error message"));
    }

    #[test]
    fn test_deserialize_rejects_successful_output_with_error() {
        let raw = json!({
            "phase_name": "phase2_market",
            "success": true,
            "data": {},
            "error": "oops",
            "completed_at": "2026-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<PhaseOutput>(raw).is_err());
    }

    #[test]
    fn test_with_previous_output_does_not_touch_original_clone() {
        let base = PhaseInput::new("u1", vec!["seo".into()], profile());
        let snapshot = base.clone();
        let extended =
            base.with_previous_output(PhaseOutput::success(PhaseId::Tuning, json!({})));
        assert!(snapshot.previous_outputs().is_empty());
        assert_eq!(extended.previous_outputs().len(), 1);
    }

    #[test]
    fn test_working_keywords_prefers_tuned_keywords() {
        let input = PhaseInput::new("u1", vec!["raw".into()], profile());
        assert_eq!(input.working_keywords(), vec!["raw".to_string()]);

        let tuned = input.with_previous_output(PhaseOutput::success(
            PhaseId::Tuning,
            json!({"final_keywords": ["tuned a", "tuned b"]}),
        ));
        assert_eq!(
            tuned.working_keywords(),
            vec!["tuned a".to_string(), "tuned b".to_string()]
        );
    }

    #[test]
    fn test_previous_data_ignores_failed_outputs() {
        let input = PhaseInput::new("u1", vec![], profile())
            .with_previous_output(PhaseOutput::failure(PhaseId::Market, "down"));
        assert!(input.previous_output(PhaseId::Market).is_some());
        assert!(input.previous_data(PhaseId::Market).is_none());
        assert_eq!(input.profile_str("website_url"), Some("https://example.com"));
    }
}
