//! Work items: one row per (sample, test) pair — the actual unit of lab
//! work. Each carries its own status, result payload, and technician notes.
//! This row is the single authoritative result store; the sample-level
//! status is derived from these rows, never stored alongside them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::catalog::TestParameter;
use crate::error::{CoreError, Result};
use crate::time::now_utc;

/// Per-test work status.
///
/// `Pending -> In Progress -> Completed`, with `Cancelled` reachable from
/// the two open states. Terminal states have no outgoing transitions;
/// re-asserting the current status is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition(self, to: WorkStatus) -> bool {
        if self == to {
            return true;
        }
        match (self, to) {
            (Self::Pending, Self::InProgress) => true,
            (Self::Pending, Self::Completed) => true,
            (Self::Pending, Self::Cancelled) => true,
            (Self::InProgress, Self::Completed) => true,
            (Self::InProgress, Self::Cancelled) => true,
            _ => false,
        }
    }

    /// Validated transition.
    pub fn transition(self, to: WorkStatus) -> Result<WorkStatus> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(CoreError::invalid_transition(
                self.to_string(),
                to.to_string(),
            ))
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for WorkStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::unknown_variant("work status", other)),
        }
    }
}

/// Technician-entered values for one work item, classified against the
/// test's declared parameter schema at write time.
///
/// Keys matching a declared parameter land in `values`, reordered to the
/// parameter declaration order. Unknown keys are preserved in `extra`
/// instead of being silently accepted into the schema or dropped. Missing
/// parameters are simply absent and render blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResultPayload {
    #[serde(default)]
    pub values: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, String>,
}

impl ResultPayload {
    /// Classifies raw entries against the declared parameter list.
    pub fn classify(
        parameters: &[TestParameter],
        entries: IndexMap<String, String>,
    ) -> Self {
        let mut values = IndexMap::new();
        let mut remaining = entries;

        for param in parameters {
            if let Some(value) = remaining.shift_remove(&param.name) {
                values.insert(param.name.clone(), value);
            }
        }

        Self {
            values,
            extra: remaining,
        }
    }

    /// Looks up the entered value for a declared parameter.
    pub fn value_for(&self, parameter: &str) -> Option<&str> {
        self.values.get(parameter).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }
}

/// The join row for one (sample, test) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedTest {
    pub sample_id: String,
    pub test_id: String,
    pub status: WorkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl OrderedTest {
    /// A fresh Pending work item with no results.
    pub fn new(sample_id: impl Into<String>, test_id: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            sample_id: sample_id.into(),
            test_id: test_id.into(),
            status: WorkStatus::Pending,
            results: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any result values have been recorded against this item.
    pub fn has_recorded_results(&self) -> bool {
        self.results.as_ref().is_some_and(|r| !r.is_empty())
    }

    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn params() -> Vec<TestParameter> {
        vec![
            TestParameter::new("Hemoglobin"),
            TestParameter::new("WBC"),
            TestParameter::new("Platelets"),
        ]
    }

    #[test]
    fn test_work_status_wire_format() {
        let json = serde_json::to_string(&WorkStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let back: WorkStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(back, WorkStatus::InProgress);
    }

    #[test]
    fn test_transitions_from_pending() {
        assert!(WorkStatus::Pending.can_transition(WorkStatus::InProgress));
        assert!(WorkStatus::Pending.can_transition(WorkStatus::Completed));
        assert!(WorkStatus::Pending.can_transition(WorkStatus::Cancelled));
    }

    #[test]
    fn test_transitions_from_in_progress() {
        assert!(WorkStatus::InProgress.can_transition(WorkStatus::Completed));
        assert!(WorkStatus::InProgress.can_transition(WorkStatus::Cancelled));
        assert!(!WorkStatus::InProgress.can_transition(WorkStatus::Pending));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [WorkStatus::Completed, WorkStatus::Cancelled] {
            for target in [
                WorkStatus::Pending,
                WorkStatus::InProgress,
                WorkStatus::Completed,
                WorkStatus::Cancelled,
            ] {
                if target == terminal {
                    assert!(terminal.can_transition(target), "self-transition is a no-op");
                } else {
                    assert!(!terminal.can_transition(target));
                }
            }
        }
    }

    #[test]
    fn test_transition_error_message() {
        let err = WorkStatus::Completed
            .transition(WorkStatus::Pending)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status transition: Completed -> Pending"
        );
    }

    #[test]
    fn test_classify_reorders_to_declaration_order() {
        let entries = indexmap! {
            "WBC".to_string() => "6.1".to_string(),
            "Hemoglobin".to_string() => "14.2".to_string(),
        };
        let payload = ResultPayload::classify(&params(), entries);

        let keys: Vec<&str> = payload.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Hemoglobin", "WBC"]);
        assert_eq!(payload.value_for("WBC"), Some("6.1"));
        assert!(payload.extra.is_empty());
    }

    #[test]
    fn test_classify_routes_unknown_keys_to_extra() {
        let entries = indexmap! {
            "Hemoglobin".to_string() => "14.2".to_string(),
            "RDW".to_string() => "12.9".to_string(),
        };
        let payload = ResultPayload::classify(&params(), entries);

        assert_eq!(payload.values.len(), 1);
        assert_eq!(payload.extra.get("RDW").map(String::as_str), Some("12.9"));
    }

    #[test]
    fn test_classify_allows_missing_keys() {
        let entries = indexmap! {
            "Platelets".to_string() => "250".to_string(),
        };
        let payload = ResultPayload::classify(&params(), entries);

        assert_eq!(payload.values.len(), 1);
        assert_eq!(payload.value_for("Hemoglobin"), None);
    }

    #[test]
    fn test_payload_serialization_skips_empty_extra() {
        let payload = ResultPayload::classify(
            &params(),
            indexmap! { "WBC".to_string() => "6.1".to_string() },
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["values"]["WBC"], "6.1");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn test_new_work_item_is_pending_and_empty() {
        let item = OrderedTest::new("sample-1", "test-1");
        assert_eq!(item.status, WorkStatus::Pending);
        assert!(item.results.is_none());
        assert!(item.notes.is_none());
        assert!(!item.has_recorded_results());
    }

    #[test]
    fn test_has_recorded_results() {
        let mut item = OrderedTest::new("sample-1", "test-1");
        item.results = Some(ResultPayload::default());
        assert!(!item.has_recorded_results());

        item.results = Some(ResultPayload::classify(
            &params(),
            indexmap! { "WBC".to_string() => "6.1".to_string() },
        ));
        assert!(item.has_recorded_results());
    }
}
