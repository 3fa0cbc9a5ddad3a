//! Samples: one physical specimen received at intake, identified by a unique
//! accession number and owned by a patient.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Date, OffsetDateTime, Time};

use crate::error::CoreError;
use crate::id::new_id;
use crate::order::WorkStatus;
use crate::time::now_utc;

/// Fixed enumeration of physical specimen kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecimenType {
    Blood,
    Urine,
    Stool,
    Sputum,
    Tissue,
}

impl SpecimenType {
    pub const ALL: [SpecimenType; 5] = [
        Self::Blood,
        Self::Urine,
        Self::Stool,
        Self::Sputum,
        Self::Tissue,
    ];
}

impl fmt::Display for SpecimenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blood => write!(f, "Blood"),
            Self::Urine => write!(f, "Urine"),
            Self::Stool => write!(f, "Stool"),
            Self::Sputum => write!(f, "Sputum"),
            Self::Tissue => write!(f, "Tissue"),
        }
    }
}

impl FromStr for SpecimenType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Blood" => Ok(Self::Blood),
            "Urine" => Ok(Self::Urine),
            "Stool" => Ok(Self::Stool),
            "Sputum" => Ok(Self::Sputum),
            "Tissue" => Ok(Self::Tissue),
            other => Err(CoreError::unknown_variant("specimen type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
    Stat,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Urgent => write!(f, "Urgent"),
            Self::Stat => write!(f, "Stat"),
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(Self::Normal),
            "Urgent" => Ok(Self::Urgent),
            "Stat" => Ok(Self::Stat),
            other => Err(CoreError::unknown_variant("priority", other)),
        }
    }
}

/// Sample-level status. Never stored: derived from the sample's work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    Processing,
    Completed,
}

impl SampleStatus {
    /// Derives the aggregate status from per-test work item statuses.
    ///
    /// A sample is `Completed` when it has at least one work item and every
    /// work item is terminal; anything still open keeps it `Processing`.
    pub fn derive(statuses: &[WorkStatus]) -> Self {
        if !statuses.is_empty() && statuses.iter().all(|s| s.is_terminal()) {
            Self::Completed
        } else {
            Self::Processing
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// One received specimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub accession_number: String,
    pub patient_id: String,
    pub sample_type: SpecimenType,
    #[serde(with = "crate::time::iso_date")]
    pub collection_date: Date,
    #[serde(with = "crate::time::clock_time")]
    pub collection_time: Time,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Sample {
    pub fn new(
        accession_number: impl Into<String>,
        patient_id: impl Into<String>,
        sample_type: SpecimenType,
        collection_date: Date,
        collection_time: Time,
    ) -> Self {
        let now = now_utc();
        Self {
            id: new_id(),
            accession_number: accession_number.into(),
            patient_id: patient_id.into(),
            sample_type,
            collection_date,
            collection_time,
            priority: Priority::Normal,
            location: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{parse_clock_time, parse_date};

    fn sample() -> Sample {
        Sample::new(
            "ACC001",
            "patient-1",
            SpecimenType::Blood,
            parse_date("2025-06-01").unwrap(),
            parse_clock_time("08:30").unwrap(),
        )
    }

    #[test]
    fn test_specimen_type_roundtrip() {
        for st in SpecimenType::ALL {
            let parsed: SpecimenType = st.to_string().parse().unwrap();
            assert_eq!(parsed, st);
        }
        assert!("Plasma".parse::<SpecimenType>().is_err());
    }

    #[test]
    fn test_priority_roundtrip() {
        for p in [Priority::Normal, Priority::Urgent, Priority::Stat] {
            let parsed: Priority = p.to_string().parse().unwrap();
            assert_eq!(parsed, p);
        }
        assert!("ASAP".parse::<Priority>().is_err());
    }

    #[test]
    fn test_sample_serialization_formats() {
        let sample = sample().with_priority(Priority::Urgent);
        let json = serde_json::to_value(&sample).unwrap();

        assert_eq!(json["accession_number"], "ACC001");
        assert_eq!(json["collection_date"], "2025-06-01");
        assert_eq!(json["collection_time"], "08:30");
        assert_eq!(json["priority"], "Urgent");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_status_derivation_empty() {
        assert_eq!(SampleStatus::derive(&[]), SampleStatus::Processing);
    }

    #[test]
    fn test_status_derivation_open_work() {
        assert_eq!(
            SampleStatus::derive(&[WorkStatus::Completed, WorkStatus::Pending]),
            SampleStatus::Processing
        );
        assert_eq!(
            SampleStatus::derive(&[WorkStatus::InProgress]),
            SampleStatus::Processing
        );
    }

    #[test]
    fn test_status_derivation_all_terminal() {
        assert_eq!(
            SampleStatus::derive(&[WorkStatus::Completed, WorkStatus::Cancelled]),
            SampleStatus::Completed
        );
        assert_eq!(
            SampleStatus::derive(&[WorkStatus::Completed]),
            SampleStatus::Completed
        );
    }
}
