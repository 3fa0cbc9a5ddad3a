//! The test catalog: reusable test definitions and their parameter schemas.
//!
//! A catalog entry is independent of any patient or sample; work items
//! reference it by ID. The parameter list doubles as the schema that result
//! payloads are classified against (see [`crate::order::ResultPayload`]),
//! and its vector order is the display order on reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::CoreError;
use crate::id::new_id;
use crate::sample::SpecimenType;
use crate::time::now_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TestStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Inactive => write!(f, "Inactive"),
        }
    }
}

impl FromStr for TestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Inactive" => Ok(Self::Inactive),
            other => Err(CoreError::unknown_variant("test status", other)),
        }
    }
}

/// One named measurement within a test's schema, e.g. "Hemoglobin".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestParameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<String>,
}

impl TestParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: None,
            normal_range: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_normal_range(mut self, normal_range: impl Into<String>) -> Self {
        self.normal_range = Some(normal_range.into());
        self
    }
}

/// A catalog test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: String,
    /// Globally unique short code, e.g. "CBC".
    pub code: String,
    pub name: String,
    /// Specimen types this test can run on.
    pub sample_types: Vec<SpecimenType>,
    pub category: String,
    pub department: String,
    pub price: f64,
    /// Free-text turnaround, e.g. "24h".
    pub duration: String,
    pub status: TestStatus,
    /// Declared parameters; vector order is display order.
    pub parameters: Vec<TestParameter>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TestDefinition {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            id: new_id(),
            code: code.into(),
            name: name.into(),
            sample_types: Vec::new(),
            category: String::new(),
            department: String::new(),
            price: 0.0,
            duration: String::new(),
            status: TestStatus::Active,
            parameters: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sample_types(mut self, sample_types: Vec<SpecimenType>) -> Self {
        self.sample_types = sample_types;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn with_status(mut self, status: TestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<TestParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Whether this test can run on the given specimen type.
    pub fn supports(&self, specimen: SpecimenType) -> bool {
        self.sample_types.contains(&specimen)
    }

    /// Declared parameter names, in display order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = now_utc();
    }
}
