//! # openlims-core
//!
//! Core domain types for the OpenLIMS server: patients, the test catalog,
//! samples, per-test work items with their status state machine, result
//! payload classification, and the laboratory branding record.
//!
//! This crate has no I/O. Persistence lives behind the `openlims-storage`
//! trait, HTTP concerns in `openlims-server`.

pub mod catalog;
pub mod error;
pub mod id;
pub mod order;
pub mod patient;
pub mod sample;
pub mod settings;
pub mod time;

pub use catalog::{TestDefinition, TestParameter, TestStatus};
pub use error::{CoreError, ErrorCategory, Result};
pub use id::new_id;
pub use order::{OrderedTest, ResultPayload, WorkStatus};
pub use patient::{Gender, Patient};
pub use sample::{Priority, Sample, SampleStatus, SpecimenType};
pub use settings::LabSettings;
