//! Report composition: resolve an accession number into a fully paginated
//! [`ReportDocument`].
//!
//! Composition is defensive everywhere except the sample lookup itself: a
//! missing sample is a hard "not found", while missing branding, a missing
//! patient record, or a test without declared parameters all degrade to
//! placeholders. A human-facing report with gaps beats no report.

use thiserror::Error;

use openlims_core::time::{format_clock_time, format_date, now_utc};
use openlims_core::{LabSettings, OrderedTest, ResultPayload, TestDefinition};
use openlims_storage::{LimsStorage, StorageError};

use crate::model::{
    EMPTY_CELL, PLACEHOLDER, ParameterRow, PatientInfo, ReportDocument, ReportPage, SampleInfo,
    TestBlock,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Sample not found: {0}")]
    SampleNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Report rendering failed: {0}")]
    Render(String),
}

/// Assembles the report for one accession number.
///
/// The work item list and the branding record are independent reads and are
/// loaded concurrently once the sample is resolved.
pub async fn compose_report(
    storage: &dyn LimsStorage,
    accession: &str,
) -> Result<ReportDocument, ReportError> {
    let sample = storage
        .get_sample_by_accession(accession)
        .await?
        .ok_or_else(|| ReportError::SampleNotFound(accession.to_string()))?;

    let (work_items, settings, patient) = tokio::join!(
        storage.list_work_items(&sample.id),
        storage.get_settings(),
        storage.get_patient(&sample.patient_id),
    );
    let work_items = work_items?;
    let branding = settings?.unwrap_or_else(LabSettings::default);
    let patient = patient?;

    let patient_info = match patient {
        Some(p) => PatientInfo {
            name: p.name,
            phone: p.phone.unwrap_or_else(|| PLACEHOLDER.into()),
            gender: p
                .gender
                .map(|g| g.to_string())
                .unwrap_or_else(|| PLACEHOLDER.into()),
            age: p
                .age
                .map(|a| a.to_string())
                .unwrap_or_else(|| PLACEHOLDER.into()),
            doctor: p.doctor.unwrap_or_else(|| PLACEHOLDER.into()),
        },
        None => PatientInfo {
            name: PLACEHOLDER.into(),
            phone: PLACEHOLDER.into(),
            gender: PLACEHOLDER.into(),
            age: PLACEHOLDER.into(),
            doctor: PLACEHOLDER.into(),
        },
    };

    let sample_info = SampleInfo {
        sample_type: sample.sample_type.to_string(),
        collection_date: format_date(sample.collection_date),
        collection_time: format_clock_time(sample.collection_time),
        priority: sample.priority.to_string(),
        location: sample.location.unwrap_or_else(|| PLACEHOLDER.into()),
    };

    let mut blocks = Vec::with_capacity(work_items.len());
    for item in &work_items {
        let test = storage.get_test(&item.test_id).await?;
        blocks.push(test_block(test, item));
    }

    // Page 1 carries the header plus the first test; every further test
    // starts its own page.
    let pages = if blocks.is_empty() {
        vec![ReportPage {
            number: 1,
            test: None,
        }]
    } else {
        blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| ReportPage {
                number: i + 1,
                test: Some(block),
            })
            .collect()
    };

    let today = now_utc().date();
    Ok(ReportDocument {
        branding,
        report_date: format_date(today),
        copyright_year: today.year(),
        accession_number: sample.accession_number,
        patient: patient_info,
        sample: sample_info,
        pages,
    })
}

fn test_block(test: Option<TestDefinition>, item: &OrderedTest) -> TestBlock {
    let payload = item.results.clone().unwrap_or_else(ResultPayload::default);

    match test {
        Some(test) => {
            let rows = test
                .parameters
                .iter()
                .map(|param| ParameterRow {
                    parameter: param.name.clone(),
                    value: payload.value_for(&param.name).unwrap_or("").to_string(),
                    unit: param.units.clone().unwrap_or_else(|| EMPTY_CELL.into()),
                    normal_range: param
                        .normal_range
                        .clone()
                        .unwrap_or_else(|| EMPTY_CELL.into()),
                })
                .collect();
            TestBlock {
                test_name: test.name,
                test_code: test.code,
                specimen_types: test
                    .sample_types
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rows,
                notes: item.notes.clone(),
            }
        }
        // Catalog row vanished under us; render what we still know.
        None => TestBlock {
            test_name: item.test_id.clone(),
            test_code: PLACEHOLDER.into(),
            specimen_types: Vec::new(),
            rows: Vec::new(),
            notes: item.notes.clone(),
        },
    }
}
