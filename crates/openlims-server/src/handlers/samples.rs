//! Sample intake, metadata editing, and per-test work item management.
//!
//! Metadata updates and test-set changes are separate operations: `PUT
//! /api/samples/{id}` never touches the test set, while the nested
//! `/tests` routes attach, detach, sync, and update individual work items.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Date, Time};

use openlims_core::time::{parse_clock_time, parse_date};
use openlims_core::{
    OrderedTest, Patient, Priority, ResultPayload, Sample, SampleStatus, SpecimenType,
    TestDefinition, WorkStatus,
};
use openlims_storage::{Page, WorkItemChange};

use super::PageQuery;
use crate::api::{ApiError, ValidationErrors, data, paginated};
use crate::server::AppState;

/// A catalog test joined with its work item on one sample.
#[derive(Debug, Serialize)]
pub struct AttachedTest {
    #[serde(flatten)]
    pub test: TestDefinition,
    pub work: WorkView,
}

#[derive(Debug, Serialize)]
pub struct WorkView {
    pub status: WorkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkView {
    fn from_item(item: &OrderedTest) -> Self {
        Self {
            status: item.status,
            results: item.results.clone(),
            notes: item.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SampleResource {
    #[serde(flatten)]
    pub sample: Sample,
    /// Derived from the work items, never stored.
    pub status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<Patient>,
    pub tests: Vec<AttachedTest>,
}

pub(crate) async fn attached_test(
    state: &AppState,
    item: &OrderedTest,
) -> Result<Option<AttachedTest>, ApiError> {
    Ok(state.storage.get_test(&item.test_id).await?.map(|test| {
        AttachedTest {
            test,
            work: WorkView::from_item(item),
        }
    }))
}

pub(crate) async fn sample_resource(
    state: &AppState,
    sample: Sample,
) -> Result<SampleResource, ApiError> {
    let items = state.storage.list_work_items(&sample.id).await?;
    let statuses: Vec<WorkStatus> = items.iter().map(|i| i.status).collect();
    let patient = state.storage.get_patient(&sample.patient_id).await?;

    let mut tests = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(attached) = attached_test(state, item).await? {
            tests.push(attached);
        }
    }

    Ok(SampleResource {
        sample,
        status: SampleStatus::derive(&statuses),
        patient,
        tests,
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct SamplePayload {
    pub patient_id: Option<String>,
    pub accession_number: Option<String>,
    pub sample_type: Option<String>,
    pub collection_date: Option<String>,
    pub collection_time: Option<String>,
    pub priority: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Accepted on create only; edits go through the `/tests` routes.
    pub tests: Option<Vec<String>>,
}

struct ValidatedSample {
    patient_id: Option<String>,
    accession_number: Option<String>,
    sample_type: Option<SpecimenType>,
    collection_date: Option<Date>,
    collection_time: Option<Time>,
    priority: Option<Priority>,
    location: Option<String>,
    notes: Option<String>,
    tests: Vec<String>,
}

impl SamplePayload {
    fn validate(self, creating: bool) -> Result<ValidatedSample, ApiError> {
        let mut errors = ValidationErrors::new();

        let require = |errors: &mut ValidationErrors, field: &str, value: &Option<String>| {
            if creating && value.as_deref().map(str::trim).unwrap_or("").is_empty() {
                errors.add(field, format!("The {field} field is required."));
            }
        };
        require(&mut errors, "patient_id", &self.patient_id);
        require(&mut errors, "accession_number", &self.accession_number);

        let sample_type = match &self.sample_type {
            Some(raw) => match raw.parse::<SpecimenType>() {
                Ok(st) => Some(st),
                Err(_) => {
                    errors.add(
                        "sample_type",
                        "The sample type must be Blood, Urine, Stool, Sputum, or Tissue.",
                    );
                    None
                }
            },
            None => {
                if creating {
                    errors.add("sample_type", "The sample type field is required.");
                }
                None
            }
        };

        let collection_date = match &self.collection_date {
            Some(raw) => match parse_date(raw) {
                Ok(d) => Some(d),
                Err(_) => {
                    errors.add("collection_date", "The collection date is not a valid date.");
                    None
                }
            },
            None => {
                if creating {
                    errors.add("collection_date", "The collection date field is required.");
                }
                None
            }
        };

        let collection_time = match &self.collection_time {
            Some(raw) => match parse_clock_time(raw) {
                Ok(t) => Some(t),
                Err(_) => {
                    errors.add(
                        "collection_time",
                        "The collection time does not match the format H:i.",
                    );
                    None
                }
            },
            None => {
                if creating {
                    errors.add("collection_time", "The collection time field is required.");
                }
                None
            }
        };

        let priority = match &self.priority {
            Some(raw) => match raw.parse::<Priority>() {
                Ok(p) => Some(p),
                Err(_) => {
                    errors.add("priority", "The priority must be Normal, Urgent, or Stat.");
                    None
                }
            },
            None => {
                if creating {
                    errors.add("priority", "The priority field is required.");
                }
                None
            }
        };

        if let Some(location) = &self.location {
            if location.len() > 255 {
                errors.add(
                    "location",
                    "The location may not be greater than 255 characters.",
                );
            }
        }

        errors.into_result()?;
        Ok(ValidatedSample {
            patient_id: self.patient_id,
            accession_number: self.accession_number,
            sample_type,
            collection_date,
            collection_time,
            priority,
            location: self.location,
            notes: self.notes,
            tests: self.tests.unwrap_or_default(),
        })
    }
}

/// Rejects tests whose declared specimen types exclude the sample's, when
/// the deployment has opted into server-side enforcement. Unknown IDs are
/// left for storage to report.
async fn check_specimen_compatibility(
    state: &AppState,
    specimen: SpecimenType,
    test_ids: &[String],
) -> Result<(), ApiError> {
    if !state.config.intake.enforce_specimen_compatibility {
        return Ok(());
    }

    let mut errors = ValidationErrors::new();
    for (i, test_id) in test_ids.iter().enumerate() {
        if let Some(test) = state.storage.get_test(test_id).await? {
            if !test.supports(specimen) {
                errors.add(
                    format!("tests.{i}"),
                    format!("Test {} does not support {} samples.", test.code, specimen),
                );
            }
        }
    }
    errors.into_result()
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.params();
    let page = state.storage.list_samples(&params).await?;

    let total = page.total;
    let mut resources = Vec::with_capacity(page.len());
    for sample in page.items {
        resources.push(sample_resource(&state, sample).await?);
    }
    Ok(paginated(&Page::new(resources, total, &params)))
}

pub async fn store(
    State(state): State<AppState>,
    Json(payload): Json<SamplePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = payload.validate(true)?;
    let specimen = valid.sample_type.unwrap_or(SpecimenType::Blood);
    check_specimen_compatibility(&state, specimen, &valid.tests).await?;

    let mut sample = Sample::new(
        valid.accession_number.unwrap_or_default(),
        valid.patient_id.unwrap_or_default(),
        specimen,
        valid.collection_date.unwrap_or(Date::MIN),
        valid.collection_time.unwrap_or(Time::MIDNIGHT),
    )
    .with_priority(valid.priority.unwrap_or_default());
    sample.location = valid.location;
    sample.notes = valid.notes;

    let created = state.storage.insert_sample(sample, &valid.tests).await?;
    Ok((
        StatusCode::CREATED,
        data(sample_resource(&state, created).await?),
    ))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sample = state
        .storage
        .get_sample(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sample not found: {id}")))?;
    Ok(data(sample_resource(&state, sample).await?))
}

pub async fn show_by_accession(
    State(state): State<AppState>,
    Path(accession_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sample = state
        .storage
        .get_sample_by_accession(&accession_number)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Sample not found: {accession_number}"))
        })?;
    Ok(data(sample_resource(&state, sample).await?))
}

/// Metadata-only update; the test set is managed by the `/tests` routes.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SamplePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut sample = state
        .storage
        .get_sample(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sample not found: {id}")))?;

    let valid = payload.validate(false)?;
    if !valid.tests.is_empty() {
        return Err(ApiError::unprocessable(
            "The test set is managed via /samples/{id}/tests, not the sample update.",
        ));
    }

    if let Some(patient_id) = valid.patient_id {
        sample.patient_id = patient_id;
    }
    if let Some(accession_number) = valid.accession_number {
        sample.accession_number = accession_number;
    }
    if let Some(sample_type) = valid.sample_type {
        sample.sample_type = sample_type;
    }
    if let Some(collection_date) = valid.collection_date {
        sample.collection_date = collection_date;
    }
    if let Some(collection_time) = valid.collection_time {
        sample.collection_time = collection_time;
    }
    if let Some(priority) = valid.priority {
        sample.priority = priority;
    }
    if valid.location.is_some() {
        sample.location = valid.location;
    }
    if valid.notes.is_some() {
        sample.notes = valid.notes;
    }
    sample.touch();

    let updated = state.storage.update_sample(sample).await?;
    Ok(data(sample_resource(&state, updated).await?))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_sample(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The sample's attached tests with their work state.
pub async fn tests(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.storage.list_work_items(&id).await?;
    let mut attached = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(t) = attached_test(&state, item).await? {
            attached.push(t);
        }
    }
    Ok(data(attached))
}

#[derive(Debug, Deserialize)]
pub struct AttachTestsPayload {
    pub tests: Option<Vec<String>>,
}

pub async fn add_tests(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AttachTestsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let test_ids = payload.tests.unwrap_or_default();
    if test_ids.is_empty() {
        return Err(ValidationErrors::single(
            "tests",
            "The tests field is required.",
        ));
    }

    let sample = state
        .storage
        .get_sample(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sample not found: {id}")))?;
    check_specimen_compatibility(&state, sample.sample_type, &test_ids).await?;

    let items = state.storage.attach_tests(&id, &test_ids).await?;
    let mut attached = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(t) = attached_test(&state, item).await? {
            attached.push(t);
        }
    }
    Ok(data(attached))
}

#[derive(Debug, Deserialize)]
pub struct SyncTestsPayload {
    pub tests: Option<Vec<String>>,
    #[serde(default)]
    pub force: bool,
}

/// Wholesale replacement of the test set. Removals that would discard
/// recorded results are refused unless `force` is set.
pub async fn sync_tests(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SyncTestsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let test_ids = payload
        .tests
        .ok_or_else(|| ValidationErrors::single("tests", "The tests field is required."))?;

    let sample = state
        .storage
        .get_sample(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sample not found: {id}")))?;
    check_specimen_compatibility(&state, sample.sample_type, &test_ids).await?;

    let outcome = state
        .storage
        .sync_tests(&id, &test_ids, payload.force)
        .await?;

    let items = state.storage.list_work_items(&id).await?;
    let mut attached = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(t) = attached_test(&state, item).await? {
            attached.push(t);
        }
    }
    Ok(Json(json!({ "data": { "outcome": outcome, "tests": attached } })))
}

#[derive(Debug, Deserialize)]
pub struct WorkItemPayload {
    pub status: Option<String>,
    pub results: Option<IndexMap<String, String>>,
    pub notes: Option<String>,
}

/// Update one work item: status transition, result payload, notes.
pub async fn update_test(
    State(state): State<AppState>,
    Path((id, test_id)): Path<(String, String)>,
    Json(payload): Json<WorkItemPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut change = WorkItemChange::new();
    if let Some(raw) = &payload.status {
        let status = raw.parse::<WorkStatus>().map_err(|_| {
            ValidationErrors::single(
                "status",
                "The status must be Pending, In Progress, Completed, or Cancelled.",
            )
        })?;
        change = change.with_status(status);
    }
    if let Some(results) = payload.results {
        change = change.with_results(results);
    }
    if let Some(notes) = payload.notes {
        change = change.with_notes(notes);
    }

    let item = state.storage.update_work_item(&id, &test_id, change).await?;
    let attached = attached_test(&state, &item)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Test not found: {test_id}")))?;
    Ok(data(attached))
}

#[derive(Debug, Deserialize, Default)]
pub struct DetachQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn detach_test(
    State(state): State<AppState>,
    Path((id, test_id)): Path<(String, String)>,
    Query(query): Query<DetachQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.detach_test(&id, &test_id, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}
