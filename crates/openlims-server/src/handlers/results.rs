//! Result retrieval and recording, keyed by (sample, test).
//!
//! These endpoints are views over the work item rows: saving here replaces
//! the payload without touching status, and reading here joins in the
//! sample, patient, and test for the results screens.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use openlims_core::{Patient, ResultPayload, Sample, TestDefinition};

use crate::api::{ApiError, ValidationErrors, data};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct SampleResultResource {
    pub sample_id: String,
    pub test_id: String,
    pub results: ResultPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<Patient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<TestDefinition>,
}

async fn joined_resource(
    state: &AppState,
    sample_id: &str,
    test_id: &str,
    results: ResultPayload,
) -> Result<SampleResultResource, ApiError> {
    let sample = state.storage.get_sample(sample_id).await?;
    let patient = match &sample {
        Some(s) => state.storage.get_patient(&s.patient_id).await?,
        None => None,
    };
    let test = state.storage.get_test(test_id).await?;
    Ok(SampleResultResource {
        sample_id: sample_id.to_string(),
        test_id: test_id.to_string(),
        results,
        sample,
        patient,
        test,
    })
}

/// All recorded results, joined with sample, patient, and test.
pub async fn index(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let recorded = state.storage.list_recorded_results().await?;
    let mut resources = Vec::with_capacity(recorded.len());
    for r in recorded {
        resources.push(joined_resource(&state, &r.sample_id, &r.test_id, r.results).await?);
    }
    Ok(data(resources))
}

#[derive(Debug, Deserialize)]
pub struct StoreResultsPayload {
    pub sample_id: Option<String>,
    pub test_id: Option<String>,
    pub results: Option<IndexMap<String, String>>,
}

/// Upsert: replaces the payload for the pair, creating the work item when
/// the test was not attached yet. Idempotent; never changes status.
pub async fn store(
    State(state): State<AppState>,
    Json(payload): Json<StoreResultsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = ValidationErrors::new();
    if payload.sample_id.is_none() {
        errors.add("sample_id", "The sample id field is required.");
    }
    if payload.test_id.is_none() {
        errors.add("test_id", "The test id field is required.");
    }
    if payload.results.is_none() {
        errors.add("results", "The results field is required.");
    }
    errors.into_result()?;

    let sample_id = payload.sample_id.unwrap_or_default();
    let test_id = payload.test_id.unwrap_or_default();
    let item = state
        .storage
        .save_results(&sample_id, &test_id, payload.results.unwrap_or_default())
        .await?;

    let resource = joined_resource(
        &state,
        &sample_id,
        &test_id,
        item.results.unwrap_or_default(),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Sample results saved successfully.",
            "data": resource,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateResultsPayload {
    pub test_id: Option<String>,
    pub results: Option<IndexMap<String, String>>,
}

/// Update an existing record; 404 when nothing was recorded for the pair.
pub async fn update(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
    Json(payload): Json<UpdateResultsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = ValidationErrors::new();
    if payload.test_id.is_none() {
        errors.add("test_id", "The test id field is required.");
    }
    if payload.results.is_none() {
        errors.add("results", "The results field is required.");
    }
    errors.into_result()?;

    let test_id = payload.test_id.unwrap_or_default();
    let existing = state.storage.get_work_item(&sample_id, &test_id).await?;
    if !existing.is_some_and(|item| item.has_recorded_results()) {
        return Err(ApiError::not_found(
            "No results found for this sample and test.",
        ));
    }

    let item = state
        .storage
        .save_results(&sample_id, &test_id, payload.results.unwrap_or_default())
        .await?;
    let resource = joined_resource(
        &state,
        &sample_id,
        &test_id,
        item.results.unwrap_or_default(),
    )
    .await?;
    Ok(Json(json!({
        "message": "Sample results updated successfully.",
        "data": resource,
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Path((sample_id, test_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.storage.get_work_item(&sample_id, &test_id).await?;
    let results = item
        .filter(|i| i.has_recorded_results())
        .and_then(|i| i.results)
        .ok_or_else(|| ApiError::not_found("No results found for this sample and test."))?;

    Ok(data(
        joined_resource(&state, &sample_id, &test_id, results).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct BySampleQuery {
    pub sample_id: Option<String>,
}

/// All recorded results for one sample, for screen prefill.
pub async fn by_sample(
    State(state): State<AppState>,
    Query(query): Query<BySampleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sample_id = query
        .sample_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("sample_id is required"))?;

    if state.storage.get_sample(&sample_id).await?.is_none() {
        return Ok(data(Vec::<SampleResultResource>::new()));
    }

    let items = state.storage.list_work_items(&sample_id).await?;
    let mut resources = Vec::new();
    for item in items {
        if item.has_recorded_results() {
            let test = state.storage.get_test(&item.test_id).await?;
            resources.push(SampleResultResource {
                sample_id: sample_id.clone(),
                test_id: item.test_id.clone(),
                results: item.results.unwrap_or_default(),
                sample: None,
                patient: None,
                test,
            });
        }
    }
    Ok(data(resources))
}
