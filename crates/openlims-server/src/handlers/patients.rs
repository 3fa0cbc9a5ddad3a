use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use openlims_core::{Gender, Patient};
use openlims_storage::Page;

use super::PageQuery;
use super::samples::{SampleResource, sample_resource};
use crate::api::{ApiError, ValidationErrors, data, paginated};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct PatientResource {
    #[serde(flatten)]
    pub patient: Patient,
    pub samples_count: usize,
}

async fn resource(state: &AppState, patient: Patient) -> Result<PatientResource, ApiError> {
    let samples_count = state
        .storage
        .list_samples_for_patient(&patient.id)
        .await?
        .len();
    Ok(PatientResource {
        patient,
        samples_count,
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct PatientPayload {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub doctor: Option<String>,
}

struct ValidatedPatient {
    name: Option<String>,
    age: Option<u32>,
    gender: Option<Gender>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    doctor: Option<String>,
}

impl PatientPayload {
    fn validate(self, require_name: bool) -> Result<ValidatedPatient, ApiError> {
        let mut errors = ValidationErrors::new();

        match (&self.name, require_name) {
            (None, true) => errors.add("name", "The name field is required."),
            (Some(name), _) if name.trim().is_empty() => {
                errors.add("name", "The name field is required.")
            }
            (Some(name), _) if name.len() > 255 => {
                errors.add("name", "The name may not be greater than 255 characters.")
            }
            _ => {}
        }

        let age = match self.age {
            Some(age) if !(0..=150).contains(&age) => {
                errors.add("age", "The age must be between 0 and 150.");
                None
            }
            Some(age) => Some(age as u32),
            None => None,
        };

        let gender = match &self.gender {
            Some(raw) => match raw.parse::<Gender>() {
                Ok(g) => Some(g),
                Err(_) => {
                    errors.add("gender", "The gender must be Male, Female, or Other.");
                    None
                }
            },
            None => None,
        };

        if let Some(phone) = &self.phone {
            if phone.len() > 20 {
                errors.add("phone", "The phone may not be greater than 20 characters.");
            }
        }
        if let Some(email) = &self.email {
            if !email.contains('@') || email.len() > 255 {
                errors.add("email", "The email must be a valid email address.");
            }
        }
        if let Some(address) = &self.address {
            if address.len() > 500 {
                errors.add("address", "The address may not be greater than 500 characters.");
            }
        }

        errors.into_result()?;
        Ok(ValidatedPatient {
            name: self.name,
            age,
            gender,
            phone: self.phone,
            email: self.email,
            address: self.address,
            doctor: self.doctor,
        })
    }
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = query.params();
    let page = state.storage.list_patients(&params).await?;

    let mut resources = Vec::with_capacity(page.len());
    let total = page.total;
    for patient in page.items {
        resources.push(resource(&state, patient).await?);
    }
    Ok(paginated(&Page::new(resources, total, &params)))
}

pub async fn store(
    State(state): State<AppState>,
    Json(payload): Json<PatientPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = payload.validate(true)?;

    let mut patient = Patient::new(valid.name.unwrap_or_default());
    patient.age = valid.age;
    patient.gender = valid.gender;
    patient.phone = valid.phone;
    patient.email = valid.email;
    patient.address = valid.address;
    patient.doctor = valid.doctor;

    let created = state.storage.insert_patient(patient).await?;
    Ok((StatusCode::CREATED, data(resource(&state, created).await?)))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state
        .storage
        .get_patient(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Patient not found: {id}")))?;
    Ok(data(resource(&state, patient).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PatientPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut patient = state
        .storage
        .get_patient(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Patient not found: {id}")))?;

    let valid = payload.validate(false)?;
    if let Some(name) = valid.name {
        patient.name = name;
    }
    if valid.age.is_some() {
        patient.age = valid.age;
    }
    if valid.gender.is_some() {
        patient.gender = valid.gender;
    }
    if valid.phone.is_some() {
        patient.phone = valid.phone;
    }
    if valid.email.is_some() {
        patient.email = valid.email;
    }
    if valid.address.is_some() {
        patient.address = valid.address;
    }
    if valid.doctor.is_some() {
        patient.doctor = valid.doctor;
    }
    patient.touch();

    let updated = state.storage.update_patient(patient).await?;
    Ok(data(resource(&state, updated).await?))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_patient(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;

    let matches = state.storage.search_patients(&name).await?;
    let mut resources = Vec::with_capacity(matches.len());
    for patient in matches {
        resources.push(resource(&state, patient).await?);
    }
    Ok(data(resources))
}

/// All samples for one patient, with their attached tests.
pub async fn samples(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.storage.get_patient(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("Patient not found: {id}")));
    }

    let samples = state.storage.list_samples_for_patient(&id).await?;
    let mut resources: Vec<SampleResource> = Vec::with_capacity(samples.len());
    for sample in samples {
        resources.push(sample_resource(&state, sample).await?);
    }
    Ok(data(resources))
}
