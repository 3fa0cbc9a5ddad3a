use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use openlims_core::{SpecimenType, TestDefinition, TestParameter, TestStatus};
use openlims_storage::TestFilter;

use crate::api::{ApiError, ValidationErrors, data};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct TestResource {
    #[serde(flatten)]
    pub test: TestDefinition,
    pub samples_count: usize,
}

async fn resource(state: &AppState, test: TestDefinition) -> Result<TestResource, ApiError> {
    let samples_count = state.storage.count_samples_for_test(&test.id).await?;
    Ok(TestResource {
        test,
        samples_count,
    })
}

/// A declared parameter, accepted either as a bare name or as a full object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParameterPayload {
    Full {
        name: String,
        units: Option<String>,
        normal_range: Option<String>,
    },
    Name(String),
}

impl From<ParameterPayload> for TestParameter {
    fn from(payload: ParameterPayload) -> Self {
        match payload {
            ParameterPayload::Name(name) => TestParameter::new(name),
            ParameterPayload::Full {
                name,
                units,
                normal_range,
            } => TestParameter {
                name,
                units,
                normal_range,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TestPayload {
    pub code: Option<String>,
    pub name: Option<String>,
    pub sample_types: Option<Vec<String>>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<String>,
    pub status: Option<String>,
    pub parameters: Option<Vec<ParameterPayload>>,
}

struct ValidatedTest {
    code: Option<String>,
    name: Option<String>,
    sample_types: Option<Vec<SpecimenType>>,
    category: Option<String>,
    department: Option<String>,
    price: Option<f64>,
    duration: Option<String>,
    status: Option<TestStatus>,
    parameters: Option<Vec<TestParameter>>,
}

impl TestPayload {
    fn validate(self, creating: bool) -> Result<ValidatedTest, ApiError> {
        let mut errors = ValidationErrors::new();

        let require = |errors: &mut ValidationErrors, field: &str, value: &Option<String>| {
            if creating && value.as_deref().map(str::trim).unwrap_or("").is_empty() {
                errors.add(field, format!("The {field} field is required."));
            }
        };
        require(&mut errors, "code", &self.code);
        require(&mut errors, "name", &self.name);
        require(&mut errors, "category", &self.category);
        require(&mut errors, "department", &self.department);
        require(&mut errors, "duration", &self.duration);

        let sample_types = match &self.sample_types {
            Some(raw) => {
                if raw.is_empty() {
                    errors.add("sample_types", "At least one sample type is required.");
                }
                let mut parsed = Vec::with_capacity(raw.len());
                for (i, value) in raw.iter().enumerate() {
                    match value.parse::<SpecimenType>() {
                        Ok(st) => parsed.push(st),
                        Err(_) => errors.add(
                            format!("sample_types.{i}"),
                            "The sample type must be Blood, Urine, Stool, Sputum, or Tissue.",
                        ),
                    }
                }
                Some(parsed)
            }
            None => {
                if creating {
                    errors.add("sample_types", "The sample types field is required.");
                }
                None
            }
        };

        if creating && self.price.is_none() {
            errors.add("price", "The price field is required.");
        }
        if let Some(price) = self.price {
            if price < 0.0 || !price.is_finite() {
                errors.add("price", "The price must be at least 0.");
            }
        }

        let status = match &self.status {
            Some(raw) => match raw.parse::<TestStatus>() {
                Ok(s) => Some(s),
                Err(_) => {
                    errors.add("status", "The status must be Active or Inactive.");
                    None
                }
            },
            None => None,
        };

        let parameters = match self.parameters {
            Some(raw) => {
                if raw.is_empty() {
                    errors.add("parameters", "At least one parameter is required.");
                }
                Some(raw.into_iter().map(TestParameter::from).collect())
            }
            None => {
                if creating {
                    errors.add("parameters", "The parameters field is required.");
                }
                None
            }
        };

        errors.into_result()?;
        Ok(ValidatedTest {
            code: self.code,
            name: self.name,
            sample_types,
            category: self.category,
            department: self.department,
            price: self.price,
            duration: self.duration,
            status,
            parameters,
        })
    }
}

/// `GET /api/tests` query filters.
#[derive(Debug, Deserialize, Default)]
pub struct TestListQuery {
    pub sample_type: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub usage: Option<String>,
}

impl TestListQuery {
    fn filter(self) -> Result<TestFilter, ApiError> {
        let mut errors = ValidationErrors::new();
        let mut filter = TestFilter::new();

        if let Some(raw) = self.sample_type {
            match raw.parse::<SpecimenType>() {
                Ok(st) => filter = filter.with_sample_type(st),
                Err(_) => errors.add("sample_type", "Unknown sample type."),
            }
        }
        if let Some(category) = self.category {
            filter = filter.with_category(category);
        }
        if let Some(department) = self.department {
            filter = filter.with_department(department);
        }
        if let Some(raw) = self.status {
            match raw.parse::<TestStatus>() {
                Ok(s) => filter = filter.with_status(s),
                Err(_) => errors.add("status", "The status must be Active or Inactive."),
            }
        }
        if self.usage.as_deref() == Some("active") {
            filter = filter.with_in_use(true);
        }

        errors.into_result()?;
        Ok(filter)
    }
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<TestListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.filter()?;
    let tests = state.storage.list_tests(&filter).await?;

    let mut resources = Vec::with_capacity(tests.len());
    for test in tests {
        resources.push(resource(&state, test).await?);
    }
    Ok(data(resources))
}

pub async fn store(
    State(state): State<AppState>,
    Json(payload): Json<TestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let valid = payload.validate(true)?;

    let test = TestDefinition::new(
        valid.code.unwrap_or_default(),
        valid.name.unwrap_or_default(),
    )
    .with_sample_types(valid.sample_types.unwrap_or_default())
    .with_category(valid.category.unwrap_or_default())
    .with_department(valid.department.unwrap_or_default())
    .with_price(valid.price.unwrap_or_default())
    .with_duration(valid.duration.unwrap_or_default())
    .with_status(valid.status.unwrap_or_default())
    .with_parameters(valid.parameters.unwrap_or_default());

    let created = state.storage.insert_test(test).await?;
    Ok((StatusCode::CREATED, data(resource(&state, created).await?)))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let test = state
        .storage
        .get_test(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Test not found: {id}")))?;
    Ok(data(resource(&state, test).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut test = state
        .storage
        .get_test(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Test not found: {id}")))?;

    let valid = payload.validate(false)?;
    if let Some(code) = valid.code {
        test.code = code;
    }
    if let Some(name) = valid.name {
        test.name = name;
    }
    if let Some(sample_types) = valid.sample_types {
        test.sample_types = sample_types;
    }
    if let Some(category) = valid.category {
        test.category = category;
    }
    if let Some(department) = valid.department {
        test.department = department;
    }
    if let Some(price) = valid.price {
        test.price = price;
    }
    if let Some(duration) = valid.duration {
        test.duration = duration;
    }
    if let Some(status) = valid.status {
        test.status = status;
    }
    if let Some(parameters) = valid.parameters {
        test.parameters = parameters;
    }
    test.touch();

    let updated = state.storage.update_test(test).await?;
    Ok(data(resource(&state, updated).await?))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_test(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
