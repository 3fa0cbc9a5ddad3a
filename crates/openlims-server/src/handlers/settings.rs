use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;

use openlims_core::LabSettings;

use crate::api::{ApiError, ValidationErrors, data};
use crate::server::AppState;

/// The branding record; default (empty) branding when never configured.
pub async fn show(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let settings = state.storage.get_settings().await?.unwrap_or_default();
    Ok(data(settings))
}

#[derive(Debug, Deserialize)]
pub struct SettingsPayload {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo: Option<String>,
}

/// Create-or-replace the branding record.
pub async fn update(
    State(state): State<AppState>,
    Json(payload): Json<SettingsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = ValidationErrors::new();
    let require = |errors: &mut ValidationErrors, field: &str, value: &Option<String>| {
        if value.as_deref().map(str::trim).unwrap_or("").is_empty() {
            errors.add(field, format!("The {field} field is required."));
        }
    };
    require(&mut errors, "name", &payload.name);
    require(&mut errors, "address", &payload.address);
    require(&mut errors, "phone", &payload.phone);
    require(&mut errors, "email", &payload.email);
    if let Some(email) = &payload.email {
        if !email.is_empty() && !email.contains('@') {
            errors.add("email", "The email must be a valid email address.");
        }
    }
    errors.into_result()?;

    let mut settings = LabSettings::new(
        payload.name.unwrap_or_default(),
        payload.address.unwrap_or_default(),
        payload.phone.unwrap_or_default(),
        payload.email.unwrap_or_default(),
    );
    settings.logo = payload.logo;

    let saved = state.storage.put_settings(settings).await?;
    Ok(data(saved))
}
