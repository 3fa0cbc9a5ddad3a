//! Report endpoints: the composed document as JSON, print-ready HTML, or a
//! downloadable PDF. All three render the same composed model.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use openlims_report::{compose_report, render_html, render_pdf};

use crate::api::{ApiError, data};
use crate::server::AppState;

pub async fn show(
    State(state): State<AppState>,
    Path(accession_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = compose_report(state.storage.as_ref(), &accession_number).await?;
    Ok(data(doc))
}

pub async fn html(
    State(state): State<AppState>,
    Path(accession_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = compose_report(state.storage.as_ref(), &accession_number).await?;
    let body = render_html(&doc);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    ))
}

pub async fn pdf(
    State(state): State<AppState>,
    Path(accession_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = compose_report(state.storage.as_ref(), &accession_number).await?;
    let bytes = render_pdf(&doc)?;
    let disposition = format!("attachment; filename=\"report-{accession_number}.pdf\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
