//! # openlims-report
//!
//! Report composition and rendering: resolve one accession number into a
//! paginated [`ReportDocument`], then render the same model as JSON (serde),
//! HTML (screen and print), or PDF.
//!
//! Pagination is fixed, not flow-based: the first page carries the lab
//! header, the patient/sample block, and the first test; every further test
//! opens its own page.

mod compose;
mod html;
mod model;
mod pdf;

pub use compose::{ReportError, compose_report};
pub use html::render_html;
pub use model::{
    EMPTY_CELL, PLACEHOLDER, ParameterRow, PatientInfo, ReportDocument, ReportPage, SampleInfo,
    TestBlock,
};
pub use pdf::render_pdf;
