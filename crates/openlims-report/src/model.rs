//! The report document model.
//!
//! One [`ReportDocument`] drives all three output forms (JSON, HTML, PDF).
//! Placeholders are resolved at composition time so renderers never diverge
//! on content: a missing value is already an empty string, a missing unit
//! already an em dash, a missing patient field already "N/A".

use serde::Serialize;

use openlims_core::LabSettings;

pub const PLACEHOLDER: &str = "N/A";
pub const EMPTY_CELL: &str = "\u{2014}"; // em dash

/// One fully resolved, paginated report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub branding: LabSettings,
    /// Date the report was generated, `YYYY-MM-DD`.
    pub report_date: String,
    pub copyright_year: i32,
    pub accession_number: String,
    pub patient: PatientInfo,
    pub sample: SampleInfo,
    pub pages: Vec<ReportPage>,
}

impl ReportDocument {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    /// The footer line repeated on every page.
    pub fn footer_line(&self) -> String {
        format!(
            "{} \u{a9} {} | {} | Phone: {}",
            self.branding.name, self.copyright_year, self.branding.address, self.branding.phone
        )
    }
}

/// Patient block shown on the first page.
#[derive(Debug, Clone, Serialize)]
pub struct PatientInfo {
    pub name: String,
    pub phone: String,
    pub gender: String,
    pub age: String,
    pub doctor: String,
}

/// Sample block shown on the first page.
#[derive(Debug, Clone, Serialize)]
pub struct SampleInfo {
    pub sample_type: String,
    pub collection_date: String,
    pub collection_time: String,
    pub priority: String,
    pub location: String,
}

/// One printed page. The first page also carries the patient/sample block;
/// every page carries the lab header and the footer.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPage {
    /// 1-based page number.
    pub number: usize,
    /// Absent only for a sample with no ordered tests.
    pub test: Option<TestBlock>,
}

/// One test's section: a four-column table in parameter declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct TestBlock {
    pub test_name: String,
    pub test_code: String,
    pub specimen_types: Vec<String>,
    pub rows: Vec<ParameterRow>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterRow {
    pub parameter: String,
    /// Entered value; empty string when nothing was recorded.
    pub value: String,
    pub unit: String,
    pub normal_range: String,
}
