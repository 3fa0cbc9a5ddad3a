//! HTML rendering: one document serves both the on-screen preview and the
//! browser print view. The print stylesheet pins the page-break rule — every
//! `.report-page` after the first starts a fresh printed page.

use std::fmt::Write as _;

use crate::model::{ReportDocument, ReportPage};

const STYLE: &str = r#"
body { font-family: Helvetica, Arial, sans-serif; font-size: 10pt; color: #222; margin: 0; }
.report-wrapper { max-width: 900px; margin: 0 auto; background: #fff; }
.report-page { padding: 24px; }
.report-header { display: flex; justify-content: space-between; border-bottom: 1px solid #ccc; padding-bottom: 8px; margin-bottom: 12px; }
.report-header .lab-name { font-size: 14pt; font-weight: bold; }
.report-header img.logo { width: 32px; height: 32px; object-fit: contain; margin-right: 8px; }
.report-meta { text-align: right; }
.section-title { font-size: 12pt; font-weight: bold; margin: 10px 0 6px 0; }
table { width: 100%; border-collapse: collapse; font-size: 9pt; margin-bottom: 8px; }
th, td { border: 1px solid #bbb; padding: 3px 5px; text-align: left; }
th { background: #f3f4f6; }
.notes { font-size: 9pt; margin-top: 2px; }
.signature { display: flex; justify-content: space-between; margin-top: 24px; }
.signature .line { width: 120px; border-bottom: 1px solid #888; height: 18px; margin-top: 8px; }
.report-footer { display: flex; justify-content: space-between; border-top: 1px solid #ccc; padding-top: 4px; margin-top: 16px; font-size: 9pt; color: #888; }
@media print {
  @page { size: A4 portrait; margin: 15mm 10mm 18mm 10mm; }
  .report-page { page-break-after: always; break-after: page; padding: 0; }
  .report-page:last-child { page-break-after: avoid; break-after: avoid; }
  .no-print { display: none !important; }
}
"#;

/// Renders the document as a self-contained HTML page.
pub fn render_html(doc: &ReportDocument) -> String {
    let mut out = String::with_capacity(4096);
    let _ = write!(
        out,
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Report {}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<div class=\"report-wrapper\">\n",
        escape(&doc.accession_number)
    );

    for page in &doc.pages {
        render_page(&mut out, doc, page);
    }

    out.push_str("</div>\n</body>\n</html>\n");
    out
}

fn render_page(out: &mut String, doc: &ReportDocument, page: &ReportPage) {
    out.push_str("<section class=\"report-page\">\n");

    // Lab header on every page.
    out.push_str("<div class=\"report-header\">\n<div>\n");
    if let Some(logo) = &doc.branding.logo {
        let _ = write!(out, "<img class=\"logo\" src=\"{}\" alt=\"\">", escape(logo));
    }
    let _ = write!(
        out,
        "<div class=\"lab-name\">{}</div><div>{}</div><div>Phone: {}</div><div>Email: {}</div>\n",
        escape(&doc.branding.name),
        escape(&doc.branding.address),
        escape(&doc.branding.phone),
        escape(&doc.branding.email),
    );
    let _ = write!(
        out,
        "</div>\n<div class=\"report-meta\"><div>Report Date: {}</div><div>Accession #: {}</div></div>\n</div>\n",
        escape(&doc.report_date),
        escape(&doc.accession_number),
    );

    // Patient and sample block on the first page only.
    if page.number == 1 {
        let _ = write!(
            out,
            "<div class=\"patient-info\">\n<div class=\"section-title\">Patient &amp; Sample Information</div>\n\
             <div>Patient Name: {}</div><div>Phone: {}</div><div>Gender: {}</div><div>Age: {}</div><div>Doctor: {}</div>\n\
             <div>Sample Type: {}</div><div>Collection Date: {}</div><div>Collection Time: {}</div><div>Priority: {}</div>\n</div>\n",
            escape(&doc.patient.name),
            escape(&doc.patient.phone),
            escape(&doc.patient.gender),
            escape(&doc.patient.age),
            escape(&doc.patient.doctor),
            escape(&doc.sample.sample_type),
            escape(&doc.sample.collection_date),
            escape(&doc.sample.collection_time),
            escape(&doc.sample.priority),
        );
    }

    match &page.test {
        Some(block) => {
            let specimen = if block.specimen_types.is_empty() {
                String::new()
            } else {
                format!(" ({})", escape(&block.specimen_types.join(", ")))
            };
            let _ = write!(
                out,
                "<div class=\"section-title\">Test: {}{specimen}</div>\n",
                escape(&block.test_name)
            );
            out.push_str(
                "<table>\n<tr><th>Parameter</th><th>Value</th><th>Unit</th><th>Normal Range</th></tr>\n",
            );
            if block.rows.is_empty() {
                out.push_str(
                    "<tr><td colspan=\"4\">No parameters available for this test.</td></tr>\n",
                );
            } else {
                for row in &block.rows {
                    let _ = write!(
                        out,
                        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                        escape(&row.parameter),
                        escape(&row.value),
                        escape(&row.unit),
                        escape(&row.normal_range),
                    );
                }
            }
            out.push_str("</table>\n");
            if let Some(notes) = &block.notes {
                let _ = write!(out, "<div class=\"notes\">Notes: {}</div>\n", escape(notes));
            }
        }
        None => {
            out.push_str("<div class=\"section-title\">No tests ordered for this sample.</div>\n");
        }
    }

    if page.number == 1 {
        out.push_str(
            "<div class=\"signature\">\n<div>Lab Technician:<div class=\"line\"></div></div>\n\
             <div>Doctor:<div class=\"line\"></div></div>\n</div>\n",
        );
    }

    let _ = write!(
        out,
        "<div class=\"report-footer\"><span>{}</span><span>Page {} of {}</span></div>\n",
        escape(&doc.footer_line()),
        page.number,
        doc.total_pages(),
    );
    out.push_str("</section>\n");
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
