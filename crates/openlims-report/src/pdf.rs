//! PDF rendering via `printpdf`, built-in Helvetica faces only. A4 portrait,
//! one PDF page per report page, simple descending y-cursor layout.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::io::BufWriter;

use crate::compose::ReportError;
use crate::model::{ReportDocument, ReportPage};

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: Mm = Mm(20.0);
const TOP: Mm = Mm(280.0);
const FOOTER_Y: Mm = Mm(12.0);

// Column x positions for Parameter | Value | Unit | Normal Range.
const COLUMNS: [Mm; 4] = [Mm(20.0), Mm(80.0), Mm(120.0), Mm(155.0)];

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Renders the document to PDF bytes.
pub fn render_pdf(doc: &ReportDocument) -> Result<Vec<u8>, ReportError> {
    let title = format!("Report {}", doc.accession_number);
    let (pdf, first_page, first_layer) = PdfDocument::new(&title, PAGE_WIDTH, PAGE_HEIGHT, "Page");

    let fonts = Fonts {
        regular: pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Render(format!("font error: {e}")))?,
        bold: pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Render(format!("font error: {e}")))?,
    };

    for (i, page) in doc.pages.iter().enumerate() {
        let layer = if i == 0 {
            pdf.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_idx, layer_idx) = pdf.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Page");
            pdf.get_page(page_idx).get_layer(layer_idx)
        };
        render_page(&layer, doc, page, &fonts);
    }

    let mut buf = BufWriter::new(Vec::new());
    pdf.save(&mut buf)
        .map_err(|e| ReportError::Render(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Render(format!("buffer error: {e}")))
}

fn render_page(layer: &PdfLayerReference, doc: &ReportDocument, page: &ReportPage, fonts: &Fonts) {
    let mut y = TOP;

    // Lab header, every page.
    layer.use_text(&doc.branding.name, 14.0, MARGIN_LEFT, y, &fonts.bold);
    layer.use_text(
        format!("Report Date: {}", doc.report_date),
        9.0,
        Mm(140.0),
        y,
        &fonts.regular,
    );
    y -= Mm(5.0);
    layer.use_text(&doc.branding.address, 9.0, MARGIN_LEFT, y, &fonts.regular);
    layer.use_text(
        format!("Accession #: {}", doc.accession_number),
        9.0,
        Mm(140.0),
        y,
        &fonts.regular,
    );
    y -= Mm(4.5);
    layer.use_text(
        format!("Phone: {}", doc.branding.phone),
        9.0,
        MARGIN_LEFT,
        y,
        &fonts.regular,
    );
    y -= Mm(4.5);
    layer.use_text(
        format!("Email: {}", doc.branding.email),
        9.0,
        MARGIN_LEFT,
        y,
        &fonts.regular,
    );
    y -= Mm(10.0);

    if page.number == 1 {
        layer.use_text(
            "Patient & Sample Information",
            12.0,
            MARGIN_LEFT,
            y,
            &fonts.bold,
        );
        y -= Mm(6.0);
        let lines = [
            format!("Patient Name: {}", doc.patient.name),
            format!("Phone: {}", doc.patient.phone),
            format!("Gender: {}", doc.patient.gender),
            format!("Age: {}", doc.patient.age),
            format!("Doctor: {}", doc.patient.doctor),
            format!("Sample Type: {}", doc.sample.sample_type),
            format!("Collection Date: {}", doc.sample.collection_date),
            format!("Collection Time: {}", doc.sample.collection_time),
            format!("Priority: {}", doc.sample.priority),
        ];
        for line in lines {
            layer.use_text(line, 9.0, MARGIN_LEFT, y, &fonts.regular);
            y -= Mm(4.5);
        }
        y -= Mm(4.0);
    }

    match &page.test {
        Some(block) => {
            let specimen = if block.specimen_types.is_empty() {
                String::new()
            } else {
                format!(" ({})", block.specimen_types.join(", "))
            };
            layer.use_text(
                format!("Test: {}{specimen}", block.test_name),
                12.0,
                MARGIN_LEFT,
                y,
                &fonts.bold,
            );
            y -= Mm(6.0);

            for (x, heading) in COLUMNS
                .iter()
                .zip(["Parameter", "Value", "Unit", "Normal Range"])
            {
                layer.use_text(heading, 9.0, *x, y, &fonts.bold);
            }
            y -= Mm(5.0);

            if block.rows.is_empty() {
                layer.use_text(
                    "No parameters available for this test.",
                    9.0,
                    MARGIN_LEFT,
                    y,
                    &fonts.regular,
                );
                y -= Mm(4.5);
            } else {
                for row in &block.rows {
                    let cells = [
                        row.parameter.as_str(),
                        row.value.as_str(),
                        row.unit.as_str(),
                        row.normal_range.as_str(),
                    ];
                    for (x, cell) in COLUMNS.iter().zip(cells) {
                        layer.use_text(cell, 9.0, *x, y, &fonts.regular);
                    }
                    y -= Mm(4.5);
                }
            }

            if let Some(notes) = &block.notes {
                y -= Mm(2.0);
                layer.use_text(format!("Notes: {notes}"), 8.0, MARGIN_LEFT, y, &fonts.regular);
            }
        }
        None => {
            layer.use_text(
                "No tests ordered for this sample.",
                10.0,
                MARGIN_LEFT,
                y,
                &fonts.regular,
            );
        }
    }

    if page.number == 1 {
        layer.use_text("Lab Technician: ________________", 9.0, MARGIN_LEFT, Mm(30.0), &fonts.regular);
        layer.use_text("Doctor: ________________", 9.0, Mm(120.0), Mm(30.0), &fonts.regular);
    }

    // Footer, every page.
    layer.use_text(doc.footer_line(), 8.0, MARGIN_LEFT, FOOTER_Y, &fonts.regular);
    layer.use_text(
        format!("Page {} of {}", page.number, doc.total_pages()),
        8.0,
        Mm(170.0),
        FOOTER_Y,
        &fonts.regular,
    );
}
