//! Output workbook.
//!
//! Results are first laid out as [`SheetData`] (header plus one row per
//! email), then written either as a single `.xlsx` workbook or as one CSV
//! file per sheet.

use std::path::{Path, PathBuf};

use mailsort_core::ProcessedEmail;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use tracing::info;

use super::ExportError;

pub const CLASSIFICATION_SHEET: &str = "email-classification";
pub const ORDER_STATUS_SHEET: &str = "order-status";
pub const RESPONSE_SHEET: &str = "response";

/// Longest sheet name a workbook accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Longest text a single cell holds.
const MAX_CELL_CHARS: usize = 32_767;

/// Characters a sheet name cannot contain.
const ILLEGAL_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// One cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    /// Text rendering, used for CSV output.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.to_string(),
        }
    }
}

impl From<String> for Cell {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<f64> for Cell {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

/// A sheet ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetData {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

impl SheetData {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Lay out the three output sheets, one row per email in input order.
#[must_use]
pub fn build_sheets(results: &[ProcessedEmail]) -> Vec<SheetData> {
    vec![
        classification_sheet(results),
        order_status_sheet(results),
        response_sheet(results),
    ]
}

fn classification_sheet(results: &[ProcessedEmail]) -> SheetData {
    SheetData {
        name: CLASSIFICATION_SHEET,
        headers: &["email ID", "category", "confidence", "source"],
        rows: results
            .iter()
            .map(|result| {
                vec![
                    result.email_id.as_str().into(),
                    result.classification.category.label().into(),
                    f64::from(result.classification.confidence).into(),
                    result.classification.source.to_string().into(),
                ]
            })
            .collect(),
    }
}

fn order_status_sheet(results: &[ProcessedEmail]) -> SheetData {
    SheetData {
        name: ORDER_STATUS_SHEET,
        headers: &[
            "email ID",
            "category",
            "order lines",
            "items created",
            "order total",
            "status",
            "errors",
        ],
        rows: results
            .iter()
            .map(|result| {
                let order = result.order.as_ref();
                vec![
                    result.email_id.as_str().into(),
                    result.classification.category.label().into(),
                    order.map(|o| o.lines_cell()).unwrap_or_default().into(),
                    f64::from(order.map_or(0, |o| o.items_created())).into(),
                    order
                        .and_then(|o| o.total().to_f64())
                        .unwrap_or_default()
                        .into(),
                    result.order_outcome().to_string().into(),
                    order.map(|o| o.errors_cell()).unwrap_or_default().into(),
                ]
            })
            .collect(),
    }
}

fn response_sheet(results: &[ProcessedEmail]) -> SheetData {
    SheetData {
        name: RESPONSE_SHEET,
        headers: &["email ID", "category", "response"],
        rows: results
            .iter()
            .map(|result| {
                vec![
                    result.email_id.as_str().into(),
                    result.classification.category.label().into(),
                    result.response.as_str().into(),
                ]
            })
            .collect(),
    }
}

/// Validate a sheet name: 1 to 31 characters, none of `[]:*?/\`.
///
/// # Errors
///
/// Returns `ExportError::SheetName` describing the problem.
pub fn validate_sheet_name(name: &str) -> Result<(), ExportError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_SHEET_NAME_LEN {
        return Err(ExportError::SheetName(format!(
            "{name:?} must be 1 to {MAX_SHEET_NAME_LEN} characters"
        )));
    }
    if name.contains(ILLEGAL_SHEET_CHARS) {
        return Err(ExportError::SheetName(format!(
            "{name:?} contains a character that is not allowed"
        )));
    }
    Ok(())
}

/// Build an `.xlsx` workbook with a bold header row on each sheet.
///
/// # Errors
///
/// Returns an error if a sheet name is invalid or a cell cannot be written.
fn build_workbook(sheets: &[SheetData]) -> Result<Workbook, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for sheet in sheets {
        validate_sheet_name(sheet.name)?;
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;

        for (col, header) in (0u16..).zip(sheet.headers) {
            worksheet.write_string_with_format(0, col, *header, &header_format)?;
        }

        for (row, cells) in (1u32..).zip(&sheet.rows) {
            for (col, cell) in (0u16..).zip(cells) {
                match cell {
                    Cell::Text(text) => {
                        worksheet.write_string(row, col, clamp_cell(text))?;
                    }
                    Cell::Number(number) => {
                        worksheet.write_number(row, col, *number)?;
                    }
                }
            }
        }

        worksheet.set_freeze_panes(1, 0)?;
    }

    Ok(workbook)
}

/// Write the sheets as an `.xlsx` file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the workbook cannot be built or saved.
pub fn write_xlsx(sheets: &[SheetData], path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut workbook = build_workbook(sheets)?;
    workbook.save(path)?;
    info!(path = %path.display(), sheets = sheets.len(), "Wrote workbook");
    Ok(())
}

/// Write each sheet as `<dir>/<sheet name>.csv`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub fn write_csv_dir(sheets: &[SheetData], dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        validate_sheet_name(sheet.name)?;
        let path = dir.join(format!("{}.csv", sheet.name));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(sheet.headers)?;
        for row in &sheet.rows {
            writer.write_record(row.iter().map(Cell::as_text))?;
        }
        writer.flush()?;
        written.push(path);
    }

    info!(dir = %dir.display(), sheets = written.len(), "Wrote CSV sheets");
    Ok(written)
}

fn clamp_cell(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => text.get(..cut).unwrap_or(text),
        None => text,
    }
}
