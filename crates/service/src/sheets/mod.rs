//! Spreadsheet input and output.

mod export;
mod loader;
mod sample;

pub use export::{
    CLASSIFICATION_SHEET, Cell, MAX_SHEET_NAME_LEN, ORDER_STATUS_SHEET, RESPONSE_SHEET, SheetData,
    build_sheets, validate_sheet_name, write_csv_dir, write_xlsx,
};
pub use loader::{
    DataSource, Dataset, EMAILS_SHEET, PRODUCTS_SHEET, export_url, fetch_sheet, load_catalog,
    load_dataset, load_emails, load_products, read_emails, read_products,
};
pub use sample::{sample_emails, sample_products, write_sample_data};

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading input sheets.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{sheet} sheet is missing the {column} column")]
    MissingColumn {
        sheet: &'static str,
        column: &'static str,
    },

    #[error("{sheet} sheet row {row}: invalid {column} {value:?}: {reason}")]
    InvalidValue {
        sheet: &'static str,
        row: usize,
        column: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid spreadsheet document id: {0}")]
    InvalidDocumentId(String),

    #[error("failed to fetch sheet: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("fetching {sheet} sheet returned HTTP {status}")]
    FetchStatus { sheet: String, status: u16 },
}

/// Errors writing output sheets.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sheet name: {0}")]
    SheetName(String),
}
