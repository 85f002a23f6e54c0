//! Product and email sheets from CSV.
//!
//! Sheets come from local CSV files or from a cloud spreadsheet's public CSV
//! export. Headers are matched case-insensitively, with a few aliases per
//! column, so exports with `product ID`, `product_id` or `id` all load.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use mailsort_core::{Email, EmailAddress, EmailId, Product, ProductId};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, instrument};
use url::Url;

use super::SheetError;
use crate::config::DataConfig;

pub const PRODUCTS_SHEET: &str = "products";
pub const EMAILS_SHEET: &str = "emails";

const PRODUCT_ID: &[&str] = &["product id", "product_id", "productid", "id", "sku"];
const PRODUCT_NAME: &[&str] = &["name", "product name", "product_name", "title"];
const DESCRIPTION: &[&str] = &["description", "details"];
const CATEGORY: &[&str] = &["category", "type"];
const SEASON: &[&str] = &["season", "seasons"];
const PRICE: &[&str] = &["price", "unit price", "unit_price"];
const STOCK: &[&str] = &["stock", "stock amount", "stock_amount", "quantity", "inventory"];

const EMAIL_ID: &[&str] = &["email id", "email_id", "emailid", "id"];
const SENDER: &[&str] = &["sender", "from", "email", "email address"];
const SUBJECT: &[&str] = &["subject", "title"];
const BODY: &[&str] = &["message", "body", "content", "text"];

/// Where the two input sheets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Local CSV files.
    Files {
        products: std::path::PathBuf,
        emails: std::path::PathBuf,
    },
    /// A spreadsheet's public CSV export, one tab per sheet.
    Spreadsheet { document_id: String },
}

impl DataSource {
    /// The spreadsheet when a document ID is configured, local files otherwise.
    #[must_use]
    pub fn from_config(data: &DataConfig) -> Self {
        data.sheets_document_id.as_ref().map_or_else(
            || Self::Files {
                products: data.products_csv.clone(),
                emails: data.emails_csv.clone(),
            },
            |document_id| Self::Spreadsheet {
                document_id: document_id.clone(),
            },
        )
    }
}

/// Loaded input sheets.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub products: Vec<Product>,
    pub emails: Vec<Email>,
}

/// Load both sheets from `source`.
///
/// # Errors
///
/// Returns an error if either sheet cannot be read or a row is invalid.
#[instrument(skip_all)]
pub async fn load_dataset(source: &DataSource) -> Result<Dataset, SheetError> {
    let dataset = match source {
        DataSource::Files { products, emails } => Dataset {
            products: load_products(products)?,
            emails: load_emails(emails)?,
        },
        DataSource::Spreadsheet { document_id } => {
            let client = reqwest::Client::new();
            let products = fetch_sheet(&client, document_id, PRODUCTS_SHEET).await?;
            let emails = fetch_sheet(&client, document_id, EMAILS_SHEET).await?;
            Dataset {
                products: read_products(products.as_bytes())?,
                emails: read_emails(emails.as_bytes())?,
            }
        }
    };

    info!(
        products = dataset.products.len(),
        emails = dataset.emails.len(),
        "Loaded sheets"
    );
    Ok(dataset)
}

/// Load only the products sheet from `source`.
///
/// # Errors
///
/// Returns an error if the sheet cannot be read or a row is invalid.
#[instrument(skip_all)]
pub async fn load_catalog(source: &DataSource) -> Result<Vec<Product>, SheetError> {
    let products = match source {
        DataSource::Files { products, .. } => load_products(products)?,
        DataSource::Spreadsheet { document_id } => {
            let client = reqwest::Client::new();
            let csv = fetch_sheet(&client, document_id, PRODUCTS_SHEET).await?;
            read_products(csv.as_bytes())?
        }
    };
    info!(products = products.len(), "Loaded product catalog");
    Ok(products)
}

/// Read the products sheet from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a row is invalid.
pub fn load_products(path: &Path) -> Result<Vec<Product>, SheetError> {
    let file = std::fs::File::open(path).map_err(|source| SheetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_products(file)
}

/// Read the emails sheet from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a row is invalid.
pub fn load_emails(path: &Path) -> Result<Vec<Email>, SheetError> {
    let file = std::fs::File::open(path).map_err(|source| SheetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_emails(file)
}

/// Public CSV export URL for one tab of a spreadsheet.
///
/// # Errors
///
/// Returns `InvalidDocumentId` if the ID is empty or contains characters
/// that cannot appear in a document ID.
pub fn export_url(document_id: &str, sheet: &str) -> Result<Url, SheetError> {
    let document_id = document_id.trim();
    if document_id.is_empty()
        || !document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SheetError::InvalidDocumentId(document_id.to_string()));
    }

    let mut url = Url::parse("https://docs.google.com/spreadsheets/d/")
        .map_err(|e| SheetError::InvalidDocumentId(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| SheetError::InvalidDocumentId(document_id.to_string()))?
        .pop_if_empty()
        .extend([document_id, "gviz", "tq"]);
    url.query_pairs_mut()
        .append_pair("tqx", "out:csv")
        .append_pair("sheet", sheet);
    Ok(url)
}

/// Download one tab as CSV text.
///
/// # Errors
///
/// Returns an error if the request fails or the response is not a success.
#[instrument(skip(client))]
pub async fn fetch_sheet(
    client: &reqwest::Client,
    document_id: &str,
    sheet: &str,
) -> Result<String, SheetError> {
    let url = export_url(document_id, sheet)?;
    debug!(%url, "Fetching sheet");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SheetError::FetchStatus {
            sheet: sheet.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

/// Parse the products sheet.
///
/// Requires ID, name, price, and stock columns. Fully blank rows are skipped.
///
/// # Errors
///
/// Returns an error for a missing column, an empty ID, or an unparseable
/// price or stock value.
pub fn read_products<R: Read>(reader: R) -> Result<Vec<Product>, SheetError> {
    let mut csv = csv_reader(reader);
    let columns = Columns::new(PRODUCTS_SHEET, csv.headers()?);
    let id_col = columns.required(PRODUCT_ID, "product ID")?;
    let name_col = columns.required(PRODUCT_NAME, "name")?;
    let price_col = columns.required(PRICE, "price")?;
    let stock_col = columns.required(STOCK, "stock")?;
    let description_col = columns.optional(DESCRIPTION);
    let category_col = columns.optional(CATEGORY);
    let season_col = columns.optional(SEASON);

    let mut products = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let row = Row::new(PRODUCTS_SHEET, index, &record);

        let id = row.required(id_col, "product ID")?;
        products.push(Product {
            id: ProductId::new(id),
            name: row.get(name_col).to_string(),
            description: description_col.map_or_else(String::new, |c| row.get(c).to_string()),
            category: category_col.map(|c| row.get(c)).and_then(non_empty),
            season: season_col.map(|c| row.get(c)).and_then(non_empty),
            price: row.parse_with(price_col, "price", parse_price)?,
            stock: row.parse_with(stock_col, "stock", parse_stock)?,
        });
    }

    Ok(products)
}

/// Parse the emails sheet.
///
/// Requires ID and message columns; subject and sender are optional. An
/// empty sender cell means no sender.
///
/// # Errors
///
/// Returns an error for a missing column, an empty ID, or an invalid sender
/// address.
pub fn read_emails<R: Read>(reader: R) -> Result<Vec<Email>, SheetError> {
    let mut csv = csv_reader(reader);
    let columns = Columns::new(EMAILS_SHEET, csv.headers()?);
    let id_col = columns.required(EMAIL_ID, "email ID")?;
    let body_col = columns.required(BODY, "message")?;
    let subject_col = columns.optional(SUBJECT);
    let sender_col = columns.optional(SENDER);

    let mut emails = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let row = Row::new(EMAILS_SHEET, index, &record);

        let id = row.required(id_col, "email ID")?;
        let subject = subject_col.map_or("", |c| row.get(c));
        let mut email = Email::new(EmailId::new(id), subject, row.get(body_col));

        if let Some(raw) = sender_col.map(|c| row.get(c)).filter(|s| !s.is_empty()) {
            let sender = EmailAddress::parse(raw).map_err(|e| row.invalid("sender", raw, &e))?;
            email = email.with_sender(sender);
        }
        emails.push(email);
    }

    Ok(emails)
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Price with an optional currency symbol and thousands separators.
fn parse_price(raw: &str) -> Result<Decimal, String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let price = Decimal::from_str(&cleaned).map_err(|e| e.to_string())?;
    if price.is_sign_negative() {
        return Err("price cannot be negative".to_string());
    }
    Ok(price)
}

/// Whole, non-negative stock count. `12.0` is accepted; empty means zero.
fn parse_stock(raw: &str) -> Result<u32, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    if let Ok(stock) = raw.parse::<u32>() {
        return Ok(stock);
    }
    let value = Decimal::from_str(raw).map_err(|e| e.to_string())?;
    if value.is_sign_negative() || value.fract() != Decimal::ZERO {
        return Err("stock must be a whole number of at least 0".to_string());
    }
    value
        .trunc()
        .to_u32()
        .ok_or_else(|| "stock is too large".to_string())
}

/// Header positions for one sheet.
struct Columns {
    sheet: &'static str,
    headers: Vec<String>,
}

impl Columns {
    fn new(sheet: &'static str, headers: &csv::StringRecord) -> Self {
        Self {
            sheet,
            headers: headers
                .iter()
                .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
                .collect(),
        }
    }

    fn optional(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h == alias))
    }

    fn required(&self, aliases: &[&str], column: &'static str) -> Result<usize, SheetError> {
        self.optional(aliases).ok_or(SheetError::MissingColumn {
            sheet: self.sheet,
            column,
        })
    }
}

/// One data row with its spreadsheet row number for error messages.
struct Row<'a> {
    sheet: &'static str,
    /// 1-based, counting the header row.
    number: usize,
    record: &'a csv::StringRecord,
}

impl<'a> Row<'a> {
    const fn new(sheet: &'static str, index: usize, record: &'a csv::StringRecord) -> Self {
        Self {
            sheet,
            number: index + 2,
            record,
        }
    }

    fn get(&self, column: usize) -> &'a str {
        self.record.get(column).unwrap_or_default()
    }

    fn required(&self, column: usize, name: &'static str) -> Result<&'a str, SheetError> {
        let value = self.get(column);
        if value.is_empty() {
            return Err(self.invalid(name, value, &"value is empty"));
        }
        Ok(value)
    }

    fn parse_with<T>(
        &self,
        column: usize,
        name: &'static str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, SheetError> {
        let raw = self.get(column);
        parse(raw).map_err(|reason| self.invalid(name, raw, &reason))
    }

    fn invalid(&self, column: &'static str, value: &str, reason: &dyn std::fmt::Display) -> SheetError {
        SheetError::InvalidValue {
            sheet: self.sheet,
            row: self.number,
            column,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PRODUCTS_CSV: &str = "\
product ID,name,category,description,stock,seasons,price
LTH0976,Leather Bifold Wallet,Accessories,Slim wallet,4,All seasons,21.00
CBT8901,Chelsea Boots,Men's Shoes,\"Suede, elastic panels\",2.0,\"Fall, Winter\",$64.00
,,,,,,
";

    const EMAILS_CSV: &str = "\
email_id,Subject,message,sender
E001,Order,Please send LTH0976,jane@example.com
E002,,Do you have boots?,
";

    #[test]
    fn test_read_products_with_aliases() {
        let products = read_products(PRODUCTS_CSV.as_bytes()).unwrap();
        assert_eq!(products.len(), 2);

        let boots = products.get(1).unwrap();
        assert_eq!(boots.id.as_str(), "CBT8901");
        assert_eq!(boots.description, "Suede, elastic panels");
        assert_eq!(boots.season.as_deref(), Some("Fall, Winter"));
        assert_eq!(boots.stock, 2);
        assert_eq!(boots.price, Decimal::new(6400, 2));
    }

    #[test]
    fn test_read_products_missing_column() {
        let err = read_products("id,name,price\nA1,Thing,1.00\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            SheetError::MissingColumn {
                sheet: "products",
                column: "stock"
            }
        ));
    }

    #[test]
    fn test_read_products_invalid_stock_reports_row() {
        let err = read_products("id,name,price,stock\nA1,Thing,1.00,-3\n".as_bytes()).unwrap_err();
        match err {
            SheetError::InvalidValue { row, column, .. } => {
                assert_eq!(row, 2);
                assert_eq!(column, "stock");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_stock_and_price() {
        assert_eq!(parse_stock("7"), Ok(7));
        assert_eq!(parse_stock("12.0"), Ok(12));
        assert_eq!(parse_stock(""), Ok(0));
        assert!(parse_stock("1.5").is_err());
        assert_eq!(parse_price("$1,299.50"), Ok(Decimal::new(129_950, 2)));
        assert!(parse_price("free").is_err());
    }

    #[test]
    fn test_read_emails() {
        let emails = read_emails(EMAILS_CSV.as_bytes()).unwrap();
        assert_eq!(emails.len(), 2);

        let first = emails.first().unwrap();
        assert_eq!(first.subject, "Order");
        assert_eq!(
            first.sender.as_ref().map(EmailAddress::as_str),
            Some("jane@example.com")
        );

        let second = emails.get(1).unwrap();
        assert!(second.sender.is_none());
        assert_eq!(second.subject, "");
    }

    #[test]
    fn test_read_emails_invalid_sender() {
        let err = read_emails("email ID,message,sender\nE1,hi,not-an-address\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SheetError::InvalidValue { column: "sender", .. }));
    }

    #[test]
    fn test_export_url() {
        let url = export_url("1AbC-d_9", "emails").unwrap();
        assert_eq!(
            url.as_str(),
            "https://docs.google.com/spreadsheets/d/1AbC-d_9/gviz/tq?tqx=out%3Acsv&sheet=emails"
        );
        assert!(export_url("bad/id", "emails").is_err());
        assert!(export_url("  ", "emails").is_err());
    }

    #[test]
    fn test_load_products_missing_file() {
        let err = load_products(Path::new("/nonexistent/products.csv")).unwrap_err();
        assert!(matches!(err, SheetError::Open { .. }));
    }

    #[test]
    fn test_data_source_from_config() {
        let mut data = DataConfig::default();
        assert!(matches!(DataSource::from_config(&data), DataSource::Files { .. }));

        data.sheets_document_id = Some("1AbC".to_string());
        assert_eq!(
            DataSource::from_config(&data),
            DataSource::Spreadsheet {
                document_id: "1AbC".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let products = dir.path().join("products.csv");
        std::fs::write(&products, PRODUCTS_CSV).unwrap();

        let source = DataSource::Files {
            products,
            emails: dir.path().join("missing.csv"),
        };
        assert_eq!(load_catalog(&source).await.unwrap().len(), 2);
    }
}
