//! Full batch run: load sheets, process every email, write the workbook.
//!
//! # Environment Variables
//!
//! - `PRODUCTS_CSV`, `EMAILS_CSV` - Input files when no flags are given
//! - `SHEETS_DOCUMENT_ID` - Read inputs from a spreadsheet instead
//! - `OUTPUT_PATH` - Workbook path
//! - `OPENAI_API_KEY` - Enables the LLM; unset runs every stage offline

use std::path::PathBuf;

use mailsort_core::{Category, Inventory, OrderOutcome};
use mailsort_service::services::{BatchReport, EmailProcessor};
use mailsort_service::sheets::{DataSource, build_sheets, load_dataset, write_xlsx};
use mailsort_service::state::build_matcher;
use tokio::sync::RwLock;
use tracing::info;

/// Flags for the `process` command.
#[derive(Debug, Default)]
pub struct ProcessOptions {
    pub products: Option<PathBuf>,
    pub emails: Option<PathBuf>,
    pub sheet_id: Option<String>,
    pub output: Option<PathBuf>,
    pub offline: bool,
    pub no_rag: bool,
}

/// Run the pipeline over every email and write the results workbook.
///
/// # Errors
///
/// Returns an error if the inputs cannot be loaded or the workbook cannot be
/// written. API failures are not errors; they fall back per email.
pub async fn run(options: ProcessOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(options.offline)?;
    if options.no_rag {
        config.retrieval.enabled = false;
    }
    if let Some(products) = options.products {
        config.data.products_csv = products;
    }
    if let Some(emails) = options.emails {
        config.data.emails_csv = emails;
    }
    if let Some(sheet_id) = options.sheet_id {
        config.data.sheets_document_id = Some(sheet_id);
    }
    let output = options
        .output
        .unwrap_or_else(|| config.data.output_path.clone());

    let dataset = load_dataset(&DataSource::from_config(&config.data)).await?;
    let inventory = Inventory::new(dataset.products)?;
    let units_before = inventory.total_units();

    let llm = super::llm_client(&config)?;
    info!(
        llm = llm.is_some(),
        rag = config.retrieval.enabled,
        "Starting pipeline"
    );
    let matcher = build_matcher(&config, inventory.products()).await;
    let processor = EmailProcessor::new(llm, matcher, &config);

    let inventory = RwLock::new(inventory);
    let report = processor.process_batch(&dataset.emails, &inventory).await;

    write_xlsx(&build_sheets(&report.results), &output)?;

    let units_after = inventory.read().await.total_units();
    log_summary(&report, units_before, units_after);
    info!(path = %output.display(), "Results written");

    Ok(())
}

fn log_summary(report: &BatchReport, units_before: u64, units_after: u64) {
    info!("Processing Summary");
    info!("==================");
    info!("Emails processed: {}", report.results.len());
    for category in Category::ALL {
        info!(
            "  {}: {} ({:.1}%)",
            category,
            report.distribution.count(category),
            report.distribution.percentage(category)
        );
    }

    info!("Order outcomes:");
    for outcome in [
        OrderOutcome::Created,
        OrderOutcome::PartiallyFulfilled,
        OrderOutcome::OutOfStock,
        OrderOutcome::NoProductsFound,
    ] {
        info!("  {}: {}", outcome, report.count_outcome(outcome));
    }

    info!("Items created: {}", report.items_created());
    info!("Stock units: {units_before} -> {units_after}");
    info!("Elapsed: {} ms", report.elapsed.as_millis());
}
