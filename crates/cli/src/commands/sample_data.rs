//! Sample input sheets.

use std::path::Path;

use mailsort_service::sheets::write_sample_data;
use tracing::info;

/// Write `products.csv` and `emails.csv` into `dir`.
///
/// # Errors
///
/// Returns an error if the files cannot be written.
pub fn run(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (products, emails) = write_sample_data(dir)?;
    info!(products = %products.display(), emails = %emails.display(), "Sample data written");
    info!("Run: mailsort process --products {} --emails {}", products.display(), emails.display());
    Ok(())
}
