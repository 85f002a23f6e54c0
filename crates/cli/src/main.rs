//! Mailsort CLI - batch processing and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Write sample input sheets
//! mailsort sample-data --dir data
//!
//! # Process every email and write the results workbook
//! mailsort process --products data/products.csv --emails data/emails.csv --output output.xlsx
//!
//! # Same, without any API calls
//! mailsort process --offline
//!
//! # Classify one email
//! mailsort classify --subject "Boots" --body "Please send 2 x CBT8901"
//!
//! # Search the catalog
//! mailsort search "warm winter accessories" --limit 5
//!
//! # Rebuild the product vector store
//! mailsort index
//! ```
//!
//! # Commands
//!
//! - `process` - Classify, apply orders, respond, and export
//! - `classify` - Classify a single email
//! - `search` - Product search
//! - `index` - Compute product embeddings
//! - `check-key` - Validate the configured API key
//! - `self-test` - Run labelled emails through the classifier
//! - `sample-data` - Write sample CSV inputs

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mailsort")]
#[command(author, version, about = "Customer email triage tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the results workbook
    Process {
        /// Products CSV (defaults to `PRODUCTS_CSV`)
        #[arg(long)]
        products: Option<PathBuf>,

        /// Emails CSV (defaults to `EMAILS_CSV`)
        #[arg(long)]
        emails: Option<PathBuf>,

        /// Read both sheets from this spreadsheet instead of files
        #[arg(long)]
        sheet_id: Option<String>,

        /// Output workbook (defaults to `OUTPUT_PATH`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip all API calls and use the local fallbacks
        #[arg(long)]
        offline: bool,

        /// Disable product embeddings
        #[arg(long)]
        no_rag: bool,
    },
    /// Classify a single email and print the result as JSON
    Classify {
        /// Subject line
        #[arg(short, long, default_value = "")]
        subject: String,

        /// Message body
        #[arg(short, long)]
        body: String,

        /// Skip the API call and use keyword matching
        #[arg(long)]
        offline: bool,
    },
    /// Search the product catalog
    Search {
        /// Free-text query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Products CSV (defaults to `PRODUCTS_CSV`)
        #[arg(long)]
        products: Option<PathBuf>,
    },
    /// Compute product embeddings and save the vector store
    Index {
        /// Products CSV (defaults to `PRODUCTS_CSV`)
        #[arg(long)]
        products: Option<PathBuf>,
    },
    /// Validate the API key format and make a test completion
    CheckKey,
    /// Run labelled emails through the classifier
    SelfTest {
        /// Skip the API call and use keyword matching
        #[arg(long)]
        offline: bool,
    },
    /// Write sample `products.csv` and `emails.csv`
    SampleData {
        /// Output directory
        #[arg(short, long, default_value = "data")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Process {
            products,
            emails,
            sheet_id,
            output,
            offline,
            no_rag,
        } => {
            let options = commands::process::ProcessOptions {
                products,
                emails,
                sheet_id,
                output,
                offline,
                no_rag,
            };
            commands::process::run(options).await?;
        }
        Commands::Classify {
            subject,
            body,
            offline,
        } => commands::classify::classify(&subject, &body, offline).await?,
        Commands::Search {
            query,
            limit,
            products,
        } => commands::search::search(&query, limit, products).await?,
        Commands::Index { products } => commands::search::index(products).await?,
        Commands::CheckKey => commands::check_key::run().await?,
        Commands::SelfTest { offline } => commands::classify::self_test(offline).await?,
        Commands::SampleData { dir } => commands::sample_data::run(&dir)?,
    }
    Ok(())
}
