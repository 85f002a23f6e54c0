//! Sample catalog and inbox for demos and smoke tests.

use std::path::{Path, PathBuf};

use mailsort_core::{Email, Product, ProductId};
use rust_decimal::Decimal;
use tracing::info;

use super::ExportError;

const PRODUCTS: &[(&str, &str, &str, &str, &str, i64, u32)] = &[
    (
        "LTH0976",
        "Leather Bifold Wallet",
        "Accessories",
        "Slim full-grain leather wallet with six card slots.",
        "All seasons",
        2100,
        4,
    ),
    (
        "VBT2345",
        "Vintage Beret",
        "Accessories",
        "Classic wool beret with a soft satin lining.",
        "Fall, Winter",
        1850,
        2,
    ),
    (
        "CBT8901",
        "Chelsea Boots",
        "Men's Shoes",
        "Suede Chelsea boots with elastic side panels and a pull tab.",
        "Fall, Winter",
        6400,
        2,
    ),
    (
        "SCF1234",
        "Cashmere Scarf",
        "Accessories",
        "Lightweight grey cashmere scarf, brushed for extra softness.",
        "Winter",
        3800,
        0,
    ),
    (
        "RSG8901",
        "Retro Sunglasses",
        "Accessories",
        "Round tortoiseshell frames with UV400 lenses.",
        "Summer",
        2600,
        1,
    ),
    (
        "CHN0987",
        "Chunky Knit Beanie",
        "Accessories",
        "Thick ribbed beanie knitted from merino wool.",
        "Winter",
        2200,
        2,
    ),
    (
        "CKS5678",
        "Cable Knit Sweater",
        "Women's Clothing",
        "Heavy wool sweater with a traditional cable pattern.",
        "Fall, Winter",
        4500,
        5,
    ),
    (
        "LNS1122",
        "Linen Button-Down Shirt",
        "Men's Clothing",
        "Breathable linen shirt for warm days and beach weddings.",
        "Spring, Summer",
        3400,
        10,
    ),
    (
        "PMS3344",
        "Pleated Midi Skirt",
        "Women's Clothing",
        "Flowing pleated skirt that falls just below the knee.",
        "Spring",
        4200,
        3,
    ),
    (
        "TRC5566",
        "Trench Coat",
        "Women's Clothing",
        "Water-resistant cotton trench coat with a removable belt.",
        "Fall, Spring",
        9800,
        1,
    ),
];

const EMAILS: &[(&str, &str, &str)] = &[
    (
        "E001",
        "Leather Wallets",
        "Hi there, I want to order all the remaining LTH0976 Leather Bifold Wallets you have \
         in stock. I'm opening up a small boutique shop and these would be perfect. Thank you!",
    ),
    (
        "E002",
        "Buy Vintage Beret",
        "Hello, I'd like to buy 3 x VBT2345 for my sisters. Thanks!",
    ),
    (
        "E003",
        "Question about the cable knit sweater",
        "Is the Cable Knit Sweater warm enough for a Scandinavian winter? What is it made of?",
    ),
    (
        "E004",
        "Boots and sunglasses",
        "Please send me 2 x CBT8901 and 1 x RSG8901. My address is on file.",
    ),
    (
        "E005",
        "Scarf",
        "Do you have any cashmere scarves in grey? I saw SCF1234 on your site last week.",
    ),
    (
        "E006",
        "Trench coat",
        "I would like to purchase the TRC5566 trench coat, 1 piece please.",
    ),
    (
        "E007",
        "Summer outfit",
        "Which linen shirts do you recommend for a beach wedding in July?",
    ),
    ("E008", "", "I want to order 2 CHN0987 beanies for the ski trip."),
];

/// The sample catalog.
#[must_use]
pub fn sample_products() -> Vec<Product> {
    PRODUCTS
        .iter()
        .map(
            |&(id, name, category, description, season, cents, stock)| Product {
                id: ProductId::new(id),
                name: name.to_string(),
                description: description.to_string(),
                category: Some(category.to_string()),
                season: Some(season.to_string()),
                price: Decimal::new(cents, 2),
                stock,
            },
        )
        .collect()
}

/// The sample inbox: a mix of order requests and product inquiries.
#[must_use]
pub fn sample_emails() -> Vec<Email> {
    EMAILS
        .iter()
        .map(|&(id, subject, body)| Email::new(id, subject, body))
        .collect()
}

/// Write `products.csv` and `emails.csv` into `dir`.
///
/// # Errors
///
/// Returns an error if the directory or either file cannot be written.
pub fn write_sample_data(dir: &Path) -> Result<(PathBuf, PathBuf), ExportError> {
    std::fs::create_dir_all(dir)?;

    let products_path = dir.join("products.csv");
    let mut writer = csv::Writer::from_path(&products_path)?;
    writer.write_record([
        "product ID",
        "name",
        "category",
        "description",
        "stock",
        "seasons",
        "price",
    ])?;
    for product in sample_products() {
        writer.write_record([
            product.id.as_str(),
            &product.name,
            product.category.as_deref().unwrap_or_default(),
            &product.description,
            &product.stock.to_string(),
            product.season.as_deref().unwrap_or_default(),
            &product.price.to_string(),
        ])?;
    }
    writer.flush()?;

    let emails_path = dir.join("emails.csv");
    let mut writer = csv::Writer::from_path(&emails_path)?;
    writer.write_record(["email ID", "subject", "message"])?;
    for email in sample_emails() {
        writer.write_record([email.id.as_str(), &email.subject, &email.body])?;
    }
    writer.flush()?;

    info!(dir = %dir.display(), "Wrote sample data");
    Ok((products_path, emails_path))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsort_core::Inventory;

    use super::super::{load_emails, load_products};
    use super::*;

    #[test]
    fn test_sample_catalog_is_valid() {
        let inventory = Inventory::new(sample_products()).unwrap();
        assert_eq!(inventory.len(), PRODUCTS.len());
        assert_eq!(inventory.get("SCF1234").unwrap().stock, 0);
    }

    #[test]
    fn test_written_sample_data_loads() {
        let dir = tempfile::tempdir().unwrap();
        let (products, emails) = write_sample_data(dir.path()).unwrap();

        assert_eq!(load_products(&products).unwrap(), sample_products());
        assert_eq!(load_emails(&emails).unwrap(), sample_emails());
    }
}
