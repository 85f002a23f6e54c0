//! Core types for mailsort.
//!
//! Flat records mirrored from spreadsheet rows plus the derived results of
//! classification and order processing.

pub mod address;
pub mod email;
pub mod id;
pub mod price;
pub mod product;
pub mod results;
pub mod status;

pub use address::{AddressError, EmailAddress};
pub use email::Email;
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use product::Product;
pub use results::{
    CategoryDistribution, ClassificationResult, OrderLineResult, OrderSummary, ProcessedEmail,
};
pub use status::*;
