//! Mailsort Core - Shared types library.
//!
//! This crate provides the records shared by every mailsort component:
//! - `service` - Classification, order processing, and the HTTP API
//! - `cli` - Batch processing and maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types and the in-memory stock table - no I/O,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, addresses, email and product records, statuses
//! - [`inventory`] - Stock table with non-negative decrement semantics

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod inventory;
pub mod types;

pub use inventory::{Inventory, InventoryError, StockChange};
pub use types::*;
