//! Airtable record-store client.
//!
//! The [`RecordStore`] trait is the seam every other crate depends on;
//! [`AirtableClient`] is the production implementation over the Airtable
//! REST API. Typed adapters in [`records`] convert raw field maps into the
//! handful of shapes the pipeline reads and writes.

pub mod client;
pub mod config;
pub mod error;
pub mod formula;
pub mod records;

pub use client::{AirtableClient, Fields, ListQuery, Record, RecordStore, Sort, SortDirection};
pub use config::{AirtableConfig, TableNames};
pub use error::RecordStoreError;
