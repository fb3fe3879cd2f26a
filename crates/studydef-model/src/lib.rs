//! Study definition data model
//!
//! This crate provides:
//! - Codelists loaded from CSV, their combination and category filtering
//! - The codelist store a study is compiled against
//! - Patient records and their timelines of dated events
//! - The patient data source trait and a CSV-backed in-memory source

pub mod codelist;
pub mod provider;
pub mod record;

pub use codelist::*;
pub use provider::*;
pub use record::*;
