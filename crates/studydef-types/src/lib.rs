//! Study definition value types
//!
//! This crate defines the runtime values shared by the parser, the evaluator
//! and the synthetic generator:
//! - `Value`: one cell of output (flag, integer, date, text or null)
//! - `DateUnit` and `DateWindow`: calendar offsets and inclusive date windows
//! - `PatientId`: the key patient data is requested by

pub mod temporal;
pub mod value;

pub use temporal::{DateUnit, DateWindow, UnknownDateUnit};
pub use value::{PatientId, Value, ValueType};

/// Output format for dates (`YYYY-MM-DD`)
pub const DATE_FORMAT: &str = "%Y-%m-%d";
