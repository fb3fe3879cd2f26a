//! Study definition syntax trees
//!
//! Two small languages appear inside a study definition:
//! - boolean predicates (population filters, `satisfying`, categorisation rules)
//! - date expressions (`index_date - 6 months`, `2020-12-08`, `exp_date_covid19_confirmed`)
//!
//! Both are parsed once at build time by `studydef-parser` and evaluated per patient.

mod expression;
mod literal;
mod operator;
mod temporal;

pub use expression::*;
pub use literal::*;
pub use operator::*;
pub use temporal::*;
