//! Date expression AST

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use studydef_types::{DATE_FORMAT, DateUnit};

/// A date expression
///
/// References name either an anchor (`index_date`, `today`) or another
/// variable; which one is decided when the study is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateExpr {
    /// ISO date literal
    Literal(NaiveDate),
    /// Anchor or variable reference
    Reference(String),
    /// `base + amount unit`; `amount` is negative for `-`
    Offset(OffsetExpr),
}

/// `base ± amount unit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetExpr {
    pub base: Box<DateExpr>,
    pub amount: i64,
    pub unit: DateUnit,
}

impl DateExpr {
    /// Reference to an anchor or variable
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(name.into())
    }

    /// Offset this expression by a signed amount of units
    #[must_use]
    pub fn offset(self, amount: i64, unit: DateUnit) -> Self {
        Self::Offset(OffsetExpr {
            base: Box::new(self),
            amount,
            unit,
        })
    }

    /// The name this expression is ultimately based on, if any
    pub fn root_reference(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Reference(name) => Some(name),
            Self::Offset(offset) => offset.base.root_reference(),
        }
    }
}

impl fmt::Display for DateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Self::Reference(name) => write!(f, "{}", name),
            Self::Offset(offset) if offset.amount < 0 => {
                write!(f, "{} - {} {}", offset.base, -offset.amount, offset.unit)
            }
            Self::Offset(offset) => write!(f, "{} + {} {}", offset.base, offset.amount, offset.unit),
        }
    }
}
