//! Literal values inside predicates

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use studydef_types::{DATE_FORMAT, Value};

/// A literal operand (`'Y'`, `3`, `2021-06-01`, `true`, `null`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
    Date(NaiveDate),
}

impl Literal {
    /// Runtime value of the literal
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Integer(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Date(d) => Value::Date(*d),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}
