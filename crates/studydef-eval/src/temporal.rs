//! Temporal resolver
//!
//! Resolves date expressions against the study anchors and a patient's
//! bindings. Missingness propagates: an offset of a null date is null.

use crate::context::{Anchors, Bindings};
use crate::error::{EvalError, EvalResult};
use chrono::{Days, Months, NaiveDate};
use studydef_ast::DateExpr;
use studydef_types::{DateUnit, DateWindow, Value};

/// Resolve a date expression for one patient
///
/// Anchors are looked up before bindings. A binding must hold a date or
/// null; anything else is a type mismatch.
pub fn resolve(expr: &DateExpr, anchors: &Anchors, bindings: &Bindings) -> EvalResult<Option<NaiveDate>> {
    match expr {
        DateExpr::Literal(date) => Ok(Some(*date)),
        DateExpr::Reference(name) => {
            if let Some(date) = anchors.get(name) {
                return Ok(Some(date));
            }
            match bindings.get(name) {
                Some(Value::Date(date)) => Ok(Some(*date)),
                Some(Value::Null) => Ok(None),
                Some(other) => Err(EvalError::type_mismatch("Date", other.value_type().name())),
                None => Err(EvalError::unknown_binding(name.as_str())),
            }
        }
        DateExpr::Offset(offset) => match resolve(&offset.base, anchors, bindings)? {
            Some(base) => add_units(base, offset.amount, offset.unit)
                .map(Some)
                .ok_or_else(|| EvalError::date_overflow(expr.to_string())),
            None => Ok(None),
        },
    }
}

/// Shift a date by a signed number of calendar units
///
/// Month and year arithmetic clamps to the last day of the target month:
/// `2021-01-31 + 1 month` is `2021-02-28`.
pub fn add_units(date: NaiveDate, amount: i64, unit: DateUnit) -> Option<NaiveDate> {
    match unit {
        DateUnit::Days => add_days(date, amount),
        DateUnit::Weeks => add_days(date, amount.checked_mul(7)?),
        DateUnit::Months => add_months(date, amount),
        DateUnit::Years => add_months(date, amount.checked_mul(12)?),
    }
}

fn add_days(date: NaiveDate, amount: i64) -> Option<NaiveDate> {
    let days = Days::new(amount.unsigned_abs());
    if amount >= 0 {
        date.checked_add_days(days)
    } else {
        date.checked_sub_days(days)
    }
}

fn add_months(date: NaiveDate, amount: i64) -> Option<NaiveDate> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    }
}

/// Check whether a date lies in `[start, end]`
///
/// Missing bounds are open; a missing date is never inside a window.
pub fn within_window(date: Option<NaiveDate>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    date.is_some_and(|date| DateWindow { start, end }.contains(date))
}

/// Date restriction of an event query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WindowSpec {
    /// No restriction
    #[default]
    Unbounded,
    OnOrBefore(DateExpr),
    OnOrAfter(DateExpr),
    Between(DateExpr, DateExpr),
}

impl WindowSpec {
    /// Resolve the bounds for one patient
    ///
    /// Returns `None` when any bound resolves to null: the window is then
    /// unresolved and the query yields its absent value.
    pub fn resolve(&self, anchors: &Anchors, bindings: &Bindings) -> EvalResult<Option<DateWindow>> {
        let bound = |expr: &DateExpr| resolve(expr, anchors, bindings);
        Ok(match self {
            Self::Unbounded => Some(DateWindow::unbounded()),
            Self::OnOrBefore(end) => bound(end)?.map(DateWindow::on_or_before),
            Self::OnOrAfter(start) => bound(start)?.map(DateWindow::on_or_after),
            Self::Between(start, end) => match (bound(start)?, bound(end)?) {
                (Some(start), Some(end)) => Some(DateWindow::between(start, end)),
                _ => None,
            },
        })
    }

    /// Date expressions bounding this window
    pub fn bounds(&self) -> Vec<&DateExpr> {
        match self {
            Self::Unbounded => Vec::new(),
            Self::OnOrBefore(expr) | Self::OnOrAfter(expr) => vec![expr],
            Self::Between(start, end) => vec![start, end],
        }
    }
}
