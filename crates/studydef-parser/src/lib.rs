//! Study definition expression parser using Winnow
//!
//! Two small languages appear inside a study definition file:
//!
//! - predicates, used by population filters and categorisation rules
//!   (`NOT has_died AND registered`, `LocationRequiresNursing='Y'`, `DEFAULT`)
//! - date expressions, used by windows and synthetic date bounds
//!   (`index_date - 6 months`, `2021-01-31 + 1 month`)
//!
//! Both are parsed with recursive descent. Errors carry an error code and the
//! position inside the expression string.

mod combinators;
mod expression;
mod temporal;

use studydef_ast::{DateExpr, Expression};
use studydef_diagnostics::{
    Result, Span, StudyError, SD0001, SD0002, SD0004, SD0005, SD0006,
};
use studydef_types::DateUnit;
use temporal::RawBase;
use winnow::error::{ContextError, ErrMode};
use winnow::stream::Offset;

/// Parse a boolean predicate
///
/// A predicate consisting only of the word `DEFAULT` (any case) is the
/// categorisation catch-all.
pub fn parse_predicate(source: &str) -> Result<Expression> {
    if source.trim().eq_ignore_ascii_case("default") {
        return Ok(Expression::Default);
    }

    let mut input: &str = source;
    let expr = expression::predicate_parser(&mut input)
        .map_err(|e| parse_error(source, input, &e))?;
    expect_end(source, input)?;
    Ok(expr)
}

/// Parse a date expression
pub fn parse_date_expression(source: &str) -> Result<DateExpr> {
    let mut input: &str = source;
    let (base, offsets) = temporal::date_expression_parser(&mut input)
        .map_err(|e| parse_error(source, input, &e))?;
    expect_end(source, input)?;

    let mut expr = match base {
        RawBase::Date(date) => DateExpr::Literal(date),
        RawBase::Reference(name) => DateExpr::reference(name),
    };
    for offset in offsets {
        let unit: DateUnit = offset.unit.parse().map_err(|e| {
            let start = offset.unit.offset_from(&source);
            StudyError::parse_at(
                SD0006,
                format!("{e}; expected days, weeks, months or years"),
                source,
                Span::new(start, start + offset.unit.len()),
            )
        })?;
        expr = expr.offset(offset.amount, unit);
    }
    Ok(expr)
}

fn expect_end(source: &str, remaining: &str) -> Result<()> {
    let rest = remaining.trim_start();
    if rest.is_empty() {
        return Ok(());
    }
    let start = source.len() - rest.len();
    let token = next_token(rest);
    Err(StudyError::parse_at(
        SD0001,
        format!("Unexpected token '{token}'"),
        source,
        Span::new(start, start + token.len()),
    ))
}

fn parse_error(source: &str, remaining: &str, err: &ErrMode<ContextError>) -> StudyError {
    let rest = remaining.trim_start();
    let start = source.len() - rest.len();
    let cut = matches!(err, ErrMode::Cut(_));

    if rest.is_empty() {
        return StudyError::parse_at(SD0002, "Unexpected end of input", source, Span::new(start, start));
    }
    if cut && (rest.starts_with('\'') || rest.starts_with('"')) {
        return StudyError::parse_at(
            SD0005,
            "Unterminated string literal",
            source,
            Span::new(start, source.len()),
        );
    }
    if cut {
        let text = rest.get(..10).unwrap_or(rest);
        return StudyError::parse_at(
            SD0004,
            format!("Invalid date literal '{text}'"),
            source,
            Span::new(start, start + text.len()),
        );
    }

    let token = next_token(rest);
    StudyError::parse_at(
        SD0001,
        format!("Unexpected token '{token}'"),
        source,
        Span::new(start, start + token.len()),
    )
}

fn next_token(rest: &str) -> &str {
    let end = rest
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_whitespace() || matches!(c, '(' | ')'))
        .map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}
