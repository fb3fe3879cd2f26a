//! Predicate parser using recursive descent with precedence climbing
//!
//! Precedence, loosest first: `OR`, `AND`, `NOT`, then comparisons and
//! `IS [NOT] NULL` over a single operand.

use crate::combinators::{identifier, keyword, lit, literal_parser, padded_keyword, ws, Input, PResult};
use studydef_ast::{ComparisonOp, Expression};
use winnow::combinator::alt;
use winnow::prelude::*;

/// Parse a predicate (entry point)
pub fn predicate_parser(input: &mut Input<'_>) -> PResult<Expression> {
    ws.parse_next(input)?;
    or_expression(input)
}

/// Parse or expression
fn or_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = and_expression(input)?;

    while padded_keyword("or").parse_next(input).is_ok() {
        let right = and_expression(input)?;
        left = left.or(right);
    }

    Ok(left)
}

/// Parse and expression
fn and_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let mut left = not_expression(input)?;

    while padded_keyword("and").parse_next(input).is_ok() {
        let right = not_expression(input)?;
        left = left.and(right);
    }

    Ok(left)
}

/// Parse `NOT` prefix (right-associative, binds tighter than AND)
fn not_expression(input: &mut Input<'_>) -> PResult<Expression> {
    ws.parse_next(input)?;
    if padded_keyword("not").parse_next(input).is_ok() {
        let operand = not_expression(input)?;
        return Ok(operand.not());
    }
    comparison_expression(input)
}

/// Parse a comparison or null test over an operand
fn comparison_expression(input: &mut Input<'_>) -> PResult<Expression> {
    let left = operand(input)?;

    let checkpoint = *input;
    ws.parse_next(input)?;

    if let Ok(op) = comparison_operator(input) {
        ws.parse_next(input)?;
        let right = operand(input)?;
        return Ok(left.compare(op, right));
    }

    if padded_keyword("is").parse_next(input).is_ok() {
        let negated = padded_keyword("not").parse_next(input).is_ok();
        keyword("null").parse_next(input)?;
        return Ok(left.is_null(negated));
    }

    *input = checkpoint;
    Ok(left)
}

/// Comparison operator, longest symbols first
fn comparison_operator(input: &mut Input<'_>) -> PResult<ComparisonOp> {
    alt((
        lit("<=").value(ComparisonOp::LessOrEqual),
        lit(">=").value(ComparisonOp::GreaterOrEqual),
        lit("!=").value(ComparisonOp::NotEqual),
        lit("<>").value(ComparisonOp::NotEqual),
        lit("==").value(ComparisonOp::Equal),
        lit("=").value(ComparisonOp::Equal),
        lit("<").value(ComparisonOp::Less),
        lit(">").value(ComparisonOp::Greater),
    ))
    .parse_next(input)
}

/// Parenthesised predicate, literal, or identifier
fn operand(input: &mut Input<'_>) -> PResult<Expression> {
    if input.starts_with('(') {
        lit("(").parse_next(input)?;
        let inner = predicate_parser(input)?;
        ws.parse_next(input)?;
        lit(")").parse_next(input)?;
        return Ok(inner);
    }

    alt((
        literal_parser.map(Expression::Literal),
        identifier.map(Expression::ident),
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Expression {
        let mut input: Input<'_> = source;
        let expr = predicate_parser(&mut input).unwrap();
        assert_eq!(input.trim(), "", "unparsed input in '{source}'");
        expr
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        assert_eq!(
            parse("NOT has_died AND registered"),
            Expression::ident("has_died")
                .not()
                .and(Expression::ident("registered"))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a OR b AND c"),
            Expression::ident("a").or(Expression::ident("b").and(Expression::ident("c")))
        );
    }

    #[test]
    fn test_comparison_without_spaces() {
        assert_eq!(
            parse("LocationRequiresNursing='Y'"),
            Expression::ident("LocationRequiresNursing")
                .compare(ComparisonOp::Equal, Expression::text("Y"))
        );
    }

    #[test]
    fn test_is_not_null() {
        assert_eq!(
            parse("cov_ethnicity_sus IS NOT NULL"),
            Expression::ident("cov_ethnicity_sus").is_null(true)
        );
    }
}
