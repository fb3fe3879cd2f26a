//! Boolean predicate AST

use crate::{ComparisonOp, Literal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A boolean predicate over named variables
///
/// `NOT has_died AND registered`, `LocationRequiresNursing='Y'`,
/// `cov_ethnicity_sus IS NULL`, or the catch-all `DEFAULT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal operand
    Literal(Literal),
    /// Reference to a variable or intrinsic binding
    Identifier(String),
    /// Binary comparison
    Comparison(ComparisonExpr),
    /// Logical and
    And(Box<Expression>, Box<Expression>),
    /// Logical or
    Or(Box<Expression>, Box<Expression>),
    /// Logical not
    Not(Box<Expression>),
    /// `operand IS [NOT] NULL`
    IsNull(IsNullExpr),
    /// Catch-all categorisation rule
    Default,
}

/// `left op right`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonExpr {
    pub left: Box<Expression>,
    pub op: ComparisonOp,
    pub right: Box<Expression>,
}

/// `operand IS NULL` / `operand IS NOT NULL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsNullExpr {
    pub operand: Box<Expression>,
    pub negated: bool,
}

impl Expression {
    /// Identifier reference
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Text literal
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        Self::And(Box::new(self), Box::new(rhs))
    }

    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        Self::Or(Box::new(self), Box::new(rhs))
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn compare(self, op: ComparisonOp, rhs: Self) -> Self {
        Self::Comparison(ComparisonExpr {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        })
    }

    #[must_use]
    pub fn is_null(self, negated: bool) -> Self {
        Self::IsNull(IsNullExpr {
            operand: Box::new(self),
            negated,
        })
    }

    /// Check whether this is the `DEFAULT` catch-all
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Names referenced by this predicate, in order of first appearance
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references(&self, names: &mut Vec<String>) {
        match self {
            Self::Identifier(name) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
            Self::Comparison(cmp) => {
                cmp.left.collect_references(names);
                cmp.right.collect_references(names);
            }
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.collect_references(names);
                rhs.collect_references(names);
            }
            Self::Not(inner) => inner.collect_references(names),
            Self::IsNull(is_null) => is_null.operand.collect_references(names),
            Self::Literal(_) | Self::Default => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::Identifier(name) => write!(f, "{}", name),
            Self::Comparison(cmp) => write!(f, "{} {} {}", cmp.left, cmp.op, cmp.right),
            Self::And(lhs, rhs) => write!(f, "({} AND {})", lhs, rhs),
            Self::Or(lhs, rhs) => write!(f, "({} OR {})", lhs, rhs),
            Self::Not(inner) => write!(f, "NOT {}", inner),
            Self::IsNull(is_null) if is_null.negated => write!(f, "{} IS NOT NULL", is_null.operand),
            Self::IsNull(is_null) => write!(f, "{} IS NULL", is_null.operand),
            Self::Default => write!(f, "DEFAULT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_references_in_first_appearance_order() {
        let expr = Expression::ident("has_died")
            .not()
            .and(Expression::ident("registered"))
            .and(Expression::ident("has_died").is_null(true));

        assert_eq!(expr.references(), vec!["has_died".to_string(), "registered".to_string()]);
    }

    #[test]
    fn test_display() {
        let expr = Expression::ident("IsPotentialCareHome").and(
            Expression::ident("LocationRequiresNursing")
                .compare(ComparisonOp::Equal, Expression::text("Y")),
        );
        assert_eq!(
            expr.to_string(),
            "(IsPotentialCareHome AND LocationRequiresNursing = 'Y')"
        );
    }

    #[test]
    fn test_default_has_no_references() {
        assert!(Expression::Default.is_default());
        assert!(Expression::Default.references().is_empty());
    }
}
