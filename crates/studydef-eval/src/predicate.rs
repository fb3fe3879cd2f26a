//! Predicate and categorisation evaluator
//!
//! Predicates are evaluated with two-valued logic: a null or unbound operand
//! makes a truth test or comparison false, so `NOT x` is true when `x` is
//! null. Only `IS NULL` / `IS NOT NULL` observe missingness directly.
//!
//! | operand          | truth  |
//! |------------------|--------|
//! | null / unbound   | false  |
//! | flag             | itself |
//! | integer          | != 0   |
//! | date             | true   |
//! | text             | != ""  |

use crate::context::Bindings;
use crate::error::{EvalError, EvalResult};
use chrono::NaiveDate;
use studydef_ast::{ComparisonExpr, Expression};
use studydef_diagnostics::{Diagnostic, SD0106, SD0107};
use studydef_model::Codelist;
use studydef_types::{DATE_FORMAT, Value};

/// One `(label, predicate)` pair of an ordered rule list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub label: String,
    pub predicate: Expression,
}

impl CategoryRule {
    pub fn new(label: impl Into<String>, predicate: Expression) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

/// Evaluate a boolean filter against a patient's bindings
pub fn evaluate_filter(expr: &Expression, bindings: &Bindings) -> EvalResult<bool> {
    match expr {
        Expression::And(lhs, rhs) => {
            Ok(evaluate_filter(lhs, bindings)? && evaluate_filter(rhs, bindings)?)
        }
        Expression::Or(lhs, rhs) => {
            Ok(evaluate_filter(lhs, bindings)? || evaluate_filter(rhs, bindings)?)
        }
        Expression::Not(inner) => Ok(!evaluate_filter(inner, bindings)?),
        Expression::IsNull(test) => {
            let is_null = operand_value(&test.operand, bindings)?.is_null();
            Ok(is_null != test.negated)
        }
        Expression::Comparison(cmp) => compare(cmp, bindings),
        Expression::Identifier(_) | Expression::Literal(_) => {
            Ok(operand_value(expr, bindings)?.is_truthy())
        }
        // DEFAULT only has meaning as the last resort of a rule list
        Expression::Default => Ok(false),
    }
}

/// Value of a comparison or truth-test operand
fn operand_value(expr: &Expression, bindings: &Bindings) -> EvalResult<Value> {
    match expr {
        Expression::Identifier(name) => Ok(bindings.get(name).cloned().unwrap_or(Value::Null)),
        Expression::Literal(literal) => Ok(literal.to_value()),
        nested => evaluate_filter(nested, bindings).map(Value::Boolean),
    }
}

fn compare(cmp: &ComparisonExpr, bindings: &Bindings) -> EvalResult<bool> {
    let left = operand_value(&cmp.left, bindings)?;
    let right = operand_value(&cmp.right, bindings)?;
    if left.is_null() || right.is_null() {
        return Ok(false);
    }

    let ordering = match (&left, &right) {
        (Value::Date(date), Value::Text(text)) => text_as_date(text)
            .map(|other| date.cmp(&other))
            .ok_or_else(|| EvalError::incomparable(left.value_type().name(), "Text")),
        (Value::Text(text), Value::Date(date)) => text_as_date(text)
            .map(|other| other.cmp(date))
            .ok_or_else(|| EvalError::incomparable("Text", right.value_type().name())),
        _ => left.compare(&right).ok_or_else(|| {
            EvalError::incomparable(left.value_type().name(), right.value_type().name())
        }),
    }?;
    Ok(cmp.op.accepts(ordering))
}

fn text_as_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Evaluate an ordered rule list: the first rule whose predicate holds wins
///
/// Every rule is tested in position order, including rules that share a
/// label with an earlier rule. `DEFAULT` applies only when no other rule
/// matched, wherever it appears. If any rule mentions a name that has no
/// binding at all the result is null.
pub fn evaluate_category(rules: &[CategoryRule], bindings: &Bindings) -> EvalResult<Option<String>> {
    let unresolved = rules
        .iter()
        .flat_map(|rule| rule.predicate.references())
        .find(|name| !bindings.contains(name));
    if let Some(name) = unresolved {
        log::trace!("Rule operand '{}' is unresolved; category is null", name);
        return Ok(None);
    }

    let mut fallback = None;
    for rule in rules {
        if rule.predicate.is_default() {
            fallback.get_or_insert(&rule.label);
            continue;
        }
        if evaluate_filter(&rule.predicate, bindings)? {
            return Ok(Some(rule.label.clone()));
        }
    }
    Ok(fallback.cloned())
}

/// Category of a matched code within a codelist
pub fn categorise(code: Option<&str>, codelist: &Codelist) -> Option<String> {
    code.and_then(|code| codelist.category_of(code))
        .map(str::to_string)
}

/// Lint a rule list
///
/// Emits a warning for every rule whose label repeats an earlier rule's
/// label, and an error for every `DEFAULT` after the first.
pub fn lint_rules(variable: &str, rules: &[CategoryRule]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut default_seen = false;

    for (position, rule) in rules.iter().enumerate() {
        if let Some(first) = rules[..position].iter().position(|r| r.label == rule.label) {
            diagnostics.push(
                Diagnostic::warning(
                    SD0106,
                    format!(
                        "label '{}' of rule {} repeats rule {}; only the first matching rule assigns it",
                        rule.label,
                        position + 1,
                        first + 1
                    ),
                )
                .with_variable(variable)
                .with_help("Rules sharing a label are still tested in order; merge them with OR if that was the intent"),
            );
        }
        if rule.predicate.is_default() {
            if default_seen {
                diagnostics.push(
                    Diagnostic::error(
                        SD0107,
                        format!("rule {} is a second DEFAULT", position + 1),
                    )
                    .with_variable(variable),
                );
            }
            default_seen = true;
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use studydef_diagnostics::Severity;
    use studydef_model::CodingSystem;
    use studydef_parser::parse_predicate;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn filter(source: &str, bindings: &Bindings) -> bool {
        evaluate_filter(&parse_predicate(source).unwrap(), bindings).unwrap()
    }

    fn rules(pairs: &[(&str, &str)]) -> Vec<CategoryRule> {
        pairs
            .iter()
            .map(|(label, source)| CategoryRule::new(*label, parse_predicate(source).unwrap()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    // === Filters ===

    #[rstest]
    #[case(false, true, true)]
    #[case(true, true, false)]
    #[case(false, false, false)]
    fn test_population_filter(#[case] died: bool, #[case] registered: bool, #[case] expected: bool) {
        let b = bindings(&[
            ("has_died", Value::Boolean(died)),
            ("registered", Value::Boolean(registered)),
        ]);
        assert_eq!(filter("NOT has_died AND registered", &b), expected);
    }

    #[test]
    fn test_null_and_unknown_are_false() {
        let b = bindings(&[("x", Value::Null)]);
        assert!(!filter("x", &b));
        assert!(!filter("missing", &b));
        assert!(filter("NOT x", &b));
        assert!(!filter("x = 'a'", &b));
        assert!(!filter("x != 'a'", &b));
    }

    #[test]
    fn test_null_tests() {
        let b = bindings(&[("x", Value::Null), ("y", Value::Text("4".into()))]);
        assert!(filter("x IS NULL", &b));
        assert!(filter("missing IS NULL", &b));
        assert!(!filter("y IS NULL", &b));
        assert!(filter("y IS NOT NULL AND x IS NULL", &b));
    }

    #[rstest]
    #[case(Value::Integer(3), true)]
    #[case(Value::Integer(0), false)]
    #[case(Value::Text(String::new()), false)]
    #[case(Value::Text("1".into()), true)]
    #[case(date(2021, 6, 1), true)]
    fn test_truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(filter("v", &bindings(&[("v", value)])), expected);
    }

    #[test]
    fn test_comparisons() {
        let b = bindings(&[
            ("age", Value::Integer(42)),
            ("sex", Value::Text("F".into())),
            ("vax", date(2021, 3, 1)),
        ]);
        assert!(filter("age >= 18 AND age < 65", &b));
        assert!(filter("sex = 'F'", &b));
        assert!(filter("sex <> 'M'", &b));
        assert!(filter("vax < 2021-06-01", &b));
        assert!(filter("vax = '2021-03-01'", &b));
    }

    #[rstest]
    #[case("has_died = 1", true, true)]
    #[case("has_died = 1", false, false)]
    #[case("has_died = 0", false, true)]
    #[case("has_died != 0", true, true)]
    fn test_flags_compare_with_zero_and_one(
        #[case] source: &str,
        #[case] died: bool,
        #[case] expected: bool,
    ) {
        let b = bindings(&[("has_died", Value::Boolean(died))]);
        assert_eq!(filter(source, &b), expected);
    }

    #[test]
    fn test_mismatched_types_are_an_error() {
        let b = bindings(&[("age", Value::Integer(42))]);
        let expr = parse_predicate("age = 'old'").unwrap();
        assert!(matches!(
            evaluate_filter(&expr, &b),
            Err(EvalError::IncomparableValues { .. })
        ));
    }

    // === Categorisation ===

    fn care_home_rules() -> Vec<CategoryRule> {
        rules(&[
            (
                "TRUE",
                "IsPotentialCareHome AND LocationDoesNotRequireNursing='Y' AND LocationRequiresNursing='N'",
            ),
            (
                "TRUE",
                "IsPotentialCareHome AND LocationDoesNotRequireNursing='N' AND LocationRequiresNursing='Y'",
            ),
            ("TRUE", "IsPotentialCareHome"),
            ("FALSE", "DEFAULT"),
        ])
    }

    #[test]
    fn test_label_collision_keeps_positional_order() {
        let b = bindings(&[
            ("IsPotentialCareHome", Value::Boolean(true)),
            ("LocationDoesNotRequireNursing", Value::Text("N".into())),
            ("LocationRequiresNursing", Value::Text("Y".into())),
        ]);
        assert_eq!(
            evaluate_category(&care_home_rules(), &b).unwrap(),
            Some("TRUE".to_string())
        );
    }

    #[test]
    fn test_later_rule_with_repeated_label_is_still_tested() {
        let rules = rules(&[("A", "x = 1"), ("B", "x = 2"), ("A", "x = 3"), ("C", "DEFAULT")]);
        let b = bindings(&[("x", Value::Integer(3))]);
        assert_eq!(evaluate_category(&rules, &b).unwrap(), Some("A".to_string()));

        let b = bindings(&[("x", Value::Integer(2))]);
        assert_eq!(evaluate_category(&rules, &b).unwrap(), Some("B".to_string()));
    }

    #[test]
    fn test_default_is_position_independent() {
        let rules = rules(&[("other", "DEFAULT"), ("white", "eth = '1'")]);
        let b = bindings(&[("eth", Value::Text("1".into()))]);
        assert_eq!(evaluate_category(&rules, &b).unwrap(), Some("white".to_string()));

        let b = bindings(&[("eth", Value::Null)]);
        assert_eq!(evaluate_category(&rules, &b).unwrap(), Some("other".to_string()));
    }

    #[test]
    fn test_no_match_without_default_is_null() {
        let rules = rules(&[("1", "eth = '1'")]);
        let b = bindings(&[("eth", Value::Text("2".into()))]);
        assert_eq!(evaluate_category(&rules, &b).unwrap(), None);
    }

    #[test]
    fn test_unresolved_operand_gives_null() {
        let rules = rules(&[("1", "eth_sus = '1'"), ("0", "DEFAULT")]);
        assert_eq!(evaluate_category(&rules, &Bindings::new()).unwrap(), None);
    }

    #[test]
    fn test_categorise() {
        let list = Codelist::from_entries(CodingSystem::Ctv3, [("XaJQv", Some("1"))]).unwrap();
        assert_eq!(categorise(Some("XaJQv"), &list), Some("1".to_string()));
        assert_eq!(categorise(Some("Y0000"), &list), None);
        assert_eq!(categorise(None, &list), None);
    }

    // === Lints ===

    #[test]
    fn test_lint_label_collisions() {
        let diagnostics = lint_rules("cov_bin_carehome_status", &care_home_rules());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Warning));
        assert!(diagnostics[0].message.contains("rule 2 repeats rule 1"));
        assert!(diagnostics[1].message.contains("rule 3 repeats rule 1"));
        assert_eq!(diagnostics[0].variable.as_deref(), Some("cov_bin_carehome_status"));
    }

    #[test]
    fn test_lint_multiple_defaults() {
        let diagnostics = lint_rules("v", &rules(&[("a", "DEFAULT"), ("b", "DEFAULT")]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, SD0107);
        assert!(diagnostics[0].is_error());
    }
}
