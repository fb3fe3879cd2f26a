//! Tests for date expression parsing

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rstest::rstest;
use studydef_ast::DateExpr;
use studydef_parser::parse_date_expression;
use studydef_types::DateUnit;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn parse(input: &str) -> DateExpr {
    parse_date_expression(input)
        .unwrap_or_else(|e| panic!("Failed to parse '{}': {:?}", input, e))
}

#[test]
fn test_literal() {
    assert_eq!(parse("2020-12-08"), DateExpr::Literal(date(2020, 12, 8)));
}

#[test]
fn test_anchor_reference() {
    assert_eq!(parse("index_date"), DateExpr::reference("index_date"));
    assert_eq!(parse(" today "), DateExpr::reference("today"));
}

#[test]
fn test_literal_plus_month() {
    assert_eq!(
        parse("2021-01-31 + 1 month"),
        DateExpr::Literal(date(2021, 1, 31)).offset(1, DateUnit::Months)
    );
}

#[rstest]
#[case("index_date - 6 months", -6, DateUnit::Months)]
#[case("index_date + 1 day", 1, DateUnit::Days)]
#[case("index_date - 2 Weeks", -2, DateUnit::Weeks)]
#[case("index_date + 10 YEARS", 10, DateUnit::Years)]
#[case("index_date-1day", -1, DateUnit::Days)]
fn test_single_offset(#[case] input: &str, #[case] amount: i64, #[case] unit: DateUnit) {
    assert_eq!(parse(input), DateExpr::reference("index_date").offset(amount, unit));
}

#[test]
fn test_variable_reference_with_chained_offsets() {
    let expr = parse("positive_covid_test_ever + 1 month - 1 day");
    assert_eq!(
        expr,
        DateExpr::reference("positive_covid_test_ever")
            .offset(1, DateUnit::Months)
            .offset(-1, DateUnit::Days)
    );
    assert_eq!(expr.root_reference(), Some("positive_covid_test_ever"));
}
