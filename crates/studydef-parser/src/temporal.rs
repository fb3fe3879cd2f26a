//! Date expression parser
//!
//! `2021-01-31 + 1 month`, `index_date - 6 months`, `positive_covid_test_ever`.
//! Unit words are returned raw so the caller can report unknown units with
//! their exact position.

use crate::combinators::{identifier, iso_date, lit, unsigned, word, ws, Input, PResult};
use chrono::NaiveDate;
use winnow::combinator::alt;
use winnow::prelude::*;

/// Base of a date expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBase<'a> {
    Date(NaiveDate),
    Reference(&'a str),
}

/// One `± amount unit` step, unit not yet validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOffset<'a> {
    pub amount: i64,
    pub unit: &'a str,
}

/// Parse a date expression into its base and offset steps
pub fn date_expression_parser<'a>(
    input: &mut Input<'a>,
) -> PResult<(RawBase<'a>, Vec<RawOffset<'a>>)> {
    ws.parse_next(input)?;
    let base = alt((iso_date.map(RawBase::Date), identifier.map(RawBase::Reference)))
        .parse_next(input)?;

    let mut offsets = Vec::new();
    loop {
        let checkpoint = *input;
        ws.parse_next(input)?;
        let negative = match alt((lit("+"), lit("-"))).parse_next(input) {
            Ok(sign) => sign == "-",
            Err(_) => {
                *input = checkpoint;
                break;
            }
        };
        ws.parse_next(input)?;
        let magnitude = unsigned(input)?;
        ws.parse_next(input)?;
        let unit = word(input)?;
        offsets.push(RawOffset {
            amount: if negative { -magnitude } else { magnitude },
            unit,
        });
    }

    Ok((base, offsets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_offsets() {
        let mut input: Input<'_> = "index_date - 6 months + 1 day";
        let (base, offsets) = date_expression_parser(&mut input).unwrap();
        assert_eq!(base, RawBase::Reference("index_date"));
        assert_eq!(
            offsets,
            vec![
                RawOffset { amount: -6, unit: "months" },
                RawOffset { amount: 1, unit: "day" },
            ]
        );
        assert_eq!(input, "");
    }

    #[test]
    fn test_literal_base_without_offsets() {
        let mut input: Input<'_> = "2020-12-08";
        let (base, offsets) = date_expression_parser(&mut input).unwrap();
        assert_eq!(
            base,
            RawBase::Date(NaiveDate::from_ymd_opt(2020, 12, 8).unwrap())
        );
        assert!(offsets.is_empty());
    }
}
