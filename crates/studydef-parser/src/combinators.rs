//! Common parser combinators for study definition expressions

use chrono::NaiveDate;
use studydef_ast::Literal;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::ModalResult;
use winnow::token::{literal, one_of, take_till, take_while};

/// Parser input: the remaining expression text
pub type Input<'a> = &'a str;

/// Parser result
pub type PResult<T> = ModalResult<T>;

/// Words that can never be identifiers
const RESERVED: &[&str] = &["and", "or", "not", "is", "null", "true", "false", "default"];

/// Backtrack without consuming input
pub fn backtrack<T>() -> PResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

/// Skip whitespace (including the newlines of multi-line predicates)
pub fn ws(input: &mut Input<'_>) -> PResult<()> {
    multispace0.void().parse_next(input)
}

/// Exact symbol
pub fn lit<'a>(symbol: &'static str) -> impl Parser<Input<'a>, &'a str, ErrMode<ContextError>> {
    literal(symbol)
}

/// Raw word: letter or underscore followed by alphanumerics or underscores
pub fn word<'a>(input: &mut Input<'a>) -> PResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Case-insensitive keyword matched as a whole word
pub fn keyword<'a>(kw: &'static str) -> impl Parser<Input<'a>, &'a str, ErrMode<ContextError>> {
    move |input: &mut Input<'a>| {
        let checkpoint = *input;
        let found = word.parse_next(input)?;
        if found.eq_ignore_ascii_case(kw) {
            Ok(found)
        } else {
            *input = checkpoint;
            backtrack()
        }
    }
}

/// Keyword surrounded by optional whitespace
pub fn padded_keyword<'a>(
    kw: &'static str,
) -> impl Parser<Input<'a>, &'a str, ErrMode<ContextError>> {
    move |input: &mut Input<'a>| {
        let checkpoint = *input;
        ws.parse_next(input)?;
        match keyword(kw).parse_next(input) {
            Ok(found) => {
                ws.parse_next(input)?;
                Ok(found)
            }
            Err(e) => {
                *input = checkpoint;
                Err(e)
            }
        }
    }
}

/// Identifier: a word that is not a reserved keyword
pub fn identifier<'a>(input: &mut Input<'a>) -> PResult<&'a str> {
    let checkpoint = *input;
    let found = word.parse_next(input)?;
    if RESERVED.iter().any(|kw| found.eq_ignore_ascii_case(kw)) {
        *input = checkpoint;
        return backtrack();
    }
    Ok(found)
}

/// ISO date `YYYY-MM-DD`
///
/// A date-shaped token that is not a calendar date (`2021-02-30`) is a hard
/// error reported at its first digit.
pub fn iso_date(input: &mut Input<'_>) -> PResult<NaiveDate> {
    let start = *input;
    let text = (
        take_while(4, |c: char| c.is_ascii_digit()),
        '-',
        take_while(2, |c: char| c.is_ascii_digit()),
        '-',
        take_while(2, |c: char| c.is_ascii_digit()),
    )
        .take()
        .parse_next(input)?;
    match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => {
            *input = start;
            Err(ErrMode::Cut(ContextError::new()))
        }
    }
}

/// Unsigned integer
pub fn unsigned(input: &mut Input<'_>) -> PResult<i64> {
    digit1.try_map(str::parse::<i64>).parse_next(input)
}

/// Optionally signed integer
pub fn integer(input: &mut Input<'_>) -> PResult<i64> {
    (opt('-'), digit1)
        .take()
        .try_map(str::parse::<i64>)
        .parse_next(input)
}

/// Quoted string, single or double quotes; a doubled quote escapes itself
///
/// An unterminated string is a hard error reported at the opening quote.
pub fn string_literal(input: &mut Input<'_>) -> PResult<String> {
    let start = *input;
    let quote = one_of(['\'', '"']).parse_next(input)?;
    let mut out = String::new();
    loop {
        let chunk = take_till(0.., move |c: char| c == quote).parse_next(input)?;
        out.push_str(chunk);
        if input.is_empty() {
            *input = start;
            return Err(ErrMode::Cut(ContextError::new()));
        }
        *input = &input[quote.len_utf8()..];
        if input.starts_with(quote) {
            out.push(quote);
            *input = &input[quote.len_utf8()..];
        } else {
            return Ok(out);
        }
    }
}

/// Literal operand
pub fn literal_parser(input: &mut Input<'_>) -> PResult<Literal> {
    alt((
        string_literal.map(Literal::Text),
        iso_date.map(Literal::Date),
        integer.map(Literal::Integer),
        keyword("true").value(Literal::Boolean(true)),
        keyword("false").value(Literal::Boolean(false)),
        keyword("null").value(Literal::Null),
    ))
    .parse_next(input)
}
