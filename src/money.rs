use std::collections::HashMap;

use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{digit1, space0},
    combinator::{all_consuming, map, opt, recognize},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

use crate::{Error, Result};

struct Currency {
    symbol: &'static str,
    decimals: u32,
}

lazy_static! {
    static ref CURRENCIES: HashMap<&'static str, Currency> = [
        ("USD", "$", 2),
        ("CAD", "C$", 2),
        ("AUD", "A$", 2),
        ("EUR", "€", 2),
        ("GBP", "£", 2),
        ("INR", "₹", 2),
        ("MXN", "MX$", 2),
        ("CHF", "CHF", 2),
        ("JPY", "¥", 0),
        ("KRW", "₩", 0),
        ("BHD", "BHD", 3),
    ]
    .into_iter()
    .map(|(code, symbol, decimals)| (code, Currency { symbol, decimals }))
    .collect();
}

pub fn is_known_currency(code: &str) -> bool {
    CURRENCIES.contains_key(code)
}

pub fn check_currency(code: &str) -> Result<()> {
    if is_known_currency(code) {
        Ok(())
    } else {
        Err(Error::UnknownCurrency(code.to_owned()))
    }
}

/// Digits after the decimal point, capped at two because amounts are stored
/// in hundredths.
pub fn decimals(code: &str) -> u32 {
    CURRENCIES.get(code).map_or(2, |c| c.decimals.min(2))
}

/// Subunits per major unit.
fn unit(code: &str) -> i64 {
    10_i64.pow(decimals(code))
}

/// Renders an amount in hundredths, e.g. `-150050` in USD is `-$1,500.50`.
pub fn to_display_string(amount: i64, currency: &str) -> String {
    let decimals = decimals(currency);
    let value = (BigDecimal::from(amount.abs()) / BigDecimal::from(100)).with_scale(decimals as i64);
    let text = value.to_string();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole.to_owned(), Some(fraction.to_owned())),
        None => (text, None),
    };

    let grouped = group_thousands(&whole);
    let number = match fraction {
        Some(fraction) => format!("{}.{}", grouped, fraction),
        None => grouped,
    };

    let sign = if amount < 0 { "-" } else { "" };
    match CURRENCIES.get(currency) {
        Some(c) if c.symbol.chars().all(|ch| ch.is_ascii_uppercase()) => {
            format!("{}{} {}", sign, c.symbol, number)
        }
        Some(c) => format!("{}{}{}", sign, c.symbol, number),
        None => format!("{}{} {}", sign, currency, number),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn symbol(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_ascii_digit() && !c.is_whitespace() && c != '-' && c != '.')(i)
}

fn grouped_digits(i: &str) -> IResult<&str, String> {
    map(
        recognize(pair(digit1, many0(preceded(tag(","), digit1)))),
        |s: &str| s.replace(',', ""),
    )(i)
}

fn amount_literal(i: &str) -> IResult<&str, (String, Option<&str>)> {
    alt((
        pair(grouped_digits, opt(preceded(tag("."), digit1))),
        map(preceded(tag("."), digit1), |f| (String::from("0"), Some(f))),
    ))(i)
}

fn typed_amount(i: &str) -> IResult<&str, (String, Option<&str>)> {
    all_consuming(map(
        tuple((
            space0,
            opt(terminated(symbol, space0)),
            amount_literal,
            space0,
        )),
        |(_, _, literal, _)| literal,
    ))(i)
}

/// Parses text typed by the user into hundredths of `currency`.
pub fn parse_amount(text: &str, currency: &str) -> Result<i64> {
    let malformed = || Error::MalformedAmount(text.to_owned());
    let (_, (whole, fraction)) = typed_amount(text).map_err(|_| malformed())?;

    let decimals = decimals(currency) as usize;
    let fraction = fraction.unwrap_or_default();
    if fraction.len() > decimals {
        return Err(malformed());
    }

    let whole: i64 = whole.parse().map_err(|_| malformed())?;
    let padded = format!("{:0<width$}", fraction, width = decimals);
    let fraction: i64 = if padded.is_empty() {
        0
    } else {
        padded.parse().map_err(|_| malformed())?
    };

    let subunits = whole
        .checked_mul(unit(currency))
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(malformed)?;
    subunits
        .checked_mul(100 / unit(currency))
        .ok_or_else(malformed)
}

/// One person's share of `total` split between the current user and
/// `participants` others. Everyone else gets the floor of the even share, the
/// current user gets whatever remains, so the shares always sum to `total`.
pub fn calculate_amount(participants: usize, total: i64, currency: &str, is_current_user: bool) -> i64 {
    let unit = unit(currency);
    let per_unit = 100 / unit;
    let total_in_subunits = total / per_unit;
    let people = participants as i64 + 1;
    let share = total_in_subunits.div_euclid(people);
    let amount = if is_current_user {
        total_in_subunits - share * (people - 1)
    } else {
        share
    };
    amount * per_unit + if is_current_user { total % per_unit } else { 0 }
}
