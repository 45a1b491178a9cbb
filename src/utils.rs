//! Вспомогательные парсеры чисел, дат и курсов с учётом формата учреждения.

use crate::error::ExtractError;
use crate::types::{AMOUNT_DECIMALS, NumberLocale, Shares};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::LazyLock;

/// Немецкие названия месяцев и их английские сокращения для `%b`.
const GERMAN_MONTHS: &[(&str, &str)] = &[
    ("januar", "Jan"),
    ("jänner", "Jan"),
    ("februar", "Feb"),
    ("märz", "Mar"),
    ("mär", "Mar"),
    ("mrz", "Mar"),
    ("mai", "May"),
    ("juni", "Jun"),
    ("juli", "Jul"),
    ("oktober", "Oct"),
    ("okt", "Oct"),
    ("dezember", "Dec"),
    ("dez", "Dec"),
];

/// Форматы дат в порядке попыток. Двузначный год проверяется раньше четырёхзначного.
const DATE_FORMATS: &[&str] = &[
    "%d.%m.%y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d. %b %Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%Y%m%d",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H.%M.%S", "%H.%M"];

static MONTH_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}+\.?").expect("valid month word regex"));

/// Удаляет пробельные символы и знак, оставляя только число.
fn normalize_number(input: &str) -> String {
    let compact: String = input
        .chars()
        .filter(|ch| !ch.is_whitespace() && !matches!(*ch, '\u{a0}' | '\u{202f}'))
        .collect();
    compact
        .trim_start_matches(['+', '-'])
        .trim_end_matches(['+', '-'])
        .to_string()
}

/// Приводит число к виду, понятному `Decimal::from_str`.
fn canonical_number(input: &str, locale: NumberLocale) -> String {
    let normalized = normalize_number(input);
    match locale {
        NumberLocale::German | NumberLocale::French => normalized.replace('.', "").replace(',', "."),
        NumberLocale::English => normalized.replace(',', ""),
        NumberLocale::Swiss => normalized.replace(['\'', '’'], ""),
    }
}

/// Разбирает десятичное число по правилам локали, возвращая модуль значения.
pub fn parse_decimal(value: &str, locale: NumberLocale, field: &str) -> Result<Decimal, ExtractError> {
    let canonical = canonical_number(value, locale);
    Decimal::from_str(&canonical)
        .map(|d| d.abs())
        .map_err(|_| ExtractError::MalformedAmount {
            value: value.trim().to_string(),
            field: field.to_string(),
        })
}

/// Переводит десятичное значение в целое с фиксированной точкой.
fn to_fixed(value: Decimal, decimals: u32, raw: &str, field: &str) -> Result<i64, ExtractError> {
    value
        .checked_mul(Decimal::from(10_i64.pow(decimals)))
        .and_then(|scaled| {
            scaled
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .ok_or_else(|| ExtractError::MalformedAmount {
            value: raw.trim().to_string(),
            field: field.to_string(),
        })
}

/// Разбирает денежную сумму в минимальные единицы.
pub fn parse_amount(value: &str, locale: NumberLocale, field: &str) -> Result<i64, ExtractError> {
    let decimal = parse_decimal(value, locale, field)?;
    to_fixed(decimal, AMOUNT_DECIMALS, value, field)
}

/// Разбирает количество бумаг.
pub fn parse_shares(value: &str, locale: NumberLocale) -> Result<Shares, ExtractError> {
    let decimal = parse_decimal(value, locale, "shares")?;
    to_fixed(decimal, Shares::DECIMALS, value, "shares").map(Shares)
}

/// Разбирает курс валют; нулевой курс считается ошибкой.
pub fn parse_exchange_rate(value: &str, locale: NumberLocale) -> Result<Decimal, ExtractError> {
    let rate = parse_decimal(value, locale, "exchange_rate")?;
    if rate.is_zero() {
        return Err(ExtractError::MalformedAmount {
            value: value.trim().to_string(),
            field: "exchange_rate".to_string(),
        });
    }
    Ok(rate)
}

/// Заменяет немецкие названия месяцев английскими сокращениями.
fn translate_months(value: &str) -> String {
    MONTH_WORD_RE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let word = &caps[0];
            let bare = word.trim_end_matches('.').to_lowercase();
            GERMAN_MONTHS
                .iter()
                .find(|(german, _)| *german == bare)
                .map_or_else(|| word.trim_end_matches('.').to_string(), |(_, english)| (*english).to_string())
        })
        .into_owned()
}

/// Разбирает дату в одном из распространённых в выписках форматов.
pub fn parse_date(value: &str) -> Result<NaiveDate, ExtractError> {
    let trimmed = value.trim();
    let candidate = translate_months(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&candidate, format).ok())
        .ok_or_else(|| ExtractError::MalformedDate {
            value: trimmed.to_string(),
        })
}

/// Разбирает дату без года (`03.02.`), дополняя её годом из контекста документа.
pub fn parse_date_with_year(value: &str, year: Option<&str>) -> Result<NaiveDate, ExtractError> {
    let trimmed = value.trim();
    match year {
        Some(year) if trimmed.ends_with(['.', '/', '-']) => parse_date(&format!("{trimmed}{}", year.trim())),
        _ => parse_date(trimmed),
    }
}

/// Разбирает время операции.
pub fn parse_time(value: &str) -> Result<NaiveTime, ExtractError> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ExtractError::MalformedDate {
            value: trimmed.to_string(),
        })
}

/// Переводит сумму в другую валюту по курсу с округлением до минимальной единицы.
pub fn convert_amount(amount: i64, rate: Decimal) -> Option<i64> {
    Decimal::from(amount)
        .checked_mul(rate)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Обратный курс с точностью до 10 знаков.
pub fn inverse_rate(rate: Decimal) -> Option<Decimal> {
    Decimal::ONE
        .checked_div(rate)
        .map(|inverse| inverse.round_dp_with_strategy(10, RoundingStrategy::MidpointNearestEven))
}
