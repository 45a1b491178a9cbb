//! Swissquote: биржевые сделки, дивиденды и депозитарные комиссии.

use super::tax_from_gross;
use crate::builder::TransactionDraft;
use crate::error::ExtractError;
use crate::parser::ParsedData;
use crate::rules::{BlockRule, DocumentRule, Institution, Section, TransactionRule};
use crate::types::{NumberLocale, TransactionKind};
use crate::utils::convert_amount;

const AMOUNT: &str = r"[\d',.]*";

/// Правила Swissquote.
pub fn swissquote() -> Institution {
    Institution::new("Swissquote")
        .identifier("Swissquote")
        .locale(NumberLocale::Swiss)
        .document(trade())
        .document(dividend("Dividende"))
        .document(dividend("Kapitalgewinn"))
        .document(custody_fee())
}

fn charge(label: &str, tax: bool) -> Section {
    let (value, currency) = if tax { ("tax", "tax_currency") } else { ("fee", "fee_currency") };
    Section::new([currency, value])
        .pattern(format!("{label} (?<{currency}>[A-Z]{{3}}) (?<{value}>{AMOUNT})"))
        .optional()
}

/// Курс иногда печатается в масштабе (DKK/CHF 15.42 вместо 0.1542).
/// Если он не сходится с суммами, курс выводится из них.
fn forex_total(draft: &mut TransactionDraft, data: &ParsedData) -> Result<(), ExtractError> {
    draft.apply(data)?;
    let scaled = match (&draft.fx_gross, &draft.gross, &draft.exchange_rate) {
        (Some(fx_gross), Some(gross), Some(rate)) => convert_amount(fx_gross.amount, rate.rate)
            .is_none_or(|value| (value - gross.amount).abs() > 1),
        _ => false,
    };
    if scaled {
        draft.exchange_rate = None;
    }
    Ok(())
}

fn trade() -> DocumentRule {
    let transaction = TransactionRule::new(TransactionKind::Purchase)
        .type_value("Kauf", TransactionKind::Purchase)
        .type_value("Verkauf", TransactionKind::Sale)
        .section(Section::new(["type"]).pattern(r"Börsentransaktion: (?<type>Kauf|Verkauf) .*"))
        .section(
            Section::new(["name", "isin", "shares", "security_currency", "currency", "amount"])
                .find("Titel Ort der Ausführung")
                .pattern(r"(?<name>.*) ISIN: (?<isin>\S*) .*")
                .pattern(format!(
                    r"(?<shares>{AMOUNT}) {AMOUNT} (?<security_currency>[A-Z]{{3}}) {AMOUNT}"
                ))
                .pattern(format!(
                    "Zu Ihren (Lasten|Gunsten) (?<currency>[A-Z]{{3}}) (?<amount>{AMOUNT})"
                )),
        )
        .section(charge("Kommission Swissquote Bank AG", false))
        .section(charge(r"Abgabe \(Eidg\. Stempelsteuer\)", true))
        .section(charge("Börsengebühren", false))
        .optional_one_of(vec![
            Section::new(["fx_currency", "fx_gross", "exchange_rate", "gross_currency", "gross"])
                .id("forex")
                .pattern(format!("Total (?<fx_currency>[A-Z]{{3}}) (?<fx_gross>{AMOUNT})"))
                .pattern(format!("Wechselkurs (?<exchange_rate>{AMOUNT})"))
                .pattern(format!("(?<gross_currency>[A-Z]{{3}}) (?<gross>{AMOUNT})"))
                .assign(forex_total),
            Section::new(["gross_currency", "gross"])
                .id("total")
                .pattern(format!("Total (?<gross_currency>[A-Z]{{3}}) (?<gross>{AMOUNT})")),
        ])
        .section(Section::new(["date"]).pattern(
            r"Betrag (belastet auf|gutgeschrieben auf Ihrer) Kontonummer\s+\d+,\s+Valutadatum\s(?<date>\d+\.\d+\.\d{4})",
        ));

    DocumentRule::new("Börsentransaktion: (Kauf|Verkauf)")
        .block(BlockRule::new("Börsentransaktion: (Kauf|Verkauf) .*", transaction))
}

fn dividend(title: &str) -> DocumentRule {
    let transaction = TransactionRule::new(TransactionKind::Dividend)
        .section(Section::new(["name", "isin"]).pattern(r"(?<name>.*) ISIN: (?<isin>\S*) NKN: .*"))
        .section(Section::new(["date"]).pattern(r"Ausführungsdatum (?<date>\d+\.\d+\.\d{4})"))
        .section(
            Section::new(["shares", "gross_currency", "gross", "currency", "amount"])
                .pattern(format!("Anzahl (?<shares>{AMOUNT})"))
                .pattern(format!("Betrag (?<gross_currency>[A-Z]{{3}}) (?<gross>{AMOUNT})"))
                .pattern(format!("Total (?<currency>[A-Z]{{3}}) (?<amount>{AMOUNT})")),
        )
        .conclude(tax_from_gross);

    let start = format!("{title} Unsere Referenz.*");
    DocumentRule::new(format!("{title} Unsere Referenz")).block(BlockRule::new(start, transaction))
}

fn custody_fee() -> DocumentRule {
    let transaction = TransactionRule::new(TransactionKind::Fee).section(
        Section::new(["date", "currency", "amount"])
            .pattern(r"Valutadatum (?<date>\d+\.\d+\.\d{4})")
            .pattern(format!("Betrag belastet (?<currency>[A-Z]{{3}}) (?<amount>{AMOUNT})")),
    );
    DocumentRule::new("Depotgebühren Unsere Referenz")
        .block(BlockRule::new("Depotgebühren Unsere Referenz.*", transaction))
}
