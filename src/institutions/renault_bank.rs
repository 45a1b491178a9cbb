//! Renault Bank direkt: выписки по счёту в двух форматах.

use crate::rules::{BlockRule, DocumentRule, Institution, Section, TransactionRule};
use crate::types::{NumberLocale, TransactionKind};

const DEPOSIT_2021: &str = r"(?<date>\d{2}\.\d{2}\.) \d{2}\.\d{2}\. .*gutschr\.?\s*(?<amount>[.,\d]+) H";
const REMOVAL_2021: &str = r"(?<date>\d{2}\.\d{2}\.) \d{2}\.\d{2}\. (Umbuchung|.*berweisungsauftrag)\s*(?<amount>[.,\d]+) S";
const INTEREST_2021: &str = r"(?<date>\d{2}\.\d{2}\.) \d{2}\.\d{2}\. Abschluss\s*(?<amount>[.,\d]+) H";
const INTEREST_CHARGE_2021: &str = r"(?<date>\d{2}\.\d{2}\.) \d{2}\.\d{2}\. Storno Abschluss\s*(?<amount>[.,\d]+) S";

const DEPOSIT_AT: &str = r"(?<date>\d{2}\.\d{2}\.\d{4}) Zahlungseingang \w+ (?<amount>[.,\d]+) .*";
const REMOVAL_AT: &str = r"(?<date>\d{2}\.\d{2}\.\d{4}) .berweisung \w+ -(?<amount>[.,\d]+) .*";
const INTEREST_AT: &str = r"(?<date>\d{2}\.\d{2}\.\d{4}) \w+zinsen \w+ (?<amount>[.,\d]+) .*";
const TAXES_AT: &str = r"(?<date>\d{2}\.\d{2}\.\d{4}) Kapitalertragsteuer \w+ -(?<amount>[.,\d]+) .*";

/// Правила Renault Bank direkt.
pub fn renault_bank() -> Institution {
    Institution::new("Renault Bank direkt")
        .identifier("Renault Bank direkt")
        .identifier("305 200 37")
        .locale(NumberLocale::German)
        .document(statement_2021())
        .document(statement_at())
}

/// Блок из одной строки выписки; дата и валюта дополняются контекстом.
fn entry(pattern: &str, kind: TransactionKind, context: &[&str]) -> BlockRule {
    BlockRule::new(
        pattern,
        TransactionRule::new(kind).section(
            Section::new(["date", "amount"])
                .pattern(pattern)
                .document_context(context.iter().copied()),
        ),
    )
    .max_size(1)
}

fn statement_2021() -> DocumentRule {
    let context = ["year", "currency"];
    DocumentRule::new("[A-Z]{3}-Konto Kontonummer")
        .context(Section::new(["year"]).pattern(r".*Kontoauszug Nr\.\s*\d+/(?<year>\d{4}).*"))
        .context(Section::new(["currency"]).pattern(r"(?<currency>[A-Z]{3})-Konto Kontonummer.*"))
        .block(entry(DEPOSIT_2021, TransactionKind::Deposit, &context))
        .block(entry(REMOVAL_2021, TransactionKind::Removal, &context))
        .block(entry(INTEREST_2021, TransactionKind::Interest, &context))
        .block(entry(INTEREST_CHARGE_2021, TransactionKind::InterestCharge, &context))
}

fn statement_at() -> DocumentRule {
    let context = ["currency"];
    DocumentRule::new("IBAN AT")
        .context(Section::new(["currency"]).pattern(r".* Betrag in (?<currency>[A-Z]{3}) .*"))
        .block(entry(DEPOSIT_AT, TransactionKind::Deposit, &context))
        .block(entry(REMOVAL_AT, TransactionKind::Removal, &context))
        .block(entry(INTEREST_AT, TransactionKind::Interest, &context))
        .block(entry(TAXES_AT, TransactionKind::Taxes, &context))
}
