//! Deutsche Bank: покупка, продажа и дивиденды.

use super::tax_from_gross;
use crate::builder::TransactionDraft;
use crate::error::ExtractError;
use crate::parser::ParsedData;
use crate::rules::{BlockRule, DocumentRule, Institution, Section, TransactionRule};
use crate::types::{NumberLocale, TransactionKind};

const AMOUNT: &str = r"[\d.]+,\d+";

/// Правила Deutsche Bank.
pub fn deutsche_bank() -> Institution {
    Institution::new("Deutsche Bank")
        .identifier("Deutsche Bank")
        .locale(NumberLocale::German)
        .document(trade("Kauf", TransactionKind::Purchase))
        .document(trade("Verkauf", TransactionKind::Sale))
        .document(dividend("Dividendengutschrift"))
        .document(dividend("Ertragsgutschrift"))
}

fn security() -> Section {
    Section::new(["name", "wkn", "isin", "security_currency"])
        .find("Filialnummer Depotnummer Wertpapierbezeichnung Seite")
        .pattern(r".{15}(?<name>.*)")
        .pattern(r"WKN (?<wkn>[^ ]*) .*")
        .pattern(r"ISIN (?<isin>[^ ]*) Kurs (?<security_currency>[A-Z]{3}) .*")
}

fn fee(label: &str) -> Section {
    Section::new(["fee_currency", "fee"])
        .pattern(format!("{label} (?<fee_currency>[A-Z]{{3}}) (?<fee>-?{AMOUNT})"))
        .optional()
}

fn tax(label: &str) -> Section {
    Section::new(["tax_currency", "tax"])
        .pattern(format!("{label} (?<tax_currency>[A-Z]{{3}}) (?<tax>-?{AMOUNT})"))
        .optional()
}

fn trade(action: &str, kind: TransactionKind) -> DocumentRule {
    let transaction = TransactionRule::new(kind)
        .section(security())
        .section(Section::new(["shares"]).pattern(r"WKN [^ ]* Nominal ST (?<shares>\d+(,\d+)?)"))
        .section(
            Section::new(["gross_currency", "gross"])
                .pattern(format!("Kurswert (?<gross_currency>[A-Z]{{3}}) (?<gross>-?{AMOUNT})"))
                .optional(),
        )
        .section(Section::new(["date", "currency", "amount"]).pattern(format!(
            r"Buchung auf Kontonummer [\d ]* mit Wertstellung (?<date>\d+\.\d+\.\d{{4}}) (?<currency>[A-Z]{{3}}) (?<amount>{AMOUNT})"
        )))
        .section(fee(r"Provision( \([0-9,]* %\))?"))
        .section(fee("Weitere Provision der Bank bei der börslichen Orderausführung"))
        .section(fee("XETRA-Kosten"))
        .section(fee("Fremde Spesen und Auslagen"))
        .section(tax("Kapitalertragsteuer"))
        .section(tax("Solidaritätszuschlag auf Kapitalertragsteuer"))
        .section(tax("Kirchensteuer"));

    DocumentRule::new(format!("{action} von Wertpapieren"))
        .block(BlockRule::new(format!("Abrechnung: {action} von Wertpapieren"), transaction))
}

/// Валовая сумма с удержанным налогом, равным разнице с суммой к зачислению.
fn gross_with_withholding(draft: &mut TransactionDraft, data: &ParsedData) -> Result<(), ExtractError> {
    draft.apply(data)?;
    tax_from_gross(draft)
}

fn dividend(title: &str) -> DocumentRule {
    let transaction = TransactionRule::new(TransactionKind::Dividend)
        .section(
            Section::new(["shares", "wkn", "isin", "name", "security_currency"])
                .find("Stück WKN ISIN")
                .pattern(r"(?<shares>\d+,\d*) (?<wkn>\S*) (?<isin>\S*)")
                .pattern(r"(?<name>.*)")
                .pattern(format!(r"Bruttoertrag {AMOUNT} (?<security_currency>[A-Z]{{3}}).*")),
        )
        .section(Section::new(["date", "amount", "currency"]).pattern(format!(
            r"Gutschrift mit Wert (?<date>\d+\.\d+\.\d{{4}}) (?<amount>{AMOUNT}) (?<currency>[A-Z]{{3}})"
        )))
        .optional_one_of(vec![
            Section::new([
                "fx_gross",
                "fx_currency",
                "gross",
                "gross_currency",
                "term_currency",
                "base_currency",
                "exchange_rate",
            ])
            .id("forex_gross")
            .pattern(format!(
                "Bruttoertrag (?<fx_gross>{AMOUNT}) (?<fx_currency>[A-Z]{{3}}) (?<gross>{AMOUNT}) (?<gross_currency>[A-Z]{{3}})"
            ))
            .pattern(r"Umrechnungskurs (?<term_currency>[A-Z]{3}) zu (?<base_currency>[A-Z]{3}) (?<exchange_rate>[\d.]+,\d+)")
            .assign(gross_with_withholding),
            Section::new(["gross", "gross_currency"])
                .id("gross")
                .pattern(format!("Bruttoertrag (?<gross>{AMOUNT}) (?<gross_currency>[A-Z]{{3}})"))
                .assign(gross_with_withholding),
        ]);

    DocumentRule::new(title).block(BlockRule::new(title, transaction))
}
