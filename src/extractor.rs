//! Сборка правил и извлечение операций из одной выписки.

use crate::error::{ExtractError, ItemError};
use crate::institutions;
use crate::parser::{CompiledInstitution, MatchedBlock};
use crate::raw::{NormalizedText, RawStatement};
use crate::resolver::SecurityRegistry;
use crate::rules::Institution;
use crate::types::{Extraction, Item};
use crate::validate::validate;
use tracing::{debug, info, warn};

/// Набор флагов, определяющий состав учреждений и фильтрацию (внутренний тип).
#[derive(Debug, Clone)]
pub(crate) struct ExtractOptions {
    pub include_builtin: bool,
    pub only: Option<Vec<String>>,
    pub skip_empty: bool,
}

impl ExtractOptions {
    /// Встроенные учреждения, без фильтров.
    pub const fn defaults() -> Self {
        Self {
            include_builtin: true,
            only: None,
            skip_empty: false,
        }
    }
}

/// Builder для настройки [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractorBuilder {
    options: ExtractOptions,
    institutions: Vec<Institution>,
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorBuilder {
    /// Создаёт builder со встроенными учреждениями.
    ///
    /// # Пример
    ///
    /// ```
    /// # use statement_import::ExtractorBuilder;
    /// let extractor = ExtractorBuilder::new()
    ///     .only(&["Swissquote"])
    ///     .skip_empty(true)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(extractor.labels().collect::<Vec<_>>(), ["Swissquote"]);
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self {
            options: ExtractOptions::defaults(),
            institutions: Vec::new(),
        }
    }

    /// Включает или отключает встроенные учреждения.
    #[inline]
    #[must_use]
    pub const fn builtin(mut self, enabled: bool) -> Self {
        self.options.include_builtin = enabled;
        self
    }

    /// Регистрирует собственное учреждение. Оно проверяется раньше встроенных.
    #[must_use]
    pub fn institution(mut self, institution: Institution) -> Self {
        self.institutions.push(institution);
        self
    }

    /// Оставляет только учреждения с указанными метками.
    #[must_use]
    pub fn only<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        self.options.only = Some(labels.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }

    /// Пропускает операции с нулевой суммой.
    #[inline]
    #[must_use]
    pub const fn skip_empty(mut self, enabled: bool) -> Self {
        self.options.skip_empty = enabled;
        self
    }

    /// Компилирует правила.
    pub fn build(self) -> Result<Extractor, ExtractError> {
        let mut all = self.institutions;
        if self.options.include_builtin {
            all.extend(institutions::builtin());
        }

        if let Some(only) = &self.options.only {
            if let Some(unknown) = only.iter().find(|label| !all.iter().any(|i| &i.label == *label)) {
                return Err(ExtractError::InvalidRule(format!(
                    "unknown institution '{unknown}'"
                )));
            }
            all.retain(|institution| only.contains(&institution.label));
        }

        let institutions = all
            .iter()
            .map(CompiledInstitution::compile)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = institutions.len(), "institution rules compiled");
        Ok(Extractor {
            institutions,
            skip_empty: self.options.skip_empty,
        })
    }
}

/// Извлекатель операций со скомпилированными правилами учреждений.
#[derive(Debug)]
pub struct Extractor {
    institutions: Vec<CompiledInstitution>,
    skip_empty: bool,
}

impl Extractor {
    /// Извлекатель со встроенными учреждениями и настройками по умолчанию.
    #[inline]
    pub fn new() -> Result<Self, ExtractError> {
        ExtractorBuilder::new().build()
    }

    /// Метки учреждений в порядке проверки.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.institutions.iter().map(|i| i.label.as_str())
    }

    /// Разбирает выписку. Ошибки отдельных блоков собираются в результат,
    /// разбор остальных блоков продолжается.
    pub fn extract(&self, raw: &RawStatement, registry: &mut SecurityRegistry) -> Extraction {
        let file_name = raw.file_name.as_str();
        let normalized = NormalizedText::new(&raw.text);
        let text = normalized.joined();
        let mut extraction = Extraction {
            file_name: file_name.to_string(),
            ..Extraction::default()
        };

        let Some(institution) = self.institutions.iter().find(|i| i.accepts(&text)) else {
            warn!(file = file_name, "no institution recognizes the statement");
            extraction
                .errors
                .push(ItemError::for_file(file_name, ExtractError::UnsupportedDocument));
            return extraction;
        };
        extraction.institution = Some(institution.label.clone());

        let blocks = institution.parse(file_name, &text, normalized.lines());
        if blocks.is_empty() {
            warn!(file = file_name, institution = %institution.label, "no transaction blocks found");
            extraction.errors.push(ItemError::for_file(
                file_name,
                ExtractError::PatternNotMatched {
                    section: institution.label.clone(),
                    matched: 0,
                    expected: 1,
                },
            ));
            return extraction;
        }

        for block in blocks {
            let result =
                block.and_then(|block| self.finish(block, file_name, registry, &mut extraction.items));
            if let Err(err) = result {
                warn!("{err}");
                extraction.errors.push(err);
            }
        }

        info!(
            file = file_name,
            institution = %institution.label,
            items = extraction.items.len(),
            errors = extraction.errors.len(),
            "statement extracted"
        );
        extraction
    }

    /// Собирает, проверяет операцию и привязывает её к бумаге реестра.
    fn finish(
        &self,
        block: MatchedBlock,
        file_name: &str,
        registry: &mut SecurityRegistry,
        items: &mut Vec<Item>,
    ) -> Result<(), ItemError> {
        let (start, end) = (block.start, block.end);
        let wrap = |err| ItemError::for_block(file_name, start, end, err);

        let (mut tx, hints) = block.draft.build(file_name).map_err(wrap)?;
        if self.skip_empty && tx.amount.amount == 0 {
            debug!(file = file_name, line = start + 1, "skipping zero amount transaction");
            return Ok(());
        }
        validate(&tx).map_err(wrap)?;

        if let Some(hints) = hints {
            let resolution = registry.resolve(&hints, &tx.amount.currency).map_err(wrap)?;
            if resolution.created {
                if let Some(security) = registry.get(resolution.id) {
                    items.push(Item::Security {
                        id: resolution.id,
                        security: security.clone(),
                    });
                }
            }
            tx.security = Some(resolution.id);
        }
        items.push(Item::Transaction(tx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BlockRule, DocumentRule, Section, TransactionRule};
    use crate::types::{NumberLocale, TransactionKind};

    fn cash_bank() -> Institution {
        Institution::new("Cash Bank")
            .identifier("Cash Bank")
            .locale(NumberLocale::English)
            .document(
                DocumentRule::new("Account statement").block(BlockRule::new(
                    r"\d{4}-\d{2}-\d{2} (Deposit|Withdrawal) .*",
                    TransactionRule::new(TransactionKind::Deposit)
                        .type_value("Deposit", TransactionKind::Deposit)
                        .type_value("Withdrawal", TransactionKind::Removal)
                        .section(Section::new(["date", "type", "amount", "currency"]).pattern(
                            r"(?<date>\d{4}-\d{2}-\d{2}) (?<type>\w+) (?<amount>[\d,.]+) (?<currency>[A-Z]{3})",
                        )),
                )),
            )
    }

    fn extractor() -> Extractor {
        ExtractorBuilder::new()
            .builtin(false)
            .institution(cash_bank())
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_documents_are_reported_once() {
        let raw = RawStatement::from_str("other.txt", "Some unrelated letter");
        let extraction = extractor().extract(&raw, &mut SecurityRegistry::new());
        assert!(extraction.items.is_empty());
        assert_eq!(extraction.errors.len(), 1);
        assert!(matches!(extraction.errors[0].error, ExtractError::UnsupportedDocument));
        assert!(extraction.institution.is_none());
    }

    #[test]
    fn recognized_document_without_blocks_is_pattern_error() {
        let raw = RawStatement::from_str("empty.txt", "Cash Bank\nAccount statement\nno entries");
        let extraction = extractor().extract(&raw, &mut SecurityRegistry::new());
        assert_eq!(extraction.institution.as_deref(), Some("Cash Bank"));
        assert!(matches!(
            extraction.errors[0].error,
            ExtractError::PatternNotMatched { .. }
        ));
    }

    #[test]
    fn skip_empty_drops_zero_amounts() {
        let text = "Cash Bank\nAccount statement\n2024-03-20 Deposit 0.00 EUR\n2024-03-21 Withdrawal 10.00 EUR";
        let raw = RawStatement::from_str("s.txt", text);
        let extractor = ExtractorBuilder::new()
            .builtin(false)
            .institution(cash_bank())
            .skip_empty(true)
            .build()
            .unwrap();
        let extraction = extractor.extract(&raw, &mut SecurityRegistry::new());
        let kinds: Vec<_> = extraction.transactions().map(|t| t.kind).collect();
        assert_eq!(kinds, [TransactionKind::Removal]);
    }

    #[test]
    fn oversized_amount_fails_only_its_block() {
        let text = "Cash Bank\nAccount statement\n2024-03-20 Deposit 9999999999999999999999999999 EUR\n2024-03-21 Withdrawal 10.00 EUR";
        let raw = RawStatement::from_str("big.txt", text);
        let extraction = extractor().extract(&raw, &mut SecurityRegistry::new());

        assert_eq!(extraction.errors.len(), 1);
        assert_eq!(extraction.errors[0].lines, Some((3, 3)));
        assert!(matches!(
            extraction.errors[0].error,
            ExtractError::MalformedAmount { ref field, .. } if field == "amount"
        ));
        let txs: Vec<_> = extraction
            .transactions()
            .map(|t| (t.kind, t.amount.amount))
            .collect();
        assert_eq!(txs, [(TransactionKind::Removal, 1_000)]);
    }

    #[test]
    fn only_rejects_unknown_labels() {
        let err = ExtractorBuilder::new().only(&["Nope"]).build().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRule(_)));

        let extractor = ExtractorBuilder::new().only(&["Deutsche Bank"]).build().unwrap();
        assert_eq!(extractor.labels().collect::<Vec<_>>(), ["Deutsche Bank"]);
    }

    #[test]
    fn custom_institutions_come_first() {
        let extractor = ExtractorBuilder::new().institution(cash_bank()).build().unwrap();
        assert_eq!(extractor.labels().next(), Some("Cash Bank"));
        assert!(extractor.labels().count() > 1);
    }
}
