//! Скомпилированные правила и сопоставление строк выписки с секциями.

use std::collections::{BTreeMap, HashSet};

use crate::builder::TransactionDraft;
use crate::error::{ExtractError, ItemError};
use crate::rules::{
    Assign, BlockRule, ConcludeFn, DocumentRule, Institution, Pattern, Section, SectionRule,
    TransactionRule,
};
use crate::types::{NumberLocale, TransactionKind};
use regex::Regex;
use tracing::debug;

/// Значения, извлечённые одной секцией, и границы её блока.
#[derive(Debug, Clone, Default)]
pub struct ParsedData {
    values: BTreeMap<String, String>,
    start_line: usize,
    end_line: usize,
    file_name: String,
}

impl ParsedData {
    /// Значения из пар «имя, значение» (для собственных обработчиков и тестов).
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// Значение атрибута.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Все значения секции.
    #[inline]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Первая строка блока (с нуля).
    #[inline]
    pub const fn start_line(&self) -> usize {
        self.start_line
    }

    /// Последняя строка блока (с нуля).
    #[inline]
    pub const fn end_line(&self) -> usize {
        self.end_line
    }

    /// Имя файла выписки.
    #[inline]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Значения, общие для всего документа (год выписки, валюта счёта).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DocumentContext(BTreeMap<String, String>);

impl DocumentContext {
    fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }
}

/// Получатель значений секции: черновик операции или контекст документа.
trait SectionTarget: Clone {
    fn accept(&mut self, assign: Assign, data: &ParsedData) -> Result<(), ExtractError>;
}

impl SectionTarget for TransactionDraft {
    fn accept(&mut self, assign: Assign, data: &ParsedData) -> Result<(), ExtractError> {
        match assign {
            Assign::Fields => self.apply(data),
            Assign::With(hook) => hook(self, data),
        }
    }
}

impl SectionTarget for DocumentContext {
    fn accept(&mut self, _assign: Assign, data: &ParsedData) -> Result<(), ExtractError> {
        self.0
            .extend(data.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// Диапазон строк и файл, которые разбирает секция.
#[derive(Clone, Copy)]
struct Span<'a> {
    lines: &'a [String],
    start: usize,
    end: usize,
    file_name: &'a str,
}

fn compile(pattern: &str, source: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|err| ExtractError::InvalidPattern {
        pattern: source.to_string(),
        source: err,
    })
}

/// Шаблон строки целиком.
fn compile_line(pattern: &str) -> Result<Regex, ExtractError> {
    compile(&format!("^(?:{pattern})$"), pattern)
}

/// Шаблон поиска в любом месте текста.
fn compile_search(pattern: &str) -> Result<Regex, ExtractError> {
    compile(&format!("(?m){pattern}"), pattern)
}

#[derive(Debug)]
struct CompiledSection {
    label: String,
    attributes: Vec<String>,
    patterns: Vec<Regex>,
    optional: bool,
    multiple_times: bool,
    document_context: Vec<String>,
    assign: Assign,
}

impl CompiledSection {
    fn compile(section: &Section) -> Result<Self, ExtractError> {
        if section.patterns.is_empty() {
            return Err(ExtractError::InvalidRule(format!(
                "section [{}] has no patterns",
                section.attributes.join(", ")
            )));
        }
        let patterns = section
            .patterns
            .iter()
            .map(|pattern| match pattern {
                Pattern::Find(text) => compile_line(&regex::escape(text)),
                Pattern::Match(regex) => compile_line(regex),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let label = section.id.clone().unwrap_or_else(|| {
            if section.attributes.is_empty() {
                patterns
                    .first()
                    .map(|re| re.as_str().to_string())
                    .unwrap_or_default()
            } else {
                format!("[{}]", section.attributes.join(", "))
            }
        });
        Ok(Self {
            label,
            attributes: section.attributes.clone(),
            patterns,
            optional: section.optional,
            multiple_times: section.multiple_times,
            document_context: section.document_context.clone(),
            assign: section.assign,
        })
    }

    fn parse<T: SectionTarget>(
        &self,
        span: Span<'_>,
        context: &DocumentContext,
        target: &mut T,
    ) -> Result<(), ExtractError> {
        let mut values = BTreeMap::new();
        let mut pattern_no = 0;
        let mut found = false;

        let lines = span.lines.iter().enumerate().take(span.end + 1).skip(span.start);
        for (line_no, line) in lines {
            let re = &self.patterns[pattern_no];
            let Some(caps) = re.captures(line) else {
                continue;
            };
            for attribute in &self.attributes {
                if let Some(value) = caps.name(attribute) {
                    values.insert(attribute.clone(), value.as_str().to_string());
                }
            }
            pattern_no += 1;
            if pattern_no < self.patterns.len() {
                continue;
            }

            if let Some(missing) = self.attributes.iter().find(|a| !values.contains_key(*a)) {
                return Err(ExtractError::MissingField {
                    field: missing.clone(),
                });
            }
            for key in &self.document_context {
                let value = context.get(key).ok_or_else(|| ExtractError::MissingField {
                    field: key.clone(),
                })?;
                values.insert(key.clone(), value.clone());
            }

            debug!(section = %self.label, line = line_no + 1, "section matched");
            let data = ParsedData {
                values: std::mem::take(&mut values),
                start_line: span.start,
                end_line: span.end,
                file_name: span.file_name.to_string(),
            };
            target.accept(self.assign, &data)?;

            if !self.multiple_times {
                return Ok(());
            }
            found = true;
            pattern_no = 0;
        }

        if found || self.optional {
            Ok(())
        } else {
            Err(ExtractError::PatternNotMatched {
                section: self.label.clone(),
                matched: pattern_no,
                expected: self.patterns.len(),
            })
        }
    }
}

#[derive(Debug)]
enum CompiledSectionRule {
    Single(CompiledSection),
    OneOf {
        optional: bool,
        alternatives: Vec<CompiledSection>,
    },
}

impl CompiledSectionRule {
    fn compile(rule: &SectionRule) -> Result<Self, ExtractError> {
        Ok(match rule {
            SectionRule::Single(section) => Self::Single(CompiledSection::compile(section)?),
            SectionRule::OneOf {
                optional,
                alternatives,
            } => {
                if alternatives.is_empty() {
                    return Err(ExtractError::InvalidRule(
                        "one_of without alternatives".to_string(),
                    ));
                }
                Self::OneOf {
                    optional: *optional,
                    alternatives: alternatives
                        .iter()
                        .map(CompiledSection::compile)
                        .collect::<Result<_, _>>()?,
                }
            }
        })
    }

    fn parse<T: SectionTarget>(
        &self,
        span: Span<'_>,
        context: &DocumentContext,
        target: &mut T,
    ) -> Result<(), ExtractError> {
        let (optional, alternatives) = match self {
            Self::Single(section) => return section.parse(span, context, target),
            Self::OneOf {
                optional,
                alternatives,
            } => (*optional, alternatives),
        };

        let mut messages = Vec::with_capacity(alternatives.len());
        for section in alternatives {
            let mut candidate = target.clone();
            match section.parse(span, context, &mut candidate) {
                Ok(()) => {
                    *target = candidate;
                    return Ok(());
                }
                Err(err) => messages.push(err.to_string()),
            }
        }

        if optional {
            Ok(())
        } else {
            Err(ExtractError::NoAlternativeMatched {
                count: alternatives.len(),
                details: messages.join("; "),
            })
        }
    }
}

#[derive(Debug)]
struct CompiledTransaction {
    kind: TransactionKind,
    type_map: Vec<(String, TransactionKind)>,
    sections: Vec<CompiledSectionRule>,
    concludes: Vec<ConcludeFn>,
}

impl CompiledTransaction {
    fn compile(rule: &TransactionRule) -> Result<Self, ExtractError> {
        let mut ids = HashSet::new();
        for id in rule.sections.iter().flat_map(SectionRule::ids) {
            if !ids.insert(id) {
                return Err(ExtractError::InvalidRule(format!("duplicate section id {id}")));
            }
        }
        Ok(Self {
            kind: rule.kind,
            type_map: rule.type_map.clone(),
            sections: rule
                .sections
                .iter()
                .map(CompiledSectionRule::compile)
                .collect::<Result<_, _>>()?,
            concludes: rule.concludes.clone(),
        })
    }

    fn parse(
        &self,
        span: Span<'_>,
        context: &DocumentContext,
        locale: NumberLocale,
    ) -> Result<TransactionDraft, ExtractError> {
        let mut draft = TransactionDraft::new(self.kind, locale).with_type_map(self.type_map.clone());
        for section in &self.sections {
            section.parse(span, context, &mut draft)?;
        }
        for conclude in &self.concludes {
            conclude(&mut draft)?;
        }
        Ok(draft)
    }
}

#[derive(Debug)]
struct CompiledBlock {
    starts_with: Regex,
    ends_with: Option<Regex>,
    max_size: Option<usize>,
    transaction: CompiledTransaction,
}

impl CompiledBlock {
    fn compile(rule: &BlockRule) -> Result<Self, ExtractError> {
        if rule.max_size == Some(0) {
            return Err(ExtractError::InvalidRule(format!(
                "block '{}' has zero max_size",
                rule.starts_with
            )));
        }
        Ok(Self {
            starts_with: compile_line(&rule.starts_with)?,
            ends_with: rule.ends_with.as_deref().map(compile_line).transpose()?,
            max_size: rule.max_size,
            transaction: CompiledTransaction::compile(&rule.transaction)?,
        })
    }

    /// Границы блоков `[start, end]` в тексте.
    fn ranges(&self, lines: &[String]) -> Vec<(usize, usize)> {
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| self.starts_with.is_match(line))
            .map(|(idx, _)| idx)
            .collect();

        let mut ranges = Vec::with_capacity(starts.len());
        for (pos, &start) in starts.iter().enumerate() {
            let mut end = starts.get(pos + 1).map_or(lines.len() - 1, |next| next - 1);
            if let Some(ends_with) = &self.ends_with {
                match (start..=end).find(|&idx| ends_with.is_match(&lines[idx])) {
                    Some(idx) => end = idx,
                    None => continue,
                }
            }
            if let Some(max_size) = self.max_size {
                end = end.min(start + max_size - 1);
            }
            ranges.push((start, end));
        }
        ranges
    }
}

/// Черновик операции, разобранный из блока строк.
#[derive(Debug)]
pub(crate) struct MatchedBlock {
    pub draft: TransactionDraft,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
struct CompiledDocument {
    must_include: Vec<Regex>,
    must_not_include: Vec<Regex>,
    context: Vec<CompiledSectionRule>,
    blocks: Vec<CompiledBlock>,
}

impl CompiledDocument {
    fn compile(rule: &DocumentRule) -> Result<Self, ExtractError> {
        Ok(Self {
            must_include: rule
                .must_include
                .iter()
                .map(|p| compile_search(p))
                .collect::<Result<_, _>>()?,
            must_not_include: rule
                .must_not_include
                .iter()
                .map(|p| compile_search(p))
                .collect::<Result<_, _>>()?,
            context: rule
                .context
                .iter()
                .map(CompiledSectionRule::compile)
                .collect::<Result<_, _>>()?,
            blocks: rule
                .blocks
                .iter()
                .map(CompiledBlock::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    fn applies(&self, text: &str) -> bool {
        self.must_include.iter().all(|re| re.is_match(text))
            && !self.must_not_include.iter().any(|re| re.is_match(text))
    }

    fn parse_context(&self, span: Span<'_>) -> Result<DocumentContext, ExtractError> {
        let mut context = DocumentContext::default();
        for section in &self.context {
            let snapshot = context.clone();
            section.parse(span, &snapshot, &mut context)?;
        }
        Ok(context)
    }

    fn parse(
        &self,
        file_name: &str,
        lines: &[String],
        locale: NumberLocale,
    ) -> Vec<Result<MatchedBlock, ItemError>> {
        if lines.is_empty() {
            return Vec::new();
        }
        let whole = Span {
            lines,
            start: 0,
            end: lines.len() - 1,
            file_name,
        };
        let context = match self.parse_context(whole) {
            Ok(context) => context,
            Err(err) => return vec![Err(ItemError::for_file(file_name, err))],
        };

        let mut results = Vec::new();
        for block in &self.blocks {
            for (start, end) in block.ranges(lines) {
                debug!(file = file_name, start = start + 1, end = end + 1, "parsing block");
                let span = Span {
                    lines,
                    start,
                    end,
                    file_name,
                };
                let result = block
                    .transaction
                    .parse(span, &context, locale)
                    .map(|draft| MatchedBlock { draft, start, end })
                    .map_err(|err| ItemError::for_block(file_name, start, end, err));
                results.push(result);
            }
        }
        results
    }
}

/// Учреждение с заранее скомпилированными шаблонами.
#[derive(Debug)]
pub(crate) struct CompiledInstitution {
    pub label: String,
    identifiers: Vec<String>,
    locale: NumberLocale,
    documents: Vec<CompiledDocument>,
}

impl CompiledInstitution {
    pub fn compile(institution: &Institution) -> Result<Self, ExtractError> {
        Ok(Self {
            label: institution.label.clone(),
            identifiers: institution.identifiers.clone(),
            locale: institution.locale,
            documents: institution
                .documents
                .iter()
                .map(CompiledDocument::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Текст содержит хотя бы один идентификатор (пустой список подходит всегда).
    pub fn identifies(&self, text: &str) -> bool {
        self.identifiers.is_empty() || self.identifiers.iter().any(|id| text.contains(id.as_str()))
    }

    /// Учреждение распознаёт текст и знает хотя бы один его тип документа.
    pub fn accepts(&self, text: &str) -> bool {
        self.identifies(text) && self.documents.iter().any(|doc| doc.applies(text))
    }

    /// Разбирает все подходящие типы документов.
    pub fn parse(&self, file_name: &str, text: &str, lines: &[String]) -> Vec<Result<MatchedBlock, ItemError>> {
        self.documents
            .iter()
            .filter(|doc| doc.applies(text))
            .flat_map(|doc| doc.parse(file_name, lines, self.locale))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::NormalizedText;

    fn span<'a>(lines: &'a [String]) -> Span<'a> {
        Span {
            lines,
            start: 0,
            end: lines.len() - 1,
            file_name: "test.txt",
        }
    }

    fn draft() -> TransactionDraft {
        TransactionDraft::new(TransactionKind::Deposit, NumberLocale::German)
    }

    #[test]
    fn section_matches_patterns_on_successive_lines() {
        let text = NormalizedText::new("Datum\nirrelevant\n05.03.2020\nBetrag 12,50 EUR");
        let section = CompiledSection::compile(
            &Section::new(["date", "amount", "currency"])
                .find("Datum")
                .pattern(r"(?<date>\d{2}\.\d{2}\.\d{4})")
                .pattern(r"Betrag (?<amount>[\d.,]+) (?<currency>\w{3})"),
        )
        .unwrap();
        let mut target = draft();
        section
            .parse(span(text.lines()), &DocumentContext::default(), &mut target)
            .unwrap();
        assert_eq!(target.amount, Some(1250));
        assert_eq!(target.currency.unwrap().as_str(), "EUR");
    }

    #[test]
    fn patterns_must_match_whole_line() {
        let text = NormalizedText::new("Betrag 12,50 EUR extra");
        let section = CompiledSection::compile(
            &Section::new(["amount"]).pattern(r"Betrag (?<amount>[\d.,]+) EUR"),
        )
        .unwrap();
        let err = section
            .parse(span(text.lines()), &DocumentContext::default(), &mut draft())
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::PatternNotMatched { matched: 0, expected: 1, .. }
        ));
    }

    #[test]
    fn optional_section_may_be_absent() {
        let text = NormalizedText::new("nothing here");
        let section = CompiledSection::compile(
            &Section::new(["fee"]).pattern(r"Provision (?<fee>[\d,]+)").optional(),
        )
        .unwrap();
        let mut target = draft();
        section
            .parse(span(text.lines()), &DocumentContext::default(), &mut target)
            .unwrap();
        assert!(target.fees.is_empty());
    }

    #[test]
    fn multiple_times_collects_every_occurrence() {
        let text = NormalizedText::new("Provision 1,00\nx\nProvision 2,50\nProvision 0,50");
        let section = CompiledSection::compile(
            &Section::new(["fee"])
                .pattern(r"Provision (?<fee>[\d,]+)")
                .multiple_times(),
        )
        .unwrap();
        let mut target = draft();
        section
            .parse(span(text.lines()), &DocumentContext::default(), &mut target)
            .unwrap();
        let fees: Vec<i64> = target.fees.iter().map(|f| f.amount).collect();
        assert_eq!(fees, [100, 250, 50]);
    }

    #[test]
    fn missing_attribute_is_reported() {
        let text = NormalizedText::new("Betrag 12,50");
        let section = CompiledSection::compile(
            &Section::new(["amount", "currency"])
                .pattern(r"Betrag (?<amount>[\d,]+)( (?<currency>\w{3}))?"),
        )
        .unwrap();
        let err = section
            .parse(span(text.lines()), &DocumentContext::default(), &mut draft())
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingField { ref field } if field == "currency"));
    }

    #[test]
    fn document_context_values_are_merged() {
        let text = NormalizedText::new("Kontoauszug Nr. 3/2021\n03.02. Gutschrift 10,00");
        let context_rule = CompiledSectionRule::compile(&SectionRule::Single(
            Section::new(["year"]).pattern(r"Kontoauszug Nr\. \d+/(?<year>\d{4})"),
        ))
        .unwrap();
        let mut context = DocumentContext::default();
        context_rule
            .parse(span(text.lines()), &DocumentContext::default(), &mut context)
            .unwrap();
        assert_eq!(context.get("year").map(String::as_str), Some("2021"));

        let section = CompiledSection::compile(
            &Section::new(["date", "amount"])
                .pattern(r"(?<date>\d{2}\.\d{2}\.) Gutschrift (?<amount>[\d,]+)")
                .document_context(["year"]),
        )
        .unwrap();
        let mut target = draft();
        section.parse(span(text.lines()), &context, &mut target).unwrap();
        assert_eq!(target.date, chrono::NaiveDate::from_ymd_opt(2021, 2, 3));

        let err = section
            .parse(span(text.lines()), &DocumentContext::default(), &mut draft())
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingField { ref field } if field == "year"));
    }

    #[test]
    fn one_of_commits_only_the_winning_alternative() {
        let text = NormalizedText::new("Provision 1,00\nSumme 9,00");
        let rule = CompiledSectionRule::compile(&SectionRule::OneOf {
            optional: false,
            alternatives: vec![
                Section::new(["fee", "amount"])
                    .pattern(r"Provision (?<fee>[\d,]+)")
                    .pattern(r"Total (?<amount>[\d,]+)"),
                Section::new(["amount"]).pattern(r"Summe (?<amount>[\d,]+)"),
            ],
        })
        .unwrap();
        let mut target = draft();
        rule.parse(span(text.lines()), &DocumentContext::default(), &mut target)
            .unwrap();
        assert_eq!(target.amount, Some(900));
        assert!(target.fees.is_empty());
    }

    #[test]
    fn one_of_without_match_reports_all_alternatives() {
        let text = NormalizedText::new("nothing");
        let rule = CompiledSectionRule::compile(&SectionRule::OneOf {
            optional: false,
            alternatives: vec![
                Section::new(["amount"]).id("net").pattern(r"Netto (?<amount>.*)"),
                Section::new(["amount"]).id("total").pattern(r"Total (?<amount>.*)"),
            ],
        })
        .unwrap();
        let err = rule
            .parse(span(text.lines()), &DocumentContext::default(), &mut draft())
            .unwrap_err();
        match err {
            ExtractError::NoAlternativeMatched { count, details } => {
                assert_eq!(count, 2);
                assert!(details.contains("'net'") && details.contains("'total'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn blocks_split_on_start_and_respect_end_and_size() {
        let text = NormalizedText::new("Kauf\na\nEnde\nb\nKauf\nc\nd\nKauf\nx");
        let tx = TransactionRule::new(TransactionKind::Purchase);

        let block = CompiledBlock::compile(&BlockRule::new("Kauf", tx.clone())).unwrap();
        assert_eq!(block.ranges(text.lines()), [(0, 3), (4, 6), (7, 8)]);

        let block = CompiledBlock::compile(&BlockRule::new("Kauf", tx.clone()).ends_with("Ende")).unwrap();
        assert_eq!(block.ranges(text.lines()), [(0, 2)]);

        let block = CompiledBlock::compile(&BlockRule::new("Kauf", tx).max_size(2)).unwrap();
        assert_eq!(block.ranges(text.lines()), [(0, 1), (4, 5), (7, 8)]);
    }

    #[test]
    fn compilation_rejects_bad_rules() {
        let bad_regex = CompiledSection::compile(&Section::new(["amount"]).pattern("(?<amount>"));
        assert!(matches!(bad_regex, Err(ExtractError::InvalidPattern { .. })));

        let duplicate = TransactionRule::new(TransactionKind::Fee)
            .section(Section::new(["date"]).id("a").pattern("(?<date>.*)"))
            .section(Section::new(["amount"]).id("a").pattern("(?<amount>.*)"));
        assert!(matches!(
            CompiledTransaction::compile(&duplicate),
            Err(ExtractError::InvalidRule(_))
        ));

        let empty = CompiledSection::compile(&Section::new(["amount"]));
        assert!(matches!(empty, Err(ExtractError::InvalidRule(_))));
    }
}
