//! Ошибки извлечения операций из выписок.

use std::fmt;

use crate::types::TransactionKind;

/// Ошибка разбора выписки, построения операции или компиляции правил.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// Ошибка ввода-вывода при чтении исходного файла.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Не удалось получить текст из PDF.
    #[error("PDF text extraction error: {0}")]
    Pdf(String),
    /// Ни одно правило не подошло к блоку или секции.
    #[error("Pattern '{section}' not matched ({matched} of {expected} lines found)")]
    PatternNotMatched {
        /// Метка секции или перечень её атрибутов.
        section: String,
        /// Сколько шаблонов секции совпало.
        matched: usize,
        /// Сколько шаблонов было в секции.
        expected: usize,
    },
    /// Ни одна альтернатива `one_of` не подошла.
    #[error("None of {count} alternatives matched: {details}")]
    NoAlternativeMatched {
        /// Число альтернатив.
        count: usize,
        /// Сообщения альтернатив через `; `.
        details: String,
    },
    /// Документ не распознан ни одним учреждением.
    #[error("Unsupported document: no institution rules match")]
    UnsupportedDocument,
    /// В блоке отсутствует обязательное поле.
    #[error("Required field '{field}' missing")]
    MissingField {
        /// Имя поля.
        field: String,
    },
    /// Ошибка разбора числового значения.
    #[error("Invalid number '{value}' in field '{field}'")]
    MalformedAmount {
        /// Некорректное исходное значение.
        value: String,
        /// Имя поля.
        field: String,
    },
    /// Ошибка разбора даты или времени.
    #[error("Invalid date '{value}'")]
    MalformedDate {
        /// Некорректная дата.
        value: String,
    },
    /// Некорректный код валюты.
    #[error("Unknown currency '{value}'")]
    UnknownCurrency {
        /// Исходное значение.
        value: String,
    },
    /// Значение `type` отсутствует в таблице типов правила.
    #[error("Unknown transaction type '{value}'")]
    UnknownTransactionType {
        /// Исходное значение.
        value: String,
    },
    /// Сумма операции не сходится с валовой стоимостью, налогами и комиссиями.
    #[error("{kind} does not reconcile: expected {expected} but statement says {actual} ({currency} minor units)")]
    Consistency {
        /// Тип операции.
        kind: TransactionKind,
        /// Сумма, рассчитанная из составляющих.
        expected: i64,
        /// Сумма из выписки.
        actual: i64,
        /// Валюта операции.
        currency: String,
    },
    /// Составляющая операции некорректна (валюта, курс).
    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
    /// ISIN и WKN указывают на разные бумаги реестра.
    #[error("Security identifiers conflict: ISIN {isin} and WKN {wkn} belong to different securities")]
    DuplicateSecurity {
        /// ISIN из выписки.
        isin: String,
        /// WKN из выписки.
        wkn: String,
    },
    /// Регулярное выражение правила не компилируется.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Исходный шаблон.
        pattern: String,
        /// Ошибка компиляции.
        source: regex::Error,
    },
    /// Правило построено некорректно.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}

/// Ошибка, привязанная к файлу и диапазону строк.
#[derive(Debug)]
pub struct ItemError {
    /// Имя файла выписки.
    pub file_name: String,
    /// Диапазон строк блока (с единицы), если ошибка относится к блоку.
    pub lines: Option<(usize, usize)>,
    /// Сама ошибка.
    pub error: ExtractError,
}

impl ItemError {
    pub(crate) fn for_file(file_name: &str, error: ExtractError) -> Self {
        Self {
            file_name: file_name.to_string(),
            lines: None,
            error,
        }
    }

    pub(crate) fn for_block(file_name: &str, start: usize, end: usize, error: ExtractError) -> Self {
        Self {
            file_name: file_name.to_string(),
            lines: Some((start + 1, end + 1)),
            error,
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lines {
            Some((start, end)) => write!(f, "{}:{start}-{end}: {}", self.file_name, self.error),
            None => write!(f, "{}: {}", self.file_name, self.error),
        }
    }
}

impl std::error::Error for ItemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
