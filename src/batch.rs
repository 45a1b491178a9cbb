//! Пакетный импорт выписок и агрегация результатов.

use crate::error::{ExtractError, ItemError};
use crate::extractor::Extractor;
use crate::raw::RawStatement;
use crate::resolver::SecurityRegistry;
use crate::types::{CurrencyCode, Extraction, Item, KindTotal, Transaction, TransactionKind};
use std::collections::BTreeMap;
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Результаты разбора набора выписок.
#[derive(Debug, Default)]
pub struct ImportBatch {
    /// Результаты по файлам в порядке обработки.
    pub extractions: Vec<Extraction>,
}

/// Файл с поддерживаемым расширением.
fn is_statement(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    ext == "txt" || (cfg!(feature = "pdf") && ext == "pdf")
}

/// Файлы выписок каталога в отсортированном порядке.
fn statement_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .collect();
    // Делаем порядок файлов детерминированным.
    entries.sort_by_key(DirEntry::path);
    Ok(entries
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_statement(path))
        .collect())
}

fn load(path: &Path) -> Result<RawStatement, ExtractError> {
    #[cfg(feature = "pdf")]
    if path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    {
        return RawStatement::from_pdf_path(path);
    }
    RawStatement::from_path(path)
}

impl ImportBatch {
    /// Разбирает все выписки каталога (`.txt`, а с функцией `pdf` и `.pdf`).
    ///
    /// # Пример
    ///
    /// ```
    /// # use statement_import::{Extractor, ImportBatch, SecurityRegistry};
    /// let extractor = Extractor::new().unwrap();
    /// let mut registry = SecurityRegistry::new();
    /// let batch = ImportBatch::from_dir("tests/fixtures", &extractor, &mut registry).unwrap();
    /// assert!(batch.transactions().count() > 0);
    /// ```
    pub fn from_dir<P: AsRef<Path>>(
        dir: P,
        extractor: &Extractor,
        registry: &mut SecurityRegistry,
    ) -> Result<Self, ExtractError> {
        let files = statement_files(dir.as_ref())?;
        Ok(Self::from_paths(files, extractor, registry))
    }

    /// Разбирает указанные файлы; каталоги раскрываются в их выписки.
    /// Нечитаемый файл даёт ошибку уровня файла, остальные продолжают разбираться.
    pub fn from_paths<I, P>(paths: I, extractor: &Extractor, registry: &mut SecurityRegistry) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut batch = Self::default();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                match statement_files(path) {
                    Ok(files) => {
                        for file in files {
                            batch.push_file(&file, extractor, registry);
                        }
                    }
                    Err(err) => batch.push_failure(path, err),
                }
            } else {
                batch.push_file(path, extractor, registry);
            }
        }
        info!(
            files = batch.extractions.len(),
            items = batch.items().count(),
            errors = batch.errors().count(),
            "batch imported"
        );
        batch
    }

    fn push_file(&mut self, path: &Path, extractor: &Extractor, registry: &mut SecurityRegistry) {
        match load(path) {
            Ok(raw) => self.extractions.push(extractor.extract(&raw, registry)),
            Err(err) => self.push_failure(path, err),
        }
    }

    fn push_failure(&mut self, path: &Path, err: ExtractError) {
        let file_name = path.display().to_string();
        warn!(file = %file_name, "{err}");
        self.extractions.push(Extraction {
            errors: vec![ItemError::for_file(&file_name, err)],
            file_name,
            ..Extraction::default()
        });
    }

    /// Все элементы по всем файлам.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.extractions.iter().flat_map(|e| e.items.iter())
    }

    /// Все ошибки по всем файлам.
    pub fn errors(&self) -> impl Iterator<Item = &ItemError> {
        self.extractions.iter().flat_map(|e| e.errors.iter())
    }

    /// Ошибки файлов, которые не удалось прочитать.
    pub fn unreadable(&self) -> impl Iterator<Item = &ItemError> {
        self.errors().filter(|e| {
            e.lines.is_none() && matches!(e.error, ExtractError::Io(_) | ExtractError::Pdf(_))
        })
    }

    /// Все операции по всем файлам.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.items().filter_map(Item::as_transaction)
    }

    /// Суммы операций по типу и валюте, упорядоченные по ключу.
    pub fn totals(&self) -> Vec<KindTotal> {
        let mut map: BTreeMap<(TransactionKind, CurrencyCode), (usize, i64)> = BTreeMap::new();
        for tx in self.transactions() {
            let entry = map
                .entry((tx.kind, tx.amount.currency.clone()))
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(tx.amount.amount);
        }

        map.into_iter()
            .map(|((kind, currency), (count, amount))| KindTotal {
                kind,
                currency,
                count,
                amount,
            })
            .collect()
    }
}
