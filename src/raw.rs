//! Исходный текст выписки и его построчная нормализация.

use crate::error::ExtractError;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Исходный текст выписки без разбора.
#[derive(Debug, Clone)]
pub struct RawStatement {
    /// Имя файла (для сообщений об ошибках).
    pub file_name: String,
    /// Полный текст выписки.
    pub text: String,
}

impl RawStatement {
    /// Читает текст выписки из произвольного `Read`.
    pub fn from_reader<R: Read>(name: &str, mut reader: R) -> Result<Self, ExtractError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self {
            file_name: name.to_string(),
            text,
        })
    }

    /// Создаёт выписку из готовой строки.
    #[inline]
    pub fn from_str(name: &str, text: &str) -> Self {
        Self {
            file_name: name.to_string(),
            text: text.to_string(),
        }
    }

    /// Читает текстовый файл; имя выписки берётся из имени файла.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let text = fs::read_to_string(path)?;
        Ok(Self {
            file_name: file_name_of(path),
            text,
        })
    }

    /// Извлекает текст из PDF-файла.
    #[cfg(feature = "pdf")]
    pub fn from_pdf_path(path: &Path) -> Result<Self, ExtractError> {
        let bytes = fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|err| ExtractError::Pdf(err.to_string()))?;
        Ok(Self {
            file_name: file_name_of(path),
            text,
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Текст, разбитый на строки с нормализованными пробелами.
#[derive(Debug, Clone, Default)]
pub struct NormalizedText {
    lines: Vec<String>,
}

impl NormalizedText {
    /// Разбивает текст по `\r?\n`, заменяя неразрывные пробелы и табуляции обычными
    /// и отбрасывая хвостовые пробелы.
    pub fn new(text: &str) -> Self {
        let lines = text.lines().map(normalize_line).collect();
        Self { lines }
    }

    /// Строки текста.
    #[inline]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Число строк.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Текст пуст.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Весь текст, собранный обратно через `\n`.
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

fn normalize_line(line: &str) -> String {
    let replaced: String = line
        .chars()
        .map(|ch| match ch {
            '\u{a0}' | '\u{202f}' | '\u{2007}' | '\t' => ' ',
            other => other,
        })
        .collect();
    replaced.trim_end().to_string()
}
