#![warn(missing_docs)]
//! Библиотека для извлечения операций из текстовых выписок банков и брокеров.
//!
//! Выписка проходит нормализацию текста, разбор по правилам учреждения,
//! сборку операции, проверку согласованности сумм и привязку к реестру бумаг.

mod batch;
mod builder;
mod error;
mod extractor;
pub mod institutions;
mod parser;
mod raw;
mod resolver;
mod rules;
mod types;
mod utils;
mod validate;

pub use crate::batch::ImportBatch;
pub use crate::builder::{DraftMoney, DraftRate, TransactionDraft};
pub use crate::error::{ExtractError, ItemError};
pub use crate::extractor::{Extractor, ExtractorBuilder};
pub use crate::parser::ParsedData;
pub use crate::raw::{NormalizedText, RawStatement};
pub use crate::resolver::{Resolution, SecurityHints, SecurityRegistry};
pub use crate::rules::{
    Assign, AssignFn, BlockRule, ConcludeFn, DocumentRule, Institution, Pattern, Section, SectionRule,
    TransactionRule,
};
pub use crate::types::*;
pub use crate::validate::validate;
