//! Правила разбора выписок: учреждения, типы документов, блоки и секции.
//!
//! Правила являются данными. Все шаблоны хранятся строками и компилируются
//! один раз при сборке [`crate::Extractor`].

use crate::builder::TransactionDraft;
use crate::error::ExtractError;
use crate::parser::ParsedData;
use crate::types::{NumberLocale, TransactionKind};

/// Пользовательское присваивание значений секции черновику операции.
pub type AssignFn = fn(&mut TransactionDraft, &ParsedData) -> Result<(), ExtractError>;

/// Завершающая обработка черновика после всех секций.
pub type ConcludeFn = fn(&mut TransactionDraft) -> Result<(), ExtractError>;

/// Учреждение (банк или брокер) со своим набором правил.
#[derive(Debug, Clone)]
pub struct Institution {
    /// Метка учреждения.
    pub label: String,
    /// Подстроки, хотя бы одна из которых должна встречаться в тексте.
    pub identifiers: Vec<String>,
    /// Формат чисел.
    pub locale: NumberLocale,
    /// Типы документов.
    pub documents: Vec<DocumentRule>,
}

impl Institution {
    /// Создаёт учреждение без правил.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            identifiers: Vec::new(),
            locale: NumberLocale::default(),
            documents: Vec::new(),
        }
    }

    /// Добавляет идентифицирующую подстроку.
    #[must_use]
    pub fn identifier(mut self, text: impl Into<String>) -> Self {
        self.identifiers.push(text.into());
        self
    }

    /// Устанавливает формат чисел.
    #[must_use]
    pub const fn locale(mut self, locale: NumberLocale) -> Self {
        self.locale = locale;
        self
    }

    /// Добавляет тип документа.
    #[must_use]
    pub fn document(mut self, document: DocumentRule) -> Self {
        self.documents.push(document);
        self
    }
}

/// Тип документа: условия распознавания, контекст и блоки операций.
#[derive(Debug, Clone, Default)]
pub struct DocumentRule {
    /// Шаблоны, которые должны встречаться в тексте.
    pub must_include: Vec<String>,
    /// Шаблоны, которые не должны встречаться в тексте.
    pub must_not_include: Vec<String>,
    /// Секции контекста документа, разбираемые по всему тексту.
    pub context: Vec<SectionRule>,
    /// Блоки операций.
    pub blocks: Vec<BlockRule>,
}

impl DocumentRule {
    /// Документ, распознаваемый по шаблону.
    pub fn new(must_include: impl Into<String>) -> Self {
        Self {
            must_include: vec![must_include.into()],
            ..Self::default()
        }
    }

    /// Дополнительный обязательный шаблон.
    #[must_use]
    pub fn must_include(mut self, pattern: impl Into<String>) -> Self {
        self.must_include.push(pattern.into());
        self
    }

    /// Исключающий шаблон.
    #[must_use]
    pub fn must_not_include(mut self, pattern: impl Into<String>) -> Self {
        self.must_not_include.push(pattern.into());
        self
    }

    /// Секция контекста.
    #[must_use]
    pub fn context(mut self, section: Section) -> Self {
        self.context.push(SectionRule::Single(section));
        self
    }

    /// Блок операций.
    #[must_use]
    pub fn block(mut self, block: BlockRule) -> Self {
        self.blocks.push(block);
        self
    }
}

/// Блок строк, из которого строится одна операция.
#[derive(Debug, Clone)]
pub struct BlockRule {
    /// Строка, открывающая блок.
    pub starts_with: String,
    /// Строка, закрывающая блок.
    pub ends_with: Option<String>,
    /// Максимальное число строк блока.
    pub max_size: Option<usize>,
    /// Правило построения операции.
    pub transaction: TransactionRule,
}

impl BlockRule {
    /// Блок, открываемый строкой по шаблону.
    pub fn new(starts_with: impl Into<String>, transaction: TransactionRule) -> Self {
        Self {
            starts_with: starts_with.into(),
            ends_with: None,
            max_size: None,
            transaction,
        }
    }

    /// Шаблон последней строки блока.
    #[must_use]
    pub fn ends_with(mut self, pattern: impl Into<String>) -> Self {
        self.ends_with = Some(pattern.into());
        self
    }

    /// Ограничение размера блока.
    #[must_use]
    pub const fn max_size(mut self, lines: usize) -> Self {
        self.max_size = Some(lines);
        self
    }
}

/// Правило построения операции из секций блока.
#[derive(Debug, Clone)]
pub struct TransactionRule {
    /// Тип операции по умолчанию.
    pub kind: TransactionKind,
    /// Соответствие захваченного `type` типу операции.
    pub type_map: Vec<(String, TransactionKind)>,
    /// Секции в порядке разбора.
    pub sections: Vec<SectionRule>,
    /// Обработчики готового черновика.
    pub concludes: Vec<ConcludeFn>,
}

impl TransactionRule {
    /// Правило для операции указанного типа.
    pub const fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            type_map: Vec::new(),
            sections: Vec::new(),
            concludes: Vec::new(),
        }
    }

    /// Добавляет значение `type` и соответствующий ему тип операции.
    #[must_use]
    pub fn type_value(mut self, value: impl Into<String>, kind: TransactionKind) -> Self {
        self.type_map.push((value.into(), kind));
        self
    }

    /// Добавляет секцию.
    #[must_use]
    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(SectionRule::Single(section));
        self
    }

    /// Ровно одна из альтернатив должна совпасть.
    #[must_use]
    pub fn one_of(mut self, alternatives: Vec<Section>) -> Self {
        self.sections.push(SectionRule::OneOf {
            optional: false,
            alternatives,
        });
        self
    }

    /// Не более одной из альтернатив; отсутствие совпадения допустимо.
    #[must_use]
    pub fn optional_one_of(mut self, alternatives: Vec<Section>) -> Self {
        self.sections.push(SectionRule::OneOf {
            optional: true,
            alternatives,
        });
        self
    }

    /// Обработчик, вызываемый после всех секций.
    #[must_use]
    pub fn conclude(mut self, conclude: ConcludeFn) -> Self {
        self.concludes.push(conclude);
        self
    }
}

/// Секция или набор альтернативных секций.
#[derive(Debug, Clone)]
pub enum SectionRule {
    /// Одиночная секция.
    Single(Section),
    /// Альтернативы в порядке приоритета.
    OneOf {
        /// Отсутствие совпадения не является ошибкой.
        optional: bool,
        /// Альтернативные секции.
        alternatives: Vec<Section>,
    },
}

impl SectionRule {
    /// Идентификаторы секций правила.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Single(section) => section.id.as_deref().into_iter().collect(),
            Self::OneOf { alternatives, .. } => {
                alternatives.iter().filter_map(|s| s.id.as_deref()).collect()
            }
        }
    }
}

/// Шаблон строки секции.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Строка целиком совпадает с текстом.
    Find(String),
    /// Строка целиком совпадает с регулярным выражением.
    Match(String),
}

/// Способ переноса значений секции в черновик.
#[derive(Debug, Clone, Copy, Default)]
pub enum Assign {
    /// Стандартное соответствие имён захватов полям.
    #[default]
    Fields,
    /// Пользовательский обработчик.
    With(AssignFn),
}

/// Секция: последовательность шаблонов и извлекаемые атрибуты.
#[derive(Debug, Clone, Default)]
pub struct Section {
    /// Идентификатор (уникален в пределах операции).
    pub id: Option<String>,
    /// Имена захватов, которые должна дать секция.
    pub attributes: Vec<String>,
    /// Шаблоны, совпадающие с последовательными строками.
    pub patterns: Vec<Pattern>,
    /// Отсутствие секции не является ошибкой.
    pub optional: bool,
    /// Секция может встречаться несколько раз.
    pub multiple_times: bool,
    /// Ключи, подмешиваемые из контекста документа.
    pub document_context: Vec<String>,
    /// Присваивание.
    pub assign: Assign,
}

impl Section {
    /// Секция, извлекающая указанные атрибуты.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Идентификатор секции.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Строка, совпадающая с текстом буквально.
    #[must_use]
    pub fn find(mut self, text: impl Into<String>) -> Self {
        self.patterns.push(Pattern::Find(text.into()));
        self
    }

    /// Строка, совпадающая с регулярным выражением.
    #[must_use]
    pub fn pattern(mut self, regex: impl Into<String>) -> Self {
        self.patterns.push(Pattern::Match(regex.into()));
        self
    }

    /// Делает секцию необязательной.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Разрешает повторные вхождения.
    #[must_use]
    pub const fn multiple_times(mut self) -> Self {
        self.multiple_times = true;
        self
    }

    /// Ключи из контекста документа.
    #[must_use]
    pub fn document_context<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_context = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Пользовательское присваивание вместо стандартного.
    #[must_use]
    pub const fn assign(mut self, assign: AssignFn) -> Self {
        self.assign = Assign::With(assign);
        self
    }
}
