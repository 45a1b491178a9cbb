//! Доменные типы: деньги, бумаги, операции и результат извлечения.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{ExtractError, ItemError};

/// Число знаков после запятой у денежных сумм.
pub const AMOUNT_DECIMALS: u32 = 2;

/// Формат записи чисел в выписках учреждения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberLocale {
    /// `1.234,56`
    #[default]
    German,
    /// `1,234.56`
    English,
    /// `1'234.56`
    Swiss,
    /// `1 234,56`
    French,
}

/// Код валюты из трёх латинских букв.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Разбирает код валюты, понимая также символы `€`, `$` и `£`.
    pub fn parse(value: &str) -> Result<Self, ExtractError> {
        let trimmed = value.trim();
        let code = match trimmed {
            "€" => "EUR",
            "$" => "USD",
            "£" => "GBP",
            other => other,
        };
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(ExtractError::UnknownCurrency {
                value: trimmed.to_string(),
            })
        }
    }

    /// Строковое представление кода.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Сумма в минимальных единицах валюты (центах).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Money {
    /// Сумма в минимальных единицах.
    pub amount: i64,
    /// Валюта.
    pub currency: CurrencyCode,
}

impl Money {
    /// Создаёт сумму.
    #[inline]
    pub const fn new(amount: i64, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = Decimal::new(self.amount, AMOUNT_DECIMALS);
        write!(f, "{} {value}", self.currency)
    }
}

/// Количество бумаг с фиксированной точкой (8 знаков).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Shares(pub i64);

impl Shares {
    /// Число знаков после запятой.
    pub const DECIMALS: u32 = 8;
    /// Множитель фиксированной точки.
    pub const SCALE: i64 = 100_000_000;

    /// Количество как `Decimal`.
    #[inline]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, Self::DECIMALS)
    }
}

impl fmt::Display for Shares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}

/// Индекс бумаги в реестре.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SecurityId(pub usize);

/// Ценная бумага.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Security {
    /// Наименование.
    pub name: String,
    /// ISIN.
    pub isin: Option<String>,
    /// WKN.
    pub wkn: Option<String>,
    /// Тикер.
    pub ticker: Option<String>,
    /// Валюта котировки.
    pub currency: CurrencyCode,
}

/// Тип операции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Покупка бумаг.
    Purchase,
    /// Продажа бумаг.
    Sale,
    /// Дивиденды и прочие выплаты по бумаге.
    Dividend,
    /// Пополнение счёта.
    Deposit,
    /// Вывод со счёта.
    Removal,
    /// Проценты на остаток.
    Interest,
    /// Начисленные проценты к уплате.
    InterestCharge,
    /// Комиссия.
    Fee,
    /// Возврат комиссии.
    FeeRefund,
    /// Налоги.
    Taxes,
    /// Возврат налогов.
    TaxRefund,
    /// Перевод бумаг между депо.
    Transfer,
    /// Зачисление бумаг без оплаты.
    DeliveryInbound,
    /// Списание бумаг без оплаты.
    DeliveryOutbound,
}

impl TransactionKind {
    /// Комиссии и налоги увеличивают сумму операции, а не уменьшают её.
    pub const fn charges_increase_amount(self) -> bool {
        matches!(
            self,
            Self::Purchase
                | Self::DeliveryInbound
                | Self::Removal
                | Self::Fee
                | Self::Taxes
                | Self::InterestCharge
        )
    }

    /// Для операции нужна бумага.
    pub const fn requires_security(self) -> bool {
        matches!(
            self,
            Self::Purchase
                | Self::Sale
                | Self::Dividend
                | Self::Transfer
                | Self::DeliveryInbound
                | Self::DeliveryOutbound
        )
    }

    /// Для операции нужно количество бумаг.
    pub const fn requires_shares(self) -> bool {
        matches!(
            self,
            Self::Purchase
                | Self::Sale
                | Self::Transfer
                | Self::DeliveryInbound
                | Self::DeliveryOutbound
        )
    }

    /// Обозначение типа в верхнем регистре.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "BUY",
            Self::Sale => "SELL",
            Self::Dividend => "DIVIDENDS",
            Self::Deposit => "DEPOSIT",
            Self::Removal => "REMOVAL",
            Self::Interest => "INTEREST",
            Self::InterestCharge => "INTEREST_CHARGE",
            Self::Fee => "FEES",
            Self::FeeRefund => "FEES_REFUND",
            Self::Taxes => "TAXES",
            Self::TaxRefund => "TAX_REFUND",
            Self::Transfer => "TRANSFER",
            Self::DeliveryInbound => "DELIVERY_INBOUND",
            Self::DeliveryOutbound => "DELIVERY_OUTBOUND",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Вид составляющей операции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    /// Валовая стоимость.
    GrossValue,
    /// Налог.
    Tax,
    /// Комиссия.
    Fee,
}

/// Составляющая операции в валюте операции, возможно с исходной валютной суммой.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    /// Вид составляющей.
    pub kind: UnitKind,
    /// Сумма в валюте операции.
    pub amount: Money,
    /// Исходная сумма в иностранной валюте.
    pub forex: Option<Money>,
    /// Курс: `amount = forex * exchange_rate`.
    pub exchange_rate: Option<Decimal>,
}

impl Unit {
    /// Составляющая без валютной части.
    #[inline]
    pub const fn new(kind: UnitKind, amount: Money) -> Self {
        Self {
            kind,
            amount,
            forex: None,
            exchange_rate: None,
        }
    }

    /// Составляющая с валютной частью и курсом.
    #[inline]
    pub const fn with_forex(kind: UnitKind, amount: Money, forex: Money, rate: Decimal) -> Self {
        Self {
            kind,
            amount,
            forex: Some(forex),
            exchange_rate: Some(rate),
        }
    }
}

/// Операция, построенная из блока выписки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Тип операции.
    pub kind: TransactionKind,
    /// Дата операции.
    pub date: NaiveDate,
    /// Время операции, если указано.
    pub time: Option<NaiveTime>,
    /// Итоговая сумма (нетто).
    pub amount: Money,
    /// Количество бумаг.
    pub shares: Option<Shares>,
    /// Бумага из реестра.
    pub security: Option<SecurityId>,
    /// Валовая стоимость, налоги и комиссии.
    pub units: Vec<Unit>,
    /// Примечание.
    pub note: Option<String>,
    /// Имя файла, из которого извлечена операция.
    pub source: Option<String>,
}

impl Transaction {
    fn unit_amounts(&self, kind: UnitKind) -> impl Iterator<Item = i64> + '_ {
        self.units
            .iter()
            .filter(move |u| u.kind == kind)
            .map(|u| u.amount.amount)
    }

    /// Сумма комиссий (с насыщением).
    #[inline]
    pub fn fees(&self) -> i64 {
        self.unit_amounts(UnitKind::Fee).fold(0, i64::saturating_add)
    }

    /// Сумма налогов (с насыщением).
    #[inline]
    pub fn taxes(&self) -> i64 {
        self.unit_amounts(UnitKind::Tax).fold(0, i64::saturating_add)
    }

    /// Сумма налогов и комиссий; `None` при переполнении.
    pub fn checked_charges(&self) -> Option<i64> {
        self.unit_amounts(UnitKind::Fee)
            .chain(self.unit_amounts(UnitKind::Tax))
            .try_fold(0_i64, i64::checked_add)
    }

    /// Явно указанная валовая стоимость.
    pub fn explicit_gross_value(&self) -> Option<&Unit> {
        self.units.iter().find(|u| u.kind == UnitKind::GrossValue)
    }

    /// Валовая стоимость: явная или выведенная из суммы, налогов и комиссий.
    pub fn gross_value(&self) -> i64 {
        if let Some(unit) = self.explicit_gross_value() {
            return unit.amount.amount;
        }
        let charges = self.fees().saturating_add(self.taxes());
        if self.kind.charges_increase_amount() {
            self.amount.amount.saturating_sub(charges)
        } else {
            self.amount.amount.saturating_add(charges)
        }
    }
}

/// Результат извлечения: новая бумага или операция.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "item", rename_all = "lowercase")]
pub enum Item {
    /// Бумага, добавленная в реестр при разборе.
    Security {
        /// Индекс в реестре.
        id: SecurityId,
        /// Данные бумаги.
        security: Security,
    },
    /// Операция.
    Transaction(Transaction),
}

impl Item {
    /// Операция, если элемент является операцией.
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(tx) => Some(tx),
            Self::Security { .. } => None,
        }
    }
}

/// Результат разбора одной выписки.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Имя файла.
    pub file_name: String,
    /// Распознанное учреждение.
    pub institution: Option<String>,
    /// Успешно построенные элементы.
    pub items: Vec<Item>,
    /// Ошибки по элементам.
    pub errors: Vec<ItemError>,
}

impl Extraction {
    /// Итератор по операциям.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.items.iter().filter_map(Item::as_transaction)
    }
}

/// Итог по типу операции и валюте после объединения выписок.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindTotal {
    /// Тип операции.
    pub kind: TransactionKind,
    /// Валюта.
    pub currency: CurrencyCode,
    /// Число операций.
    pub count: usize,
    /// Сумма в минимальных единицах.
    pub amount: i64,
}
