//! Черновик операции: типизированные значения блока и сборка [`Transaction`].

use crate::error::ExtractError;
use crate::parser::ParsedData;
use crate::resolver::SecurityHints;
use crate::types::{
    CurrencyCode, Money, NumberLocale, Shares, Transaction, TransactionKind, Unit, UnitKind,
};
use crate::utils::{
    convert_amount, inverse_rate, parse_amount, parse_date_with_year, parse_exchange_rate,
    parse_shares, parse_time,
};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};

/// Сумма черновика; валюта `None` означает валюту операции.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftMoney {
    /// Сумма в минимальных единицах.
    pub amount: i64,
    /// Валюта, если указана явно.
    pub currency: Option<CurrencyCode>,
}

/// Курс валют из выписки: `1 base = rate term`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRate {
    /// Значение курса.
    pub rate: Decimal,
    /// Базовая валюта.
    pub base: Option<CurrencyCode>,
    /// Котируемая валюта.
    pub term: Option<CurrencyCode>,
}

/// Значения одного блока, накопленные секциями.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    /// Тип операции.
    pub kind: TransactionKind,
    /// Формат чисел учреждения.
    pub locale: NumberLocale,
    type_map: Vec<(String, TransactionKind)>,
    /// Дата.
    pub date: Option<NaiveDate>,
    /// Время.
    pub time: Option<NaiveTime>,
    /// Сумма нетто.
    pub amount: Option<i64>,
    /// Валюта операции.
    pub currency: Option<CurrencyCode>,
    /// Количество бумаг.
    pub shares: Option<Shares>,
    /// Идентификаторы бумаги.
    pub security: SecurityHints,
    /// Валовая стоимость.
    pub gross: Option<DraftMoney>,
    /// Валовая стоимость в иностранной валюте.
    pub fx_gross: Option<DraftMoney>,
    /// Курс валют.
    pub exchange_rate: Option<DraftRate>,
    /// Комиссии.
    pub fees: Vec<DraftMoney>,
    /// Налоги.
    pub taxes: Vec<DraftMoney>,
    /// Примечание.
    pub note: Option<String>,
}

fn missing(field: &str) -> ExtractError {
    ExtractError::MissingField {
        field: field.to_string(),
    }
}

fn currency_of(data: &ParsedData, key: &str) -> Result<Option<CurrencyCode>, ExtractError> {
    data.get(key).map(CurrencyCode::parse).transpose()
}

fn text_of(data: &ParsedData, key: &str) -> Option<String> {
    data.get(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl TransactionDraft {
    /// Пустой черновик операции указанного типа.
    pub fn new(kind: TransactionKind, locale: NumberLocale) -> Self {
        Self {
            kind,
            locale,
            type_map: Vec::new(),
            date: None,
            time: None,
            amount: None,
            currency: None,
            shares: None,
            security: SecurityHints::default(),
            gross: None,
            fx_gross: None,
            exchange_rate: None,
            fees: Vec::new(),
            taxes: Vec::new(),
            note: None,
        }
    }

    /// Задаёт таблицу значений `type`.
    #[must_use]
    pub fn with_type_map(mut self, type_map: Vec<(String, TransactionKind)>) -> Self {
        self.type_map = type_map;
        self
    }

    /// Разбирает сумму по формату учреждения.
    pub fn parse_amount(&self, value: &str, field: &str) -> Result<i64, ExtractError> {
        parse_amount(value, self.locale, field)
    }

    /// Добавляет комиссию; нулевые суммы пропускаются.
    pub fn add_fee(&mut self, amount: i64, currency: Option<CurrencyCode>) {
        if amount != 0 {
            self.fees.push(DraftMoney { amount, currency });
        }
    }

    /// Добавляет налог; нулевые суммы пропускаются.
    pub fn add_tax(&mut self, amount: i64, currency: Option<CurrencyCode>) {
        if amount != 0 {
            self.taxes.push(DraftMoney { amount, currency });
        }
    }

    /// Стандартное присваивание: известные имена захватов заполняют поля.
    pub fn apply(&mut self, data: &ParsedData) -> Result<(), ExtractError> {
        if let Some(value) = data.get("type") {
            let value = value.trim();
            self.kind = self
                .type_map
                .iter()
                .find(|(label, _)| label == value)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| ExtractError::UnknownTransactionType {
                    value: value.to_string(),
                })?;
        }
        if let Some(value) = data.get("date") {
            self.date = Some(parse_date_with_year(value, data.get("year"))?);
        }
        if let Some(value) = data.get("time") {
            self.time = Some(parse_time(value)?);
        }
        if let Some(currency) = currency_of(data, "currency")? {
            self.currency = Some(currency);
        }
        if let Some(value) = data.get("amount") {
            self.amount = Some(self.parse_amount(value, "amount")?);
        }
        if let Some(value) = data.get("shares") {
            self.shares = Some(parse_shares(value, self.locale)?);
        }

        if let Some(name) = text_of(data, "name") {
            self.security.name = Some(name);
        }
        if let Some(isin) = text_of(data, "isin") {
            self.security.isin = Some(isin);
        }
        if let Some(wkn) = text_of(data, "wkn") {
            self.security.wkn = Some(wkn);
        }
        if let Some(ticker) = text_of(data, "ticker") {
            self.security.ticker = Some(ticker);
        }
        if let Some(currency) = currency_of(data, "security_currency")? {
            self.security.currency = Some(currency);
        }

        if let Some(value) = data.get("fee") {
            let amount = self.parse_amount(value, "fee")?;
            self.add_fee(amount, currency_of(data, "fee_currency")?);
        }
        if let Some(value) = data.get("tax") {
            let amount = self.parse_amount(value, "tax")?;
            self.add_tax(amount, currency_of(data, "tax_currency")?);
        }
        if let Some(value) = data.get("gross") {
            self.gross = Some(DraftMoney {
                amount: self.parse_amount(value, "gross")?,
                currency: currency_of(data, "gross_currency")?,
            });
        }
        if let Some(value) = data.get("fx_gross") {
            self.fx_gross = Some(DraftMoney {
                amount: self.parse_amount(value, "fx_gross")?,
                currency: currency_of(data, "fx_currency")?,
            });
        }
        if let Some(value) = data.get("exchange_rate") {
            self.exchange_rate = Some(DraftRate {
                rate: parse_exchange_rate(value, self.locale)?,
                base: currency_of(data, "base_currency")?,
                term: currency_of(data, "term_currency")?,
            });
        }
        if let Some(note) = text_of(data, "note") {
            self.note = Some(note);
        }
        Ok(())
    }

    /// Множитель перевода `foreign -> target` по курсу из выписки.
    fn rate_to(&self, foreign: &CurrencyCode, target: &CurrencyCode) -> Option<Decimal> {
        let rate = self.exchange_rate.as_ref()?;
        let (base, term) = match (&rate.base, &rate.term) {
            (Some(base), Some(term)) => (base, term),
            (Some(base), None) => (base, if base == foreign { target } else { foreign }),
            (None, Some(term)) => (if term == target { foreign } else { target }, term),
            (None, None) => (foreign, target),
        };
        if base == foreign && term == target {
            Some(rate.rate)
        } else if base == target && term == foreign {
            inverse_rate(rate.rate)
        } else {
            None
        }
    }

    /// Переводит сумму черновика в составляющую в валюте операции.
    fn to_unit(
        &self,
        kind: UnitKind,
        value: &DraftMoney,
        currency: &CurrencyCode,
    ) -> Result<Unit, ExtractError> {
        let foreign = match &value.currency {
            Some(foreign) if foreign != currency => foreign,
            _ => return Ok(Unit::new(kind, Money::new(value.amount, currency.clone()))),
        };
        let rate = self.rate_to(foreign, currency).ok_or_else(|| {
            ExtractError::InvalidUnit(format!(
                "no exchange rate from {foreign} to {currency} for {kind:?}"
            ))
        })?;
        let converted = convert_amount(value.amount, rate).ok_or_else(|| {
            ExtractError::InvalidUnit(format!("{kind:?} amount overflows after conversion"))
        })?;
        Ok(Unit::with_forex(
            kind,
            Money::new(converted, currency.clone()),
            Money::new(value.amount, foreign.clone()),
            rate,
        ))
    }

    /// Валовая стоимость с учётом суммы в иностранной валюте.
    fn gross_unit(&self, currency: &CurrencyCode) -> Result<Option<Unit>, ExtractError> {
        let Some(fx_gross) = &self.fx_gross else {
            return self
                .gross
                .as_ref()
                .map(|gross| self.to_unit(UnitKind::GrossValue, gross, currency))
                .transpose();
        };

        let fx_currency = fx_gross
            .currency
            .clone()
            .or_else(|| self.security.currency.clone())
            .ok_or_else(|| {
                ExtractError::InvalidUnit("forex gross value without currency".to_string())
            })?;
        if &fx_currency == currency {
            let gross = self.gross.as_ref().unwrap_or(fx_gross);
            return self.to_unit(UnitKind::GrossValue, gross, currency).map(Some);
        }
        let forex = DraftMoney {
            amount: fx_gross.amount,
            currency: Some(fx_currency.clone()),
        };

        let local = self
            .gross
            .as_ref()
            .filter(|gross| gross.currency.as_ref().is_none_or(|c| c == currency));
        let Some(local) = local else {
            return self.to_unit(UnitKind::GrossValue, &forex, currency).map(Some);
        };

        let rate = match self.rate_to(&fx_currency, currency) {
            Some(rate) => rate,
            None if fx_gross.amount == 0 => {
                return Err(ExtractError::InvalidUnit(
                    "forex gross value is zero".to_string(),
                ));
            }
            None => (Decimal::from(local.amount) / Decimal::from(fx_gross.amount))
                .round_dp_with_strategy(10, RoundingStrategy::MidpointNearestEven),
        };
        Ok(Some(Unit::with_forex(
            UnitKind::GrossValue,
            Money::new(local.amount, currency.clone()),
            Money::new(fx_gross.amount, fx_currency),
            rate,
        )))
    }

    /// Собирает операцию. Возвращает её и идентификаторы бумаги, если они есть.
    pub fn build(self, source: &str) -> Result<(Transaction, Option<SecurityHints>), ExtractError> {
        let date = self.date.ok_or_else(|| missing("date"))?;
        let amount = self.amount.ok_or_else(|| missing("amount"))?;
        let currency = self.currency.clone().ok_or_else(|| missing("currency"))?;
        if self.kind.requires_shares() && self.shares.is_none() {
            return Err(missing("shares"));
        }
        if self.kind.requires_security() && self.security.is_empty() {
            return Err(missing("isin"));
        }

        let mut units = Vec::with_capacity(self.fees.len() + self.taxes.len() + 1);
        if let Some(gross) = self.gross_unit(&currency)? {
            units.push(gross);
        }
        for fee in &self.fees {
            units.push(self.to_unit(UnitKind::Fee, fee, &currency)?);
        }
        for tax in &self.taxes {
            units.push(self.to_unit(UnitKind::Tax, tax, &currency)?);
        }

        let hints = (!self.security.is_empty()).then_some(self.security);
        let transaction = Transaction {
            kind: self.kind,
            date,
            time: self.time,
            amount: Money::new(amount, currency),
            shares: self.shares,
            security: None,
            units,
            note: self.note,
            source: Some(source.to_string()),
        };
        Ok((transaction, hints))
    }
}
