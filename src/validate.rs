//! Проверка согласованности суммы операции с валовой стоимостью, налогами и комиссиями.

use crate::error::ExtractError;
use crate::types::Transaction;
use crate::utils::convert_amount;

/// Допустимое расхождение пересчёта валютной суммы, в минимальных единицах.
const FOREX_TOLERANCE: u64 = 1;

/// Проверяет операцию:
///
/// * все составляющие выражены в валюте операции;
/// * валютные составляющие имеют положительный курс, другую валюту
///   и `amount = round(forex * rate)` с точностью до одной минимальной единицы;
/// * при явной валовой стоимости `amount = gross ∓ fees ∓ taxes` точно;
/// * без неё выведенная валовая стоимость неотрицательна.
pub fn validate(tx: &Transaction) -> Result<(), ExtractError> {
    let currency = &tx.amount.currency;
    for unit in &tx.units {
        if &unit.amount.currency != currency {
            return Err(ExtractError::InvalidUnit(format!(
                "{:?} in {} but transaction is in {currency}",
                unit.kind, unit.amount.currency
            )));
        }
        let Some(forex) = &unit.forex else {
            continue;
        };
        let Some(rate) = unit
            .exchange_rate
            .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
        else {
            return Err(ExtractError::InvalidUnit(format!(
                "{:?} in {} without a positive exchange rate",
                unit.kind, forex.currency
            )));
        };
        if &forex.currency == currency {
            return Err(ExtractError::InvalidUnit(format!(
                "{:?} forex amount is in the transaction currency {currency}",
                unit.kind
            )));
        }
        let converted = convert_amount(forex.amount, rate).ok_or_else(|| {
            ExtractError::InvalidUnit(format!("{:?} forex amount overflows", unit.kind))
        })?;
        if converted.abs_diff(unit.amount.amount) > FOREX_TOLERANCE {
            return Err(ExtractError::InvalidUnit(format!(
                "{:?} {} at rate {rate} is {converted}, statement says {} ({currency} minor units)",
                unit.kind, forex, unit.amount.amount
            )));
        }
    }

    let overflow = || ExtractError::InvalidUnit("transaction amounts overflow".to_string());
    let charges = tx.checked_charges().ok_or_else(overflow)?;
    let consistency = |expected: i64| ExtractError::Consistency {
        kind: tx.kind,
        expected,
        actual: tx.amount.amount,
        currency: currency.to_string(),
    };

    let increases = tx.kind.charges_increase_amount();
    match tx.explicit_gross_value() {
        Some(gross) => {
            let expected = if increases {
                gross.amount.amount.checked_add(charges)
            } else {
                gross.amount.amount.checked_sub(charges)
            }
            .ok_or_else(overflow)?;
            if expected != tx.amount.amount {
                return Err(consistency(expected));
            }
        }
        None => {
            let derived = if increases {
                tx.amount.amount.checked_sub(charges)
            } else {
                tx.amount.amount.checked_add(charges)
            }
            .ok_or_else(overflow)?;
            if derived < 0 {
                return Err(consistency(charges));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrencyCode, Money, TransactionKind, Unit, UnitKind};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn money(amount: i64, currency: &str) -> Money {
        Money::new(amount, CurrencyCode::parse(currency).unwrap())
    }

    fn tx(kind: TransactionKind, amount: i64, units: Vec<Unit>) -> Transaction {
        Transaction {
            kind,
            date: NaiveDate::from_ymd_opt(2020, 3, 5).unwrap(),
            time: None,
            amount: money(amount, "EUR"),
            shares: None,
            security: None,
            units,
            note: None,
            source: None,
        }
    }

    #[test]
    fn purchase_adds_charges_to_gross() {
        let units = vec![
            Unit::new(UnitKind::GrossValue, money(100_966, "EUR")),
            Unit::new(UnitKind::Fee, money(890, "EUR")),
            Unit::new(UnitKind::Fee, money(110, "EUR")),
        ];
        assert!(validate(&tx(TransactionKind::Purchase, 101_966, units.clone())).is_ok());

        let err = validate(&tx(TransactionKind::Purchase, 101_965, units)).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Consistency { expected: 101_966, actual: 101_965, .. }
        ));
    }

    #[test]
    fn sale_and_dividend_subtract_charges() {
        let units = vec![
            Unit::new(UnitKind::GrossValue, money(32_000, "EUR")),
            Unit::new(UnitKind::Tax, money(8_440, "EUR")),
        ];
        assert!(validate(&tx(TransactionKind::Dividend, 23_560, units.clone())).is_ok());
        assert!(validate(&tx(TransactionKind::Sale, 23_560, units)).is_ok());
    }

    #[test]
    fn derived_gross_must_not_be_negative() {
        let units = vec![Unit::new(UnitKind::Fee, money(500, "EUR"))];
        assert!(validate(&tx(TransactionKind::Fee, 500, units.clone())).is_ok());
        assert!(validate(&tx(TransactionKind::Removal, 400, units)).is_err());
        assert!(validate(&tx(TransactionKind::Deposit, 200_000, Vec::new())).is_ok());
    }

    #[test]
    fn units_must_use_transaction_currency() {
        let units = vec![Unit::new(UnitKind::Fee, money(100, "USD"))];
        assert!(matches!(
            validate(&tx(TransactionKind::Sale, 1_000, units)),
            Err(ExtractError::InvalidUnit(_))
        ));
    }

    #[test]
    fn forex_units_need_rate_and_foreign_currency() {
        let good = Unit::with_forex(UnitKind::Fee, money(200, "EUR"), money(250, "USD"), dec!(0.8));
        assert!(validate(&tx(TransactionKind::Fee, 200, vec![good])).is_ok());

        let zero_rate = Unit::with_forex(UnitKind::Fee, money(200, "EUR"), money(250, "USD"), dec!(0));
        assert!(validate(&tx(TransactionKind::Fee, 200, vec![zero_rate])).is_err());

        let same = Unit::with_forex(UnitKind::Fee, money(200, "EUR"), money(200, "EUR"), dec!(1));
        assert!(validate(&tx(TransactionKind::Fee, 200, vec![same])).is_err());
    }

    #[test]
    fn forex_amount_must_match_rate() {
        let rounded = Unit::with_forex(
            UnitKind::GrossValue,
            money(1_295, "EUR"),
            money(1_425, "USD"),
            dec!(0.9090909091),
        );
        let tax = Unit::new(UnitKind::Tax, money(194, "EUR"));
        assert!(validate(&tx(TransactionKind::Dividend, 1_101, vec![rounded, tax.clone()])).is_ok());

        let wrong = Unit::with_forex(
            UnitKind::GrossValue,
            money(9_995, "EUR"),
            money(1_425, "USD"),
            dec!(0.9090909091),
        );
        let err = validate(&tx(TransactionKind::Dividend, 9_801, vec![wrong, tax])).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUnit(ref msg) if msg.contains("1295")));
    }

    #[test]
    fn overflowing_charges_are_errors() {
        let units = vec![
            Unit::new(UnitKind::Fee, money(i64::MAX, "EUR")),
            Unit::new(UnitKind::Tax, money(i64::MAX, "EUR")),
        ];
        let err = validate(&tx(TransactionKind::Sale, 100, units)).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUnit(_)));

        let units = vec![
            Unit::new(UnitKind::GrossValue, money(i64::MAX, "EUR")),
            Unit::new(UnitKind::Fee, money(10, "EUR")),
        ];
        let err = validate(&tx(TransactionKind::Purchase, 100, units)).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUnit(_)));
    }
}
