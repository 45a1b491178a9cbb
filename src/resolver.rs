//! Реестр бумаг: поиск по идентификаторам или регистрация новой бумаги.

use crate::error::ExtractError;
use crate::types::{CurrencyCode, Security, SecurityId};
use tracing::debug;

/// Идентификаторы бумаги, найденные в выписке.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityHints {
    /// Наименование.
    pub name: Option<String>,
    /// ISIN.
    pub isin: Option<String>,
    /// WKN.
    pub wkn: Option<String>,
    /// Тикер.
    pub ticker: Option<String>,
    /// Валюта бумаги.
    pub currency: Option<CurrencyCode>,
}

impl SecurityHints {
    /// Нет ни одного идентификатора.
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.isin.is_none() && self.wkn.is_none() && self.ticker.is_none()
    }

    const fn has_identifier(&self) -> bool {
        self.isin.is_some() || self.wkn.is_some() || self.ticker.is_some()
    }
}

/// Результат поиска бумаги.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Индекс бумаги в реестре.
    pub id: SecurityId,
    /// Бумага зарегистрирована этим вызовом.
    pub created: bool,
}

/// Реестр бумаг портфеля, единственное изменяемое состояние импорта.
#[derive(Debug, Clone, Default)]
pub struct SecurityRegistry {
    securities: Vec<Security>,
}

impl SecurityRegistry {
    /// Пустой реестр.
    pub const fn new() -> Self {
        Self {
            securities: Vec::new(),
        }
    }

    /// Регистрирует бумагу без поиска.
    pub fn add(&mut self, security: Security) -> SecurityId {
        self.securities.push(security);
        SecurityId(self.securities.len() - 1)
    }

    /// Бумага по индексу.
    pub fn get(&self, id: SecurityId) -> Option<&Security> {
        self.securities.get(id.0)
    }

    /// Число бумаг.
    pub const fn len(&self) -> usize {
        self.securities.len()
    }

    /// Реестр пуст.
    pub const fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// Бумаги с индексами.
    pub fn iter(&self) -> impl Iterator<Item = (SecurityId, &Security)> {
        self.securities
            .iter()
            .enumerate()
            .map(|(idx, security)| (SecurityId(idx), security))
    }

    fn position<F>(&self, predicate: F) -> Option<SecurityId>
    where
        F: Fn(&Security) -> bool,
    {
        self.securities.iter().position(predicate).map(SecurityId)
    }

    /// Ищет бумагу по ISIN, WKN, тикеру и (без идентификаторов) по имени.
    /// Если бумага не найдена, регистрирует новую.
    pub fn resolve(
        &mut self,
        hints: &SecurityHints,
        fallback_currency: &CurrencyCode,
    ) -> Result<Resolution, ExtractError> {
        let by_isin = hints
            .isin
            .as_deref()
            .and_then(|isin| self.position(|s| s.isin.as_deref() == Some(isin)));
        let by_wkn = hints
            .wkn
            .as_deref()
            .and_then(|wkn| self.position(|s| s.wkn.as_deref() == Some(wkn)));

        let duplicate = || ExtractError::DuplicateSecurity {
            isin: hints.isin.clone().unwrap_or_default(),
            wkn: hints.wkn.clone().unwrap_or_default(),
        };
        if matches!((by_isin, by_wkn), (Some(a), Some(b)) if a != b) {
            return Err(duplicate());
        }
        // WKN найден, а ISIN у бумаги реестра другой.
        if let (None, Some(id), Some(isin)) = (by_isin, by_wkn, hints.isin.as_deref()) {
            let known = self.get(id).and_then(|s| s.isin.as_deref());
            if known.is_some_and(|known| known != isin) {
                return Err(duplicate());
            }
        }

        let found = by_isin.or(by_wkn).or_else(|| {
            hints
                .ticker
                .as_deref()
                .and_then(|ticker| self.position(|s| s.ticker.as_deref() == Some(ticker)))
        });
        let found = found.or_else(|| {
            if hints.has_identifier() {
                return None;
            }
            hints
                .name
                .as_deref()
                .and_then(|name| self.position(|s| s.name == name))
        });

        if let Some(id) = found {
            return Ok(Resolution { id, created: false });
        }

        let name = hints
            .name
            .clone()
            .or_else(|| hints.isin.clone())
            .or_else(|| hints.wkn.clone())
            .or_else(|| hints.ticker.clone())
            .ok_or_else(|| ExtractError::MissingField {
                field: "name".to_string(),
            })?;
        let security = Security {
            name,
            isin: hints.isin.clone(),
            wkn: hints.wkn.clone(),
            ticker: hints.ticker.clone(),
            currency: hints.currency.clone().unwrap_or_else(|| fallback_currency.clone()),
        };
        debug!(name = %security.name, isin = ?security.isin, "registering new security");
        let id = self.add(security);
        Ok(Resolution { id, created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur() -> CurrencyCode {
        CurrencyCode::parse("EUR").unwrap()
    }

    fn hints(isin: Option<&str>, wkn: Option<&str>, name: Option<&str>) -> SecurityHints {
        SecurityHints {
            name: name.map(str::to_string),
            isin: isin.map(str::to_string),
            wkn: wkn.map(str::to_string),
            ..SecurityHints::default()
        }
    }

    #[test]
    fn same_isin_resolves_to_same_security() {
        let mut registry = SecurityRegistry::new();
        let first = registry
            .resolve(&hints(Some("DE000BASF111"), None, Some("BASF SE")), &eur())
            .unwrap();
        let second = registry
            .resolve(&hints(Some("DE000BASF111"), None, Some("BASF")), &eur())
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first.id).unwrap().name, "BASF SE");
    }

    #[test]
    fn falls_back_to_wkn_and_ticker() {
        let mut registry = SecurityRegistry::new();
        let basf = registry
            .resolve(&hints(Some("DE000BASF111"), Some("BASF11"), None), &eur())
            .unwrap();
        let by_wkn = registry.resolve(&hints(None, Some("BASF11"), None), &eur()).unwrap();
        assert_eq!(basf.id, by_wkn.id);

        let apple = SecurityHints {
            ticker: Some("AAPL".to_string()),
            currency: Some(CurrencyCode::parse("USD").unwrap()),
            ..SecurityHints::default()
        };
        let created = registry.resolve(&apple, &eur()).unwrap();
        let again = registry.resolve(&apple, &eur()).unwrap();
        assert_eq!(created.id, again.id);
        let security = registry.get(created.id).unwrap();
        assert_eq!(security.name, "AAPL");
        assert_eq!(security.currency.as_str(), "USD");
    }

    #[test]
    fn name_matches_only_without_identifiers() {
        let mut registry = SecurityRegistry::new();
        let first = registry.resolve(&hints(None, None, Some("Fonds A")), &eur()).unwrap();
        let same = registry.resolve(&hints(None, None, Some("Fonds A")), &eur()).unwrap();
        assert_eq!(first.id, same.id);

        let other = registry
            .resolve(&hints(Some("LU0000000001"), None, Some("Fonds A")), &eur())
            .unwrap();
        assert!(other.created);
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn conflicting_identifiers_are_rejected() {
        let mut registry = SecurityRegistry::new();
        registry.resolve(&hints(Some("DE000BASF111"), None, None), &eur()).unwrap();
        registry.resolve(&hints(None, Some("716460"), None), &eur()).unwrap();
        let err = registry
            .resolve(&hints(Some("DE000BASF111"), Some("716460"), None), &eur())
            .unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateSecurity { .. }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn wkn_of_security_with_other_isin_is_rejected() {
        let mut registry = SecurityRegistry::new();
        registry
            .resolve(&hints(Some("DE000BASF111"), Some("BASF11"), Some("BASF SE")), &eur())
            .unwrap();
        let err = registry
            .resolve(&hints(Some("DE0007164600"), Some("BASF11"), Some("SAP SE")), &eur())
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::DuplicateSecurity { ref isin, ref wkn } if isin == "DE0007164600" && wkn == "BASF11"
        ));
        assert_eq!(registry.len(), 1);

        // Бумага без ISIN в реестре по-прежнему находится по WKN.
        let plain = registry.resolve(&hints(None, Some("716460"), None), &eur()).unwrap();
        let with_isin = registry
            .resolve(&hints(Some("DE0007164600"), Some("716460"), None), &eur())
            .unwrap();
        assert_eq!(plain.id, with_isin.id);
    }
}
