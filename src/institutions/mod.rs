//! Встроенные правила учреждений.

mod deutsche_bank;
mod renault_bank;
mod swissquote;

pub use deutsche_bank::deutsche_bank;
pub use renault_bank::renault_bank;
pub use swissquote::swissquote;

use crate::builder::TransactionDraft;
use crate::error::ExtractError;
use crate::rules::Institution;

/// Все встроенные учреждения в порядке проверки.
pub fn builtin() -> Vec<Institution> {
    vec![deutsche_bank(), renault_bank(), swissquote()]
}

/// Налог как разница валовой суммы и суммы к зачислению.
pub(crate) fn tax_from_gross(draft: &mut TransactionDraft) -> Result<(), ExtractError> {
    let (Some(gross), Some(amount)) = (draft.gross.as_ref(), draft.amount) else {
        return Ok(());
    };
    let same_currency = match (&gross.currency, &draft.currency) {
        (Some(gross_currency), Some(currency)) => gross_currency == currency,
        _ => true,
    };
    if same_currency && draft.taxes.is_empty() && gross.amount > amount {
        let tax = gross.amount - amount;
        draft.add_tax(tax, None);
    }
    Ok(())
}
