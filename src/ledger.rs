//! Transaction creation and removal, and the balance changes that go with them.
//!
//! A card's balance only moves here. Every mutation is a single
//! [`Store::commit`]; the in-memory wallet is updated only after the commit
//! succeeds, so a storage failure leaves the caller's state as it was.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::domain::{CardId, CreditCard, MAX_NAME_LEN, Transaction, TransactionId, Wallet};
use crate::error::{Result, StoreError, ValidationError};
use crate::rewards::{cashback, recommend};
use crate::store::{Store, Write};

/// A prospective charge as entered by the user.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub name: String,
    pub date: DateTime<Utc>,
    /// Unparsed amount. Negative values record a refund.
    pub amount: String,
    pub category: String,
    pub card: Option<CardId>,
}

/// Largest accepted magnitude for an entered amount (one trillion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Parses a user-entered amount. Plain and scientific notation are accepted;
/// magnitudes above [`MAX_AMOUNT`] are rejected.
pub fn parse_amount(raw: &str) -> std::result::Result<Decimal, ValidationError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
        .filter(|amount| amount.abs() <= MAX_AMOUNT)
        .ok_or_else(|| ValidationError::InvalidAmount(raw.to_string()))
}

/// Rounds to cents, halves away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn normalize_name(raw: &str) -> std::result::Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.chars().take(MAX_NAME_LEN).collect())
}

/// Records a charge on the selected card.
///
/// The amount is rounded to cents once; that value is stored, earns the
/// cashback, and moves the balance. A better card is recorded only when one
/// strictly beats the card used.
pub fn create_transaction<S: Store + ?Sized>(
    store: &mut S,
    wallet: &mut Wallet,
    draft: NewTransaction,
) -> Result<Transaction> {
    let card_id = draft.card.ok_or(ValidationError::MissingCard)?;
    let name = normalize_name(&draft.name)?;
    if draft.date > Utc::now() {
        return Err(ValidationError::FutureDate.into());
    }
    let amount = round_currency(parse_amount(&draft.amount)?);
    let card = wallet.get(card_id).ok_or(ValidationError::MissingCard)?;
    let balance = card
        .balance()
        .checked_add(amount)
        .ok_or_else(|| ValidationError::InvalidAmount(draft.amount.clone()))?;

    let actual = cashback(card, &draft.category, amount);
    let recommendation = recommend(wallet.cards(), card, &draft.category, amount, actual);
    match &recommendation {
        Some(rec) => debug!(
            card = %card.name,
            better = %rec.card_id,
            actual = %actual,
            potential = %rec.cashback,
            "better card available"
        ),
        None => debug!(card = %card.name, actual = %actual, "card used is optimal"),
    }

    let txn = Transaction {
        id: TransactionId::new(),
        name,
        date: draft.date,
        amount,
        category: draft.category,
        cashback: actual,
        potential_cashback: recommendation.map(|r| r.cashback),
        best_card_id: recommendation.map(|r| r.card_id),
        card_id: Some(card_id),
    };

    store
        .commit(vec![
            Write::InsertTransaction(txn.clone()),
            Write::SetBalance {
                card: card_id,
                balance,
            },
        ])
        .inspect_err(|err| warn!(error = %err, "failed to record transaction"))?;

    apply_balance(wallet, card_id, balance);
    info!(id = %txn.id, amount = %amount, balance = %balance, "recorded transaction");
    Ok(txn)
}

/// Removes a transaction and reverses its effect on the card it was charged to.
///
/// When the card is gone the reversal is skipped. Removing a transaction the
/// store no longer holds fails, so a balance is never reversed twice.
pub fn delete_transaction<S: Store + ?Sized>(
    store: &mut S,
    wallet: &mut Wallet,
    txn: &Transaction,
) -> Result<()> {
    let reversal = match txn.card_id.and_then(|id| wallet.get(id)) {
        Some(card) => {
            let balance = card
                .balance()
                .checked_sub(txn.amount)
                .ok_or_else(|| ValidationError::InvalidAmount(txn.amount.to_string()))?;
            Some((card.id, balance))
        }
        None => None,
    };

    let mut writes = vec![Write::DeleteTransaction(txn.id)];
    match reversal {
        Some((card, balance)) => writes.push(Write::SetBalance { card, balance }),
        None => debug!(id = %txn.id, "card no longer in wallet; skipping balance reversal"),
    }

    store
        .commit(writes)
        .inspect_err(|err| warn!(error = %err, id = %txn.id, "failed to delete transaction"))?;

    if let Some((card, balance)) = reversal {
        apply_balance(wallet, card, balance);
    }
    info!(id = %txn.id, "deleted transaction");
    Ok(())
}

/// Adds a card to the wallet. Its opening balance is taken as given.
pub fn add_card<S: Store + ?Sized>(
    store: &mut S,
    wallet: &mut Wallet,
    card: CreditCard,
) -> Result<CardId> {
    let id = card.id;
    store.commit(vec![Write::InsertCard(card.clone())])?;
    info!(card = %card.name, %id, "added card");
    wallet.push(card);
    Ok(id)
}

/// Removes a card and its reward rules. Its transactions stay, detached.
pub fn remove_card<S: Store + ?Sized>(
    store: &mut S,
    wallet: &mut Wallet,
    id: CardId,
) -> Result<CreditCard> {
    if wallet.get(id).is_none() {
        return Err(StoreError::NotFound(format!("card {id}")).into());
    }
    store.commit(vec![Write::DeleteCard(id)])?;
    let card = wallet
        .remove(id)
        .ok_or_else(|| StoreError::NotFound(format!("card {id}")))?;
    info!(card = %card.name, %id, "removed card");
    Ok(card)
}

fn apply_balance(wallet: &mut Wallet, card: CardId, balance: Decimal) {
    if let Some(card) = wallet.get_mut(card) {
        card.balance = balance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_amount_accepts_common_forms() {
        assert_eq!(parse_amount("22.40").unwrap(), dec!(22.40));
        assert_eq!(parse_amount(" -5 ").unwrap(), dec!(-5));
        assert_eq!(parse_amount("1e2").unwrap(), dec!(100));
        assert_eq!(
            parse_amount("abc").unwrap_err(),
            ValidationError::InvalidAmount("abc".into())
        );
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn parse_amount_rejects_out_of_range_magnitudes() {
        assert_eq!(parse_amount("1000000000000").unwrap(), MAX_AMOUNT);
        assert_eq!(parse_amount("-1000000000000").unwrap(), -MAX_AMOUNT);
        assert_eq!(
            parse_amount("1000000000000.01").unwrap_err(),
            ValidationError::InvalidAmount("1000000000000.01".into())
        );
        assert!(parse_amount("79228162514264337593543950335").is_err());
        assert!(parse_amount("-1e20").is_err());
    }

    #[test]
    fn rounding_is_half_away_from_zero_and_idempotent() {
        assert_eq!(round_currency(dec!(8.745)), dec!(8.75));
        assert_eq!(round_currency(dec!(-8.745)), dec!(-8.75));
        assert_eq!(round_currency(dec!(10.004)), dec!(10.00));
        for raw in [dec!(22.40), dec!(0.01), dec!(-3.99), dec!(1234.50)] {
            let once = round_currency(raw);
            assert_eq!(round_currency(once), once);
            assert_eq!(once, raw);
        }
    }

    #[test]
    fn names_are_trimmed_and_capped() {
        assert_eq!(normalize_name("  Starbucks ").unwrap(), "Starbucks");
        let long = "x".repeat(45);
        assert_eq!(normalize_name(&long).unwrap().chars().count(), MAX_NAME_LEN);
        assert_eq!(normalize_name("   ").unwrap_err(), ValidationError::EmptyName);
    }
}
