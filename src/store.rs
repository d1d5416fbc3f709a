//! The storage seam.
//!
//! The core never decides where records live. Mutations go through
//! [`Store::commit`] as one batch; reads go through [`TransactionRepository`]
//! or [`Store::fetch`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{CardId, CreditCard, Transaction, TransactionId, Wallet};
use crate::error::StoreError;

pub trait TransactionRepository {
    /// All transactions, newest first.
    fn fetch_transactions(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// One write inside a commit batch.
#[derive(Debug, Clone)]
pub enum Write {
    InsertCard(CreditCard),
    /// Removes the card and its rules; transactions keep existing with the
    /// card reference cleared.
    DeleteCard(CardId),
    InsertTransaction(Transaction),
    DeleteTransaction(TransactionId),
    SetBalance { card: CardId, balance: Decimal },
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub card: Option<CardId>,
    /// Inclusive lower bound on the transaction date.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, txn: &Transaction) -> bool {
        if let Some(card) = self.card {
            if txn.card_id != Some(card) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if txn.date < since {
                return false;
            }
        }
        true
    }
}

pub trait Store: TransactionRepository {
    /// Applies every write or none of them. Effects are visible to the next
    /// fetch on the same store.
    fn commit(&mut self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Matching transactions, newest first.
    fn fetch(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError>;

    /// Every card with its rules, in insertion order.
    fn load_wallet(&self) -> Result<Wallet, StoreError>;
}

/// Process-local store. Useful for hosts that persist elsewhere, and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cards: Vec<CreditCard>,
    transactions: Vec<Transaction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&mut self, write: Write) -> Result<(), StoreError> {
        match write {
            Write::InsertCard(card) => {
                if self.cards.iter().any(|c| c.id == card.id) {
                    return Err(StoreError::Corrupt(format!("duplicate card id {}", card.id)));
                }
                self.cards.push(card);
            }
            Write::DeleteCard(id) => {
                let pos = self
                    .cards
                    .iter()
                    .position(|c| c.id == id)
                    .ok_or_else(|| StoreError::NotFound(format!("card {id}")))?;
                self.cards.remove(pos);
                for txn in &mut self.transactions {
                    if txn.card_id == Some(id) {
                        txn.card_id = None;
                    }
                    if txn.best_card_id == Some(id) {
                        txn.best_card_id = None;
                    }
                }
            }
            Write::InsertTransaction(txn) => {
                if self.transactions.iter().any(|t| t.id == txn.id) {
                    return Err(StoreError::Corrupt(format!(
                        "duplicate transaction id {}",
                        txn.id
                    )));
                }
                self.transactions.push(txn);
            }
            Write::DeleteTransaction(id) => {
                let pos = self
                    .transactions
                    .iter()
                    .position(|t| t.id == id)
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
                self.transactions.remove(pos);
            }
            Write::SetBalance { card, balance } => {
                let card = self
                    .cards
                    .iter_mut()
                    .find(|c| c.id == card)
                    .ok_or_else(|| StoreError::NotFound(format!("card {card}")))?;
                card.balance = balance;
            }
        }
        Ok(())
    }
}

impl TransactionRepository for MemoryStore {
    fn fetch_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch(&TransactionFilter::default())
    }
}

impl Store for MemoryStore {
    fn commit(&mut self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut staged = self.clone();
        for write in writes {
            staged.apply(write)?;
        }
        *self = staged;
        Ok(())
    }

    fn fetch(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        // Reverse first so equal dates come back most recently inserted first.
        let mut out: Vec<Transaction> = self
            .transactions
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn load_wallet(&self) -> Result<Wallet, StoreError> {
        Ok(Wallet::new(self.cards.clone()))
    }
}
