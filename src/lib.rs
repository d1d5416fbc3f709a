//! Credit card wallet with cashback recommendations.
//!
//! The core ([`rewards`], [`ledger`], [`aggregate`]) is synchronous and pure
//! apart from the explicit [`store::Store`] handle it is given.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod remote;
pub mod rewards;
pub mod store;

pub use domain::{CardId, CreditCard, RewardRule, Transaction, TransactionId, Wallet};
pub use error::{LedgerError, StoreError, ValidationError};
pub use store::{MemoryStore, Store, TransactionRepository};
