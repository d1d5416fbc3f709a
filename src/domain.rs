use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ValidationError;

/// Category used when a card has no rule for the charged category.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Categories offered by the input surface. The engine does not enforce membership.
pub const CATEGORIES: &[&str] = &[
    "Dining",
    "Groceries",
    "Travel",
    "Shopping",
    "Transportation",
    "Streaming",
    FALLBACK_CATEGORY,
];

/// Merchant names are cut to this many characters.
pub const MAX_NAME_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub Uuid);

impl CardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardRule {
    /// Matched by exact, case-sensitive equality.
    pub category: String,
    /// Fraction of the charge returned, e.g. 0.03 for 3%.
    pub multiplier: Decimal,
}

impl RewardRule {
    pub fn new(category: impl Into<String>, multiplier: Decimal) -> Result<Self, ValidationError> {
        let category = category.into();
        if multiplier.is_sign_negative() && !multiplier.is_zero() {
            return Err(ValidationError::NegativeMultiplier(category));
        }
        Ok(Self {
            category,
            multiplier,
        })
    }
}

/// Built with [`CreditCard::new`] or a template; the balance then moves only
/// through the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditCard {
    pub id: CardId,
    pub name: String,
    /// Running balance. Written only by the ledger.
    pub(crate) balance: Decimal,
    pub due_date: NaiveDate,
    /// Display-only.
    pub benefits: String,
    pub last_four: Option<String>,
    pub is_points: bool,
    /// Cash value of one point, when the card earns points.
    pub point_value: Option<Decimal>,
    pub(crate) rewards: Vec<RewardRule>,
}

impl CreditCard {
    pub fn new(name: impl Into<String>, opening_balance: Decimal, due_date: NaiveDate) -> Self {
        Self {
            id: CardId::new(),
            name: name.into(),
            balance: opening_balance,
            due_date,
            benefits: String::new(),
            last_four: None,
            is_points: false,
            point_value: None,
            rewards: Vec::new(),
        }
    }

    pub fn with_benefits(mut self, benefits: impl Into<String>) -> Self {
        self.benefits = benefits.into();
        self
    }

    pub fn with_last_four(mut self, last_four: impl Into<String>) -> Self {
        self.last_four = Some(last_four.into());
        self
    }

    pub fn with_points(mut self, point_value: Option<Decimal>) -> Self {
        self.is_points = true;
        self.point_value = point_value;
        self
    }

    pub fn with_rule(
        mut self,
        category: impl Into<String>,
        multiplier: Decimal,
    ) -> Result<Self, ValidationError> {
        self.add_rule(RewardRule::new(category, multiplier)?)?;
        Ok(self)
    }

    /// One rule per category; a second rule for the same label is rejected.
    pub fn add_rule(&mut self, rule: RewardRule) -> Result<(), ValidationError> {
        if self.rule_for(&rule.category).is_some() {
            return Err(ValidationError::DuplicateRule(rule.category));
        }
        self.rewards.push(rule);
        Ok(())
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn rewards(&self) -> &[RewardRule] {
        &self.rewards
    }

    pub fn rule_for(&self, category: &str) -> Option<&RewardRule> {
        self.rewards.iter().find(|r| r.category == category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Transaction {
    pub id: TransactionId,
    pub name: String,
    pub date: DateTime<Utc>,
    /// Signed; negative amounts are refunds.
    pub amount: Decimal,
    pub category: String,
    /// Frozen at creation.
    pub cashback: Decimal,
    pub potential_cashback: Option<Decimal>,
    pub best_card_id: Option<CardId>,
    /// Card charged. Cleared when the card is removed.
    pub card_id: Option<CardId>,
}

impl Transaction {
    /// What the best card would have earned, or the actual cashback when no
    /// better card was recommended.
    pub fn effective_potential(&self) -> Decimal {
        self.potential_cashback.unwrap_or(self.cashback)
    }

    pub fn missed_cashback(&self) -> Decimal {
        self.effective_potential()
            .saturating_sub(self.cashback)
            .max(Decimal::ZERO)
    }
}

/// The user's cards, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct Wallet {
    cards: Vec<CreditCard>,
}

impl Wallet {
    pub fn new(cards: Vec<CreditCard>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[CreditCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, id: CardId) -> Option<&CreditCard> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: CardId) -> Option<&mut CreditCard> {
        self.cards.iter_mut().find(|c| c.id == id)
    }

    pub(crate) fn push(&mut self, card: CreditCard) {
        self.cards.push(card);
    }

    pub(crate) fn remove(&mut self, id: CardId) -> Option<CreditCard> {
        let pos = self.cards.iter().position(|c| c.id == id)?;
        Some(self.cards.remove(pos))
    }

    /// Looks a card up by exact id, unique case-insensitive name, or unique
    /// id prefix. Ambiguous names and prefixes match nothing.
    pub fn find(&self, needle: &str) -> Option<&CreditCard> {
        let needle = needle.trim();
        if needle.is_empty() {
            return None;
        }
        if let Some(card) = self.cards.iter().find(|c| c.id.to_string() == needle) {
            return Some(card);
        }
        let by_name = self
            .cards
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case(needle));
        if let Some(card) = unique(by_name) {
            return Some(card);
        }
        unique(
            self.cards
                .iter()
                .filter(|c| c.id.to_string().starts_with(needle)),
        )
    }
}

fn unique<'a>(mut matches: impl Iterator<Item = &'a CreditCard>) -> Option<&'a CreditCard> {
    match (matches.next(), matches.next()) {
        (Some(card), None) => Some(card),
        _ => None,
    }
}

/// A built-in card definition with its published reward structure.
#[derive(Debug, Clone, Copy)]
pub struct CardTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub benefits: &'static str,
    /// (category, percent back)
    pub rewards: &'static [(&'static str, i64)],
}

impl CardTemplate {
    pub fn build(&self, opening_balance: Decimal, due_date: NaiveDate) -> CreditCard {
        let rewards = self
            .rewards
            .iter()
            .map(|(category, pct)| RewardRule {
                category: category.to_string(),
                multiplier: Decimal::new(*pct, 2),
            })
            .collect();
        CreditCard {
            rewards,
            ..CreditCard::new(self.name, opening_balance, due_date).with_benefits(self.benefits)
        }
    }
}

pub const CARD_TEMPLATES: &[CardTemplate] = &[
    CardTemplate {
        key: "sapphire-reserve",
        name: "Sapphire Reserve",
        benefits: "3X points on travel and dining, 1X on all other purchases. Annual $300 travel credit, airport lounge access and travel insurance.",
        rewards: &[("Dining", 3), ("Travel", 3), (FALLBACK_CATEGORY, 1)],
    },
    CardTemplate {
        key: "gold",
        name: "Gold Card",
        benefits: "4X points at restaurants and U.S. supermarkets, 3X on flights booked directly, 1X on other purchases. Dining and ride credits.",
        rewards: &[
            ("Dining", 4),
            ("Groceries", 4),
            ("Travel", 3),
            (FALLBACK_CATEGORY, 1),
        ],
    },
    CardTemplate {
        key: "venture-x",
        name: "Venture X",
        benefits: "2X miles on all purchases, 10X on hotels and rental cars, 5X on flights booked through the issuer's travel portal.",
        rewards: &[("Travel", 5), ("Hotels", 10), (FALLBACK_CATEGORY, 2)],
    },
];

pub fn find_template(key: &str) -> Option<&'static CardTemplate> {
    let key = key.trim();
    CARD_TEMPLATES
        .iter()
        .find(|t| t.key.eq_ignore_ascii_case(key) || t.name.eq_ignore_ascii_case(key))
}
