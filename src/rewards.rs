//! Cashback computation and best-card selection.
//!
//! Everything here is pure: no store access, no logging side effects that
//! matter for correctness.

use rust_decimal::Decimal;

use crate::domain::{CardId, CreditCard, FALLBACK_CATEGORY, Wallet};

/// Cashback `card` earns on a charge of `amount` in `category`.
///
/// An exact rule wins; otherwise the card's `"Other"` rule applies; otherwise
/// nothing is earned. Categories are compared as-is. Products beyond the
/// decimal range saturate.
pub fn cashback(card: &CreditCard, category: &str, amount: Decimal) -> Decimal {
    card.rule_for(category)
        .or_else(|| card.rule_for(FALLBACK_CATEGORY))
        .map(|rule| amount.saturating_mul(rule.multiplier))
        .unwrap_or(Decimal::ZERO)
}

/// The card in `cards` with the strictly greatest cashback. Ties keep the
/// earliest card; no cards yields `(None, 0)`.
pub fn best_card<'a>(
    cards: &'a [CreditCard],
    category: &str,
    amount: Decimal,
) -> (Option<&'a CreditCard>, Decimal) {
    let mut best: Option<(&CreditCard, Decimal)> = None;
    for card in cards {
        let value = cashback(card, category, amount);
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((card, value)),
        }
    }

    match best {
        Some((card, value)) => (Some(card), value),
        None => (None, Decimal::ZERO),
    }
}

impl Wallet {
    /// "Which card should I use" for a charge that is not being recorded.
    pub fn best_card_for(&self, category: &str, amount: Decimal) -> (Option<&CreditCard>, Decimal) {
        best_card(self.cards(), category, amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub card_id: CardId,
    pub cashback: Decimal,
}

/// A better card for a charge made on `used`, if one strictly beats it.
pub fn recommend(
    cards: &[CreditCard],
    used: &CreditCard,
    category: &str,
    amount: Decimal,
    actual: Decimal,
) -> Option<Recommendation> {
    let (best, value) = best_card(cards, category, amount);
    let best = best?;
    if best.id == used.id || value <= actual {
        return None;
    }
    Some(Recommendation {
        card_id: best.id,
        cashback: value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn card(name: &str, rules: &[(&str, Decimal)]) -> CreditCard {
        let due = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();
        rules
            .iter()
            .fold(CreditCard::new(name, dec!(0), due), |c, (cat, m)| {
                c.with_rule(*cat, *m).unwrap()
            })
    }

    fn gold() -> CreditCard {
        card("Gold", &[("Dining", dec!(0.04)), ("Other", dec!(0.01))])
    }

    fn venture() -> CreditCard {
        card("Venture", &[("Dining", dec!(0)), ("Other", dec!(0.02))])
    }

    #[test]
    fn no_matching_rule_earns_nothing() {
        let c = card("Plain", &[("Dining", dec!(0.03))]);
        assert_eq!(cashback(&c, "Travel", dec!(120.00)), Decimal::ZERO);
        assert_eq!(cashback(&c, "Travel", dec!(-5.00)), Decimal::ZERO);
        assert_eq!(cashback(&card("Empty", &[]), "Dining", dec!(10)), Decimal::ZERO);
    }

    #[test]
    fn oversized_product_saturates() {
        let c = card("Huge", &[("Other", dec!(2))]);
        assert_eq!(cashback(&c, "Travel", Decimal::MAX), Decimal::MAX);
        assert_eq!(cashback(&c, "Travel", Decimal::MIN), Decimal::MIN);
    }

    #[test]
    fn exact_rule_beats_fallback() {
        let c = gold();
        assert_eq!(cashback(&c, "Dining", dec!(50.00)), dec!(2.00));
        assert_eq!(cashback(&c, "Travel", dec!(50.00)), dec!(0.50));
    }

    #[test]
    fn category_match_is_case_sensitive() {
        let c = gold();
        assert_eq!(cashback(&c, "dining", dec!(50.00)), dec!(0.50));
        assert_eq!(cashback(&c, " Dining", dec!(50.00)), dec!(0.50));
    }

    #[test]
    fn best_card_keeps_first_on_tie() {
        let a = card("A", &[("Other", dec!(0.02))]);
        let b = card("B", &[("Other", dec!(0.02))]);
        let a_id = a.id;
        let cards = vec![a, b];
        let (best, value) = best_card(&cards, "Dining", dec!(10.00));
        assert_eq!(best.map(|c| c.id), Some(a_id));
        assert_eq!(value, dec!(0.20));
    }

    #[test]
    fn best_card_of_empty_wallet_is_none() {
        let wallet = Wallet::default();
        let (best, value) = wallet.best_card_for("Dining", dec!(10));
        assert!(best.is_none());
        assert_eq!(value, Decimal::ZERO);
    }

    #[test]
    fn used_card_already_optimal_gets_no_recommendation() {
        let g = gold();
        let cards = vec![g.clone(), venture()];
        let actual = cashback(&g, "Dining", dec!(50.00));
        assert_eq!(actual, dec!(2.00));
        assert_eq!(recommend(&cards, &g, "Dining", dec!(50.00), actual), None);
    }

    #[test]
    fn better_card_is_recommended_on_fallback_category() {
        let g = gold();
        let v = venture();
        let v_id = v.id;
        let cards = vec![g.clone(), v];
        let actual = cashback(&g, "Travel", dec!(50.00));
        assert_eq!(actual, dec!(0.50));
        let rec = recommend(&cards, &g, "Travel", dec!(50.00), actual).unwrap();
        assert_eq!(rec.card_id, v_id);
        assert_eq!(rec.cashback, dec!(1.00));
    }

    #[test]
    fn tie_with_used_card_is_suppressed() {
        let used = card("Used", &[("Other", dec!(0.02))]);
        let other = card("Other card", &[("Other", dec!(0.02))]);
        // `other` comes first, so it is the selector's pick, but it only ties.
        let cards = vec![other, used.clone()];
        let actual = cashback(&used, "Dining", dec!(40));
        assert_eq!(recommend(&cards, &used, "Dining", dec!(40), actual), None);
    }
}
