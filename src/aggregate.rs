use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::Transaction;
use crate::error::StoreError;
use crate::store::TransactionRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewardsRange {
    #[default]
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
    AllTime,
}

impl RewardsRange {
    pub const ALL: [RewardsRange; 5] = [
        RewardsRange::LastWeek,
        RewardsRange::LastMonth,
        RewardsRange::LastQuarter,
        RewardsRange::LastYear,
        RewardsRange::AllTime,
    ];

    pub fn window(self) -> Option<Duration> {
        match self {
            RewardsRange::LastWeek => Some(Duration::days(7)),
            RewardsRange::LastMonth => Some(Duration::days(30)),
            RewardsRange::LastQuarter => Some(Duration::days(90)),
            RewardsRange::LastYear => Some(Duration::days(365)),
            RewardsRange::AllTime => None,
        }
    }

    /// Earliest date included in the range, or `None` for all time.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window().map(|w| now - w)
    }

    pub fn label(self) -> &'static str {
        match self {
            RewardsRange::LastWeek => "1W",
            RewardsRange::LastMonth => "1M",
            RewardsRange::LastQuarter => "3M",
            RewardsRange::LastYear => "1Y",
            RewardsRange::AllTime => "ALL",
        }
    }
}

impl fmt::Display for RewardsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RewardsRange {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1w" | "7d" | "week" => Ok(RewardsRange::LastWeek),
            "1m" | "30d" | "month" => Ok(RewardsRange::LastMonth),
            "3m" | "90d" | "quarter" => Ok(RewardsRange::LastQuarter),
            "1y" | "365d" | "year" => Ok(RewardsRange::LastYear),
            "all" => Ok(RewardsRange::AllTime),
            other => Err(format!(
                "Invalid range '{other}'. Expected one of: 1w, 1m, 3m, 1y, all"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardsSummary {
    pub range: RewardsRange,
    pub transactions: usize,
    pub actual: Decimal,
    /// Actual cashback plus whatever better cards would have added.
    pub potential: Decimal,
    /// Actual cashback per day, oldest first.
    pub actual_series: Vec<(NaiveDate, Decimal)>,
    /// Potential cashback per day, only for charges where a better card existed.
    pub potential_series: Vec<(NaiveDate, Decimal)>,
}

impl RewardsSummary {
    pub fn missed(&self) -> Decimal {
        self.potential.saturating_sub(self.actual)
    }
}

pub fn summarize(
    range: RewardsRange,
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> RewardsSummary {
    let start = range.start(now);
    let in_range = transactions
        .iter()
        .filter(|t| start.is_none_or(|s| t.date >= s));

    let mut count = 0usize;
    let mut actual = Decimal::ZERO;
    let mut potential = Decimal::ZERO;
    let mut actual_by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    let mut potential_by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();

    for txn in in_range {
        count += 1;
        actual = actual.saturating_add(txn.cashback);
        potential = potential.saturating_add(txn.effective_potential());

        let day = txn.date.date_naive();
        let day_actual = actual_by_day.entry(day).or_default();
        *day_actual = day_actual.saturating_add(txn.cashback);
        if txn.effective_potential() > txn.cashback {
            let day_potential = potential_by_day.entry(day).or_default();
            *day_potential = day_potential.saturating_add(txn.effective_potential());
        }
    }

    RewardsSummary {
        range,
        transactions: count,
        actual,
        potential,
        actual_series: actual_by_day.into_iter().collect(),
        potential_series: potential_by_day.into_iter().collect(),
    }
}

/// Fetches from `repo` and summarizes.
pub fn summarize_from<R: TransactionRepository + ?Sized>(
    repo: &R,
    range: RewardsRange,
    now: DateTime<Utc>,
) -> Result<RewardsSummary, StoreError> {
    let transactions = repo.fetch_transactions()?;
    Ok(summarize(range, &transactions, now))
}
