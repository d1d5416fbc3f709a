//! Client for the remote transaction endpoints.
//!
//! The service keeps one record per charge, partitioned by caller identity
//! and keyed by `txn#<date>#<id>`. It stores no reward data.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::blocking::{Client, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{FALLBACK_CATEGORY, Transaction, TransactionId};
use crate::error::StoreError;
use crate::store::TransactionRepository;

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const USER_HEADER: &str = "x-user-id";

fn default_category() -> String {
    FALLBACK_CATEGORY.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub user_id: String,
    pub sort_key: String,
    pub txn_id: String,
    pub name: String,
    pub amount: Decimal,
    /// `YYYY-MM-DD`, or a full RFC3339 timestamp.
    pub date: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl RemoteRecord {
    /// Remote records carry no reward data, so cashback is zero and no card is attached.
    pub fn into_transaction(self) -> Result<Transaction, StoreError> {
        let id = Uuid::parse_str(&self.txn_id)
            .map_err(|_| StoreError::Corrupt(format!("invalid txnId: {}", self.txn_id)))?;
        let date = parse_record_date(&self.date)?;
        Ok(Transaction {
            id: TransactionId(id),
            name: self.name,
            date,
            amount: self.amount,
            category: self.category,
            cashback: Decimal::ZERO,
            potential_cashback: None,
            best_card_id: None,
            card_id: None,
        })
    }
}

fn parse_record_date(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::default()).and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("invalid record date: {raw}")))
}

/// Body of a write request. An omitted category is stored as `"Other"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl From<&Transaction> for NewRecord {
    fn from(txn: &Transaction) -> Self {
        Self {
            name: txn.name.clone(),
            amount: txn.amount,
            date: txn.date.format("%Y-%m-%d").to_string(),
            category: Some(txn.category.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    transactions: Vec<RemoteRecord>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    transaction: RemoteRecord,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct RemoteClient {
    base_url: String,
    user_id: String,
    page_size: u32,
    client: Client,
}

impl RemoteClient {
    pub fn new(base_url: &str, user_id: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        if page_size > 0 {
            self.page_size = page_size;
        }
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/transactions", self.base_url)
    }

    /// The caller's most recent records, newest first.
    pub fn list(&self, limit: Option<u32>) -> Result<Vec<RemoteRecord>, StoreError> {
        let limit = limit.unwrap_or(self.page_size);
        debug!(url = %self.endpoint(), limit, "listing remote records");
        let resp = self
            .client
            .get(self.endpoint())
            .header(USER_HEADER, &self.user_id)
            .query(&[("limit", limit)])
            .send()?;
        let body: ListResponse = check(resp)?.json()?;
        Ok(body.transactions)
    }

    pub fn put(&self, record: &NewRecord) -> Result<RemoteRecord, StoreError> {
        debug!(url = %self.endpoint(), name = %record.name, "writing remote record");
        let resp = self
            .client
            .post(self.endpoint())
            .header(USER_HEADER, &self.user_id)
            .json(record)
            .send()?;
        let body: PutResponse = check(resp)?.json()?;
        Ok(body.transaction)
    }
}

fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp
        .json::<ErrorResponse>()
        .map(|e| e.error)
        .unwrap_or_else(|_| "no details".to_string());
    Err(StoreError::Remote(format!("HTTP {status}: {detail}")))
}

impl TransactionRepository for RemoteClient {
    fn fetch_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut out = self
            .list(None)?
            .into_iter()
            .map(RemoteRecord::into_transaction)
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn record_without_category_defaults_to_other() {
        let raw = r#"{
            "userId": "u1",
            "sortKey": "txn#2025-11-02#6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60",
            "txnId": "6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60",
            "name": "Uber",
            "amount": 22.4,
            "date": "2025-11-02"
        }"#;
        let record: RemoteRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.category, "Other");
        assert_eq!(record.amount, dec!(22.4));

        let txn = record.into_transaction().unwrap();
        assert_eq!(txn.date.format("%Y-%m-%d").to_string(), "2025-11-02");
        assert_eq!(txn.cashback, Decimal::ZERO);
        assert_eq!(txn.card_id, None);
    }

    #[test]
    fn new_record_omits_missing_category() {
        let record = NewRecord {
            name: "Target".into(),
            amount: dec!(43.80),
            date: "2025-04-12".into(),
            category: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("category").is_none());
        assert_eq!(json["amount"], 43.8);
        assert_eq!(json["date"], "2025-04-12");
    }

    #[test]
    fn bad_record_date_is_corrupt() {
        let err = parse_record_date("12/04/2025").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
