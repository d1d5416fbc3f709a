use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::config::AppPaths;
use crate::domain::{CardId, CreditCard, RewardRule, Transaction, TransactionId, Wallet};
use crate::error::StoreError;
use crate::store::{Store, TransactionFilter, TransactionRepository, Write};

/// SQLite-backed store. One file per data directory.
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths) -> Result<(Self, PathBuf), StoreError> {
        fs::create_dir_all(&paths.data_dir)?;
        let db_path = paths.data_dir.join("stack.sqlite3");
        let db = Self::open_at(&db_path)?;
        Ok((db, db_path))
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        debug!(path = %path.display(), "opened store");
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                balance TEXT NOT NULL,
                due_date TEXT NOT NULL,
                benefits TEXT NOT NULL DEFAULT '',
                last_four TEXT,
                is_points INTEGER NOT NULL DEFAULT 0,
                point_value TEXT
            );

            CREATE TABLE IF NOT EXISTS reward_rules (
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                category TEXT NOT NULL,
                multiplier TEXT NOT NULL,
                PRIMARY KEY (card_id, category)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                category TEXT NOT NULL,
                cashback TEXT NOT NULL,
                potential_cashback TEXT,
                best_card_id TEXT REFERENCES cards(id) ON DELETE SET NULL,
                card_id TEXT REFERENCES cards(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_card ON transactions(card_id);
            "#,
        )?;
        Ok(())
    }

    fn load_rules(&self, card_id: &str) -> Result<Vec<RewardRule>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT category, multiplier FROM reward_rules WHERE card_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![card_id], |row| {
            let category: String = row.get(0)?;
            let multiplier: String = row.get(1)?;
            Ok((category, multiplier))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (category, multiplier) = row?;
            out.push(RewardRule {
                category,
                multiplier: parse_decimal(&multiplier, "reward_rules.multiplier")?,
            });
        }
        Ok(out)
    }
}

/// Fixed-width UTC timestamps, so text order is date order.
fn encode_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_date(raw: &str, field: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp in {field}: {raw}")))
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, StoreError> {
    raw.parse::<Decimal>()
        .map_err(|_| StoreError::Corrupt(format!("invalid decimal in {field}: {raw}")))
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|_| StoreError::Corrupt(format!("invalid id in {field}: {raw}")))
}

fn apply_write(tx: &rusqlite::Transaction<'_>, write: &Write) -> Result<(), StoreError> {
    match write {
        Write::InsertCard(card) => {
            tx.execute(
                r#"
                INSERT INTO cards (id, name, balance, due_date, benefits, last_four, is_points, point_value)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    card.id.to_string(),
                    card.name,
                    card.balance.to_string(),
                    card.due_date.to_string(),
                    card.benefits,
                    card.last_four,
                    card.is_points,
                    card.point_value.map(|v| v.to_string()),
                ],
            )?;
            for (position, rule) in card.rewards.iter().enumerate() {
                tx.execute(
                    "INSERT INTO reward_rules (card_id, position, category, multiplier) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        card.id.to_string(),
                        position as i64,
                        rule.category,
                        rule.multiplier.to_string(),
                    ],
                )?;
            }
        }
        Write::DeleteCard(id) => {
            let changed = tx.execute("DELETE FROM cards WHERE id = ?1", params![id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("card {id}")));
            }
        }
        Write::InsertTransaction(txn) => {
            tx.execute(
                r#"
                INSERT INTO transactions (id, name, date, amount, category, cashback, potential_cashback, best_card_id, card_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    txn.id.to_string(),
                    txn.name,
                    encode_date(txn.date),
                    txn.amount.to_string(),
                    txn.category,
                    txn.cashback.to_string(),
                    txn.potential_cashback.map(|v| v.to_string()),
                    txn.best_card_id.map(|id| id.to_string()),
                    txn.card_id.map(|id| id.to_string()),
                ],
            )?;
        }
        Write::DeleteTransaction(id) => {
            let changed = tx.execute(
                "DELETE FROM transactions WHERE id = ?1",
                params![id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("transaction {id}")));
            }
        }
        Write::SetBalance { card, balance } => {
            let changed = tx.execute(
                "UPDATE cards SET balance = ?1 WHERE id = ?2",
                params![balance.to_string(), card.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("card {card}")));
            }
        }
    }
    Ok(())
}

impl TransactionRepository for Db {
    fn fetch_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch(&TransactionFilter::default())
    }
}

impl Store for Db {
    fn commit(&mut self, writes: Vec<Write>) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for write in &writes {
            apply_write(&tx, write)?;
        }
        tx.commit()?;
        debug!(writes = writes.len(), "committed batch");
        Ok(())
    }

    fn fetch(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE (?1 IS NULL OR card_id = ?1)
              AND (?2 IS NULL OR date >= ?2)
            ORDER BY date DESC, rowid DESC
            LIMIT ?3
            "#
        ))?;

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(
            params![
                filter.card.map(|id| id.to_string()),
                filter.since.map(encode_date),
                limit,
            ],
            read_transaction_row,
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(decode_transaction(row?)?);
        }
        Ok(out)
    }

    fn load_wallet(&self) -> Result<Wallet, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, balance, due_date, benefits, last_four, is_points, point_value
            FROM cards
            ORDER BY rowid ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let balance: String = row.get(2)?;
            let due_date: String = row.get(3)?;
            let benefits: String = row.get(4)?;
            let last_four: Option<String> = row.get(5)?;
            let is_points: bool = row.get(6)?;
            let point_value: Option<String> = row.get(7)?;
            Ok((
                id,
                name,
                balance,
                due_date,
                benefits,
                last_four,
                is_points,
                point_value,
            ))
        })?;

        let mut cards = Vec::new();
        for row in rows {
            let (id, name, balance, due_date, benefits, last_four, is_points, point_value) = row?;
            let rewards = self.load_rules(&id)?;
            cards.push(CreditCard {
                id: CardId(parse_uuid(&id, "cards.id")?),
                name,
                balance: parse_decimal(&balance, "cards.balance")?,
                due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d").map_err(|_| {
                    StoreError::Corrupt(format!("invalid date in cards.due_date: {due_date}"))
                })?,
                benefits,
                last_four,
                is_points,
                point_value: point_value
                    .map(|v| parse_decimal(&v, "cards.point_value"))
                    .transpose()?,
                rewards,
            });
        }
        Ok(Wallet::new(cards))
    }
}

impl Db {
    /// Looks a transaction up by full id or unique id prefix.
    pub fn find_transaction(&self, needle: &str) -> Result<Option<Transaction>, StoreError> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE substr(id, 1, length(?1)) = lower(?1) LIMIT 2"
        ))?;
        let rows = stmt
            .query_map(params![needle], read_transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;

        match <[RawTransaction; 1]>::try_from(rows) {
            Ok([raw]) => Ok(Some(decode_transaction(raw)?)),
            Err(_) => Ok(None),
        }
    }
}

const TRANSACTION_COLUMNS: &str =
    "id, name, date, amount, category, cashback, potential_cashback, best_card_id, card_id";

type RawTransaction = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_transaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTransaction> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_transaction(raw: RawTransaction) -> Result<Transaction, StoreError> {
    let (id, name, date, amount, category, cashback, potential, best_card_id, card_id) = raw;
    Ok(Transaction {
        id: TransactionId(parse_uuid(&id, "transactions.id")?),
        name,
        date: parse_date(&date, "transactions.date")?,
        amount: parse_decimal(&amount, "transactions.amount")?,
        category,
        cashback: parse_decimal(&cashback, "transactions.cashback")?,
        potential_cashback: potential
            .map(|p| parse_decimal(&p, "transactions.potential_cashback"))
            .transpose()?,
        best_card_id: best_card_id
            .map(|c| parse_uuid(&c, "transactions.best_card_id").map(CardId))
            .transpose()?,
        card_id: card_id
            .map(|c| parse_uuid(&c, "transactions.card_id").map(CardId))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_at(&dir.path().join("test.sqlite3")).unwrap();
        (dir, db)
    }

    fn gold() -> CreditCard {
        CreditCard::new("Gold", dec!(100.00), NaiveDate::from_ymd_opt(2025, 11, 5).unwrap())
            .with_last_four("5678")
            .with_rule("Dining", dec!(0.04))
            .unwrap()
            .with_rule("Other", dec!(0.01))
            .unwrap()
    }

    fn txn(card: CardId, day: u32, amount: Decimal) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            name: format!("day {day}"),
            date: Utc.with_ymd_and_hms(2025, 10, day, 9, 30, 0).unwrap(),
            amount,
            category: "Dining".into(),
            cashback: amount * dec!(0.04),
            potential_cashback: Some(dec!(9.99)),
            best_card_id: Some(card),
            card_id: Some(card),
        }
    }

    #[test]
    fn wallet_round_trips_with_rules_in_order() {
        let (_dir, mut db) = test_db();
        let card = gold();
        db.commit(vec![Write::InsertCard(card.clone())]).unwrap();

        let wallet = db.load_wallet().unwrap();
        assert_eq!(wallet.cards(), &[card]);
    }

    #[test]
    fn transactions_come_back_newest_first() {
        let (_dir, mut db) = test_db();
        let card = gold();
        let id = card.id;
        let a = txn(id, 1, dec!(10.00));
        let b = txn(id, 20, dec!(-4.25));
        let c = txn(id, 7, dec!(8.75));
        db.commit(vec![
            Write::InsertCard(card),
            Write::InsertTransaction(a.clone()),
            Write::InsertTransaction(b.clone()),
            Write::InsertTransaction(c.clone()),
        ])
        .unwrap();

        assert_eq!(db.fetch_transactions().unwrap(), vec![b, c, a]);
    }

    #[test]
    fn failed_write_rolls_back_whole_batch() {
        let (_dir, mut db) = test_db();
        let card = gold();
        let id = card.id;
        db.commit(vec![Write::InsertCard(card)]).unwrap();

        let err = db
            .commit(vec![
                Write::SetBalance {
                    card: id,
                    balance: dec!(500),
                },
                Write::DeleteTransaction(TransactionId::new()),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(db.load_wallet().unwrap().cards()[0].balance(), dec!(100.00));
    }

    #[test]
    fn deleting_card_cascades_rules_and_detaches_transactions() {
        let (_dir, mut db) = test_db();
        let card = gold();
        let id = card.id;
        db.commit(vec![
            Write::InsertCard(card),
            Write::InsertTransaction(txn(id, 3, dec!(12.00))),
        ])
        .unwrap();
        db.commit(vec![Write::DeleteCard(id)]).unwrap();

        let rules: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM reward_rules", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rules, 0);
        let all = db.fetch_transactions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].card_id, None);
        assert_eq!(all[0].best_card_id, None);
    }

    #[test]
    fn find_transaction_by_prefix() {
        let (_dir, mut db) = test_db();
        let card = gold();
        let t = txn(card.id, 3, dec!(12.00));
        db.commit(vec![Write::InsertCard(card), Write::InsertTransaction(t.clone())])
            .unwrap();

        let prefix = &t.id.to_string()[..8];
        assert_eq!(db.find_transaction(prefix).unwrap(), Some(t.clone()));
        assert_eq!(db.find_transaction("zzzz").unwrap(), None);
        assert_eq!(
            db.find_transaction(&prefix.to_uppercase()).unwrap().map(|f| f.id),
            Some(t.id)
        );
    }

    #[test]
    fn find_transaction_treats_wildcards_literally() {
        let (_dir, mut db) = test_db();
        let card = gold();
        let t = txn(card.id, 3, dec!(12.00));
        db.commit(vec![Write::InsertCard(card), Write::InsertTransaction(t)])
            .unwrap();

        for needle in ["%", "_", "%%", "________"] {
            assert_eq!(db.find_transaction(needle).unwrap(), None, "{needle}");
        }
    }
}
