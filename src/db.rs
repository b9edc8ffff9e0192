// 🗄️ Persistence - statements, transactions, merchant overrides, audit events
//
// The parser never touches SQL. Parsed statements are handed over by value;
// this module owns surrogate ids, user linkage and timestamps.

use crate::banks::BankCode;
use crate::categorize::{MerchantOverride, OverrideStore};
use crate::error::{Result, StatementError};
use crate::statement::{Direction, ParsedStatement};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Transaction row as stored for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: String,
    pub statement_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub merchant_key: String,
    pub amount_cents: i64,
    pub direction: Direction,
    pub category: Option<String>,
}

/// Statement row without its transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStatement {
    pub id: String,
    pub user_id: String,
    pub bank: BankCode,
    pub document_hash: Option<String>,
    pub statement_date: Option<NaiveDate>,
    pub transaction_count: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a file database in WAL mode
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        // WAL for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Database { conn };
        db.setup_schema()?;
        info!(path = ?path.as_ref(), "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.setup_schema()?;
        Ok(db)
    }

    fn setup_schema(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        // ======================================================================
        // Statements (one row per upload, unique per user + document bytes)
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS statements (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                bank TEXT NOT NULL,
                document_hash TEXT,
                card_last_four TEXT,
                statement_date TEXT,
                due_date TEXT,
                total_due_cents INTEGER,
                closing_balance_cents INTEGER,
                payload TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, document_hash)
            )",
            [],
        )?;

        // ======================================================================
        // Transactions
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                statement_id TEXT NOT NULL REFERENCES statements(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                is_credit INTEGER NOT NULL,
                category TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // ======================================================================
        // Merchant overrides (last write wins per user + key)
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS merchant_category_overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                category TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_key)
            )",
            [],
        )?;

        // ======================================================================
        // Events (audit trail)
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        // ======================================================================
        // Indexes
        // ======================================================================
        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_transactions_user_merchant
             ON transactions(user_id, merchant_key)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_statement ON transactions(statement_id)",
            "CREATE INDEX IF NOT EXISTS idx_statements_user ON statements(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id, timestamp)",
        ] {
            self.conn.execute(ddl, [])?;
        }

        Ok(())
    }

    // ==========================================================================
    // STATEMENTS
    // ==========================================================================

    /// Store a parsed statement and its transactions for `user_id`
    pub fn save_statement(&self, user_id: &str, statement: &ParsedStatement) -> Result<Uuid> {
        let statement_id = Uuid::new_v4();
        let payload = serde_json::to_string(statement)?;
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT INTO statements (
                id, user_id, bank, document_hash, card_last_four, statement_date,
                due_date, total_due_cents, closing_balance_cents, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                statement_id.to_string(),
                user_id,
                statement.bank.code(),
                statement.document_hash,
                statement.header.card_last_four,
                statement.header.statement_date.map(|d| d.format(DATE_FORMAT).to_string()),
                statement.header.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                statement.header.total_due_cents,
                statement.header.closing_balance_cents,
                payload,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StatementError::DuplicateStatement);
            }
            Err(e) => return Err(e.into()),
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO transactions (
                    id, statement_id, user_id, position, date, description,
                    merchant_key, amount_cents, is_credit, category
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for (position, txn) in statement.transactions.iter().enumerate() {
                insert.execute(params![
                    Uuid::new_v4().to_string(),
                    statement_id.to_string(),
                    user_id,
                    position as i64,
                    txn.date.format(DATE_FORMAT).to_string(),
                    txn.description,
                    txn.merchant_key,
                    txn.amount_cents,
                    !txn.is_debit(),
                    txn.category,
                ])?;
            }
        }

        record_event(
            &tx,
            "statement_saved",
            user_id,
            &statement_id.to_string(),
            serde_json::json!({
                "bank": statement.bank.code(),
                "transactions": statement.transactions.len(),
            }),
        )?;
        tx.commit()?;

        info!(
            user = %user_id,
            statement = %statement_id,
            transactions = statement.transactions.len(),
            "statement saved"
        );
        Ok(statement_id)
    }

    pub fn list_statements(&self, user_id: &str) -> Result<Vec<StoredStatement>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.user_id, s.bank, s.document_hash, s.statement_date,
                    (SELECT COUNT(*) FROM transactions t WHERE t.statement_id = s.id)
             FROM statements s
             WHERE s.user_id = ?1
             ORDER BY s.created_at, s.rowid",
        )?;

        let statements = stmt
            .query_map(params![user_id], |row| {
                let statement_date: Option<String> = row.get(4)?;
                Ok(StoredStatement {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    bank: BankCode::from_code(&row.get::<_, String>(2)?),
                    document_hash: row.get(3)?,
                    statement_date: statement_date.map(|d| parse_date_column(4, &d)).transpose()?,
                    transaction_count: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(statements)
    }

    // ==========================================================================
    // TRANSACTIONS
    // ==========================================================================

    /// Every transaction of `user_id`, in statement then printed order
    pub fn user_transactions(&self, user_id: &str) -> Result<Vec<StoredTransaction>> {
        self.query_transactions(
            "SELECT t.id, t.statement_id, t.date, t.description, t.merchant_key,
                    t.amount_cents, t.is_credit, t.category
             FROM transactions t JOIN statements s ON s.id = t.statement_id
             WHERE t.user_id = ?1
             ORDER BY s.created_at, s.rowid, t.position",
            user_id,
        )
    }

    pub fn statement_transactions(&self, statement_id: &str) -> Result<Vec<StoredTransaction>> {
        self.query_transactions(
            "SELECT id, statement_id, date, description, merchant_key,
                    amount_cents, is_credit, category
             FROM transactions
             WHERE statement_id = ?1
             ORDER BY position",
            statement_id,
        )
    }

    fn query_transactions(&self, sql: &str, key: &str) -> Result<Vec<StoredTransaction>> {
        let mut stmt = self.conn.prepare(sql)?;

        let transactions = stmt
            .query_map(params![key], |row| {
                let date: String = row.get(2)?;
                let is_credit: bool = row.get(6)?;
                Ok(StoredTransaction {
                    id: row.get(0)?,
                    statement_id: row.get(1)?,
                    date: parse_date_column(2, &date)?,
                    description: row.get(3)?,
                    merchant_key: row.get(4)?,
                    amount_cents: row.get(5)?,
                    direction: if is_credit { Direction::Credit } else { Direction::Debit },
                    category: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Number of audit events recorded for a user
    pub fn event_count(&self, user_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_date_column(idx: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Append an audit event inside the caller's transaction
fn record_event(
    conn: &Connection,
    event_type: &str,
    user_id: &str,
    entity_id: &str,
    data: serde_json::Value,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, user_id, entity_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4().to_string(),
            Utc::now().to_rfc3339(),
            event_type,
            user_id,
            entity_id,
            data.to_string(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// OVERRIDES
// ============================================================================

impl OverrideStore for Database {
    fn find_override(&self, user_id: &str, merchant_key: &str) -> Result<Option<String>> {
        let category = self
            .conn
            .query_row(
                "SELECT category FROM merchant_category_overrides
                 WHERE user_id = ?1 AND merchant_key = ?2",
                params![user_id, merchant_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(category)
    }

    fn upsert_override(&self, user_id: &str, merchant_key: &str, category: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO merchant_category_overrides (user_id, merchant_key, category)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, merchant_key)
             DO UPDATE SET category = excluded.category, updated_at = CURRENT_TIMESTAMP",
            params![user_id, merchant_key, category],
        )?;
        let updated = tx.execute(
            "UPDATE transactions SET category = ?1
             WHERE user_id = ?2 AND merchant_key = ?3 AND is_credit = 0",
            params![category, user_id, merchant_key],
        )?;
        record_event(
            &tx,
            "override_applied",
            user_id,
            merchant_key,
            serde_json::json!({ "category": category, "updated": updated }),
        )?;

        tx.commit()?;
        debug!(user = %user_id, merchant = %merchant_key, updated, "override upserted");
        Ok(updated)
    }

    fn delete_override(
        &self,
        user_id: &str,
        merchant_key: &str,
        fallback_category: &str,
    ) -> Result<Option<usize>> {
        let tx = self.conn.unchecked_transaction()?;

        let deleted = tx.execute(
            "DELETE FROM merchant_category_overrides WHERE user_id = ?1 AND merchant_key = ?2",
            params![user_id, merchant_key],
        )?;
        if deleted == 0 {
            return Ok(None);
        }
        let updated = tx.execute(
            "UPDATE transactions SET category = ?1
             WHERE user_id = ?2 AND merchant_key = ?3 AND is_credit = 0",
            params![fallback_category, user_id, merchant_key],
        )?;
        record_event(
            &tx,
            "override_removed",
            user_id,
            merchant_key,
            serde_json::json!({ "category": fallback_category, "updated": updated }),
        )?;

        tx.commit()?;
        Ok(Some(updated))
    }

    fn list_overrides(&self, user_id: &str) -> Result<Vec<MerchantOverride>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, merchant_key, category
             FROM merchant_category_overrides
             WHERE user_id = ?1
             ORDER BY merchant_key",
        )?;

        let overrides = stmt
            .query_map(params![user_id], |row| {
                Ok(MerchantOverride {
                    user_id: row.get(0)?,
                    merchant_key: row.get(1)?,
                    category: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Categorizer;
    use crate::rules::RuleEngine;
    use crate::statement::ParsedTransaction;

    fn txn(day: u32, description: &str, cents: i64, direction: Direction) -> ParsedTransaction {
        let date = NaiveDate::from_ymd_opt(2026, 1, day).unwrap();
        let mut t = ParsedTransaction::new(date, description, cents, direction);
        t.category = Some("food".to_string());
        t
    }

    fn statement(hash: &str, transactions: Vec<ParsedTransaction>) -> ParsedStatement {
        ParsedStatement {
            bank: BankCode::Sbi,
            header: Default::default(),
            transactions,
            metadata: Default::default(),
            document_hash: Some(hash.to_string()),
        }
    }

    #[test]
    fn test_save_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .save_statement(
                "u1",
                &statement(
                    "h1",
                    vec![
                        txn(1, "SWIGGY", 45_000, Direction::Debit),
                        txn(2, "REFUND", 10_000, Direction::Credit),
                    ],
                ),
            )
            .unwrap();

        let rows = db.statement_transactions(&id.to_string()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].merchant_key, "SWIGGY");
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(rows[1].direction, Direction::Credit);

        let statements = db.list_statements("u1").unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].bank, BankCode::Sbi);
        assert_eq!(statements[0].transaction_count, 2);
        assert_eq!(db.event_count("u1").unwrap(), 1);
    }

    #[test]
    fn test_payload_holds_the_full_statement() {
        let db = Database::open_in_memory().unwrap();
        let saved = statement("h9", vec![txn(3, "APOLLO", 12_550, Direction::Debit)]);
        let id = db.save_statement("u1", &saved).unwrap();

        let payload: String = db
            .conn
            .query_row(
                "SELECT payload FROM statements WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        let restored: ParsedStatement = serde_json::from_str(&payload).unwrap();
        assert_eq!(restored, saved);
    }

    #[test]
    fn test_duplicate_upload_is_rejected_per_user() {
        let db = Database::open_in_memory().unwrap();
        db.save_statement("u1", &statement("same", vec![])).unwrap();

        let err = db.save_statement("u1", &statement("same", vec![])).unwrap_err();
        assert!(matches!(err, StatementError::DuplicateStatement));

        // another user may upload the same document
        assert!(db.save_statement("u2", &statement("same", vec![])).is_ok());
        assert_eq!(db.list_statements("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_override_updates_debits_only() {
        let db = Database::open_in_memory().unwrap();
        let rows = vec![
            txn(1, "SWIGGY", 10_000, Direction::Debit),
            txn(2, "SWIGGY", 20_000, Direction::Debit),
            txn(3, "SWIGGY", 30_000, Direction::Debit),
            txn(4, "SWIGGY", 5_000, Direction::Credit),
        ];
        db.save_statement("u1", &statement("a", rows.clone())).unwrap();
        db.save_statement("u2", &statement("a", rows)).unwrap();

        let rules = RuleEngine::builtin();
        let outcome = Categorizer::new(&rules, &db)
            .apply_override("u1", "swiggy", "shopping")
            .unwrap();
        assert_eq!(outcome.updated_transactions_count, 3);

        let mine = db.user_transactions("u1").unwrap();
        let categories: Vec<_> = mine.iter().map(|t| t.category.as_deref().unwrap()).collect();
        assert_eq!(categories, vec!["shopping", "shopping", "shopping", "food"]);

        let theirs = db.user_transactions("u2").unwrap();
        assert!(theirs.iter().all(|t| t.category.as_deref() == Some("food")));

        println!("✅ Override touched 3 debits, left the credit and the other user alone");
    }

    #[test]
    fn test_override_rows() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_override("u1", "ZOMATO", "food").unwrap();
        db.upsert_override("u1", "AMAZON", "shopping").unwrap();
        db.upsert_override("u1", "ZOMATO", "travel").unwrap();

        assert_eq!(db.find_override("u1", "ZOMATO").unwrap().as_deref(), Some("travel"));
        assert_eq!(db.find_override("u2", "ZOMATO").unwrap(), None);

        let keys: Vec<_> = db
            .list_overrides("u1")
            .unwrap()
            .into_iter()
            .map(|o| o.merchant_key)
            .collect();
        assert_eq!(keys, vec!["AMAZON", "ZOMATO"]);

        assert_eq!(db.delete_override("u1", "AMAZON", "shopping").unwrap(), Some(0));
        assert_eq!(db.delete_override("u1", "AMAZON", "shopping").unwrap(), None);
    }
}
