//! SQLite persistence adapter.
//!
//! decimals are stored as TEXT, never REAL, so every value reads back exactly
//! as it was written. multi-row writes run inside one SQLite transaction.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{check_owner, LoanStore, StoreError, StoreResult};
use crate::decimal::{Money, Rate};
use crate::loan::Loan;
use crate::transaction::Transaction;
use crate::types::{LoanId, LoanStatus, StatementCycleDay, TransactionType};

const LOAN_COLUMNS: &str = "id, customer_key, principal, balance, accrued_interest, \
     base_rate, rate_variance, effective_rate, statement_cycle_day, last_accrual_date, \
     status, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, loan_id, amount, type, timestamp";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// open a private in-memory database (used in tests)
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("../../migrations/0001_ledger.sql"))?;
        debug!("sqlite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn loan_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
        let found = conn
            .query_row("SELECT 1 FROM loans WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_loan(conn: &Connection, loan: &Loan) -> StoreResult<()> {
        let row = LoanRow::from(loan);
        if Self::loan_exists(conn, &row.id)? {
            return Err(StoreError::DuplicateLoan { id: loan.id });
        }
        conn.execute(
            &format!(
                "INSERT INTO loans ({LOAN_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                row.id,
                row.customer_key,
                row.principal,
                row.balance,
                row.accrued_interest,
                row.base_rate,
                row.rate_variance,
                row.effective_rate,
                row.statement_cycle_day,
                row.last_accrual_date,
                row.status,
                row.version,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// replace the loan row; `expected_version` adds an optimistic check.
    /// returns the number of rows changed.
    fn replace_loan(conn: &Connection, loan: &Loan, expected_version: Option<u64>) -> StoreResult<usize> {
        let row = LoanRow::from(loan);
        let version_guard = expected_version.map(|v| v as i64);
        let changed = conn.execute(
            "UPDATE loans SET customer_key = ?2, principal = ?3, balance = ?4, \
             accrued_interest = ?5, base_rate = ?6, rate_variance = ?7, effective_rate = ?8, \
             statement_cycle_day = ?9, last_accrual_date = ?10, status = ?11, version = ?12, \
             created_at = ?13, updated_at = ?14 \
             WHERE id = ?1 AND (?15 IS NULL OR version = ?15)",
            params![
                row.id,
                row.customer_key,
                row.principal,
                row.balance,
                row.accrued_interest,
                row.base_rate,
                row.rate_variance,
                row.effective_rate,
                row.statement_cycle_day,
                row.last_accrual_date,
                row.status,
                row.version,
                row.created_at,
                row.updated_at,
                version_guard,
            ],
        )?;
        Ok(changed)
    }

    fn insert_transaction(conn: &Connection, transaction: &Transaction) -> StoreResult<()> {
        let row = TransactionRow::from(transaction);
        if !Self::loan_exists(conn, &row.loan_id)? {
            return Err(StoreError::LoanNotFound {
                id: transaction.loan_id,
            });
        }
        conn.execute(
            &format!("INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![row.id, row.loan_id, row.amount, row.transaction_type, row.timestamp],
        )?;
        Ok(())
    }

    fn query_loans(&self, filter: &str) -> StoreResult<Vec<Loan>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans {filter} ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([], LoanRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Loan::try_from).collect()
    }
}

impl LoanStore for SqliteStore {
    fn create_loan(&self, loan: &Loan) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::insert_loan(&tx, loan)?;
        tx.commit()?;
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Loan> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?1"),
                [id.to_string()],
                LoanRow::read,
            )
            .optional()?
            .ok_or(StoreError::LoanNotFound { id })?;
        Loan::try_from(row)
    }

    fn update_loan(&self, loan: &Loan) -> StoreResult<()> {
        let conn = self.conn()?;
        if Self::replace_loan(&conn, loan, None)? == 0 {
            return Err(StoreError::LoanNotFound { id: loan.id });
        }
        Ok(())
    }

    fn delete_loan(&self, id: LoanId) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let key = id.to_string();

        let removed_transactions = tx.execute("DELETE FROM transactions WHERE loan_id = ?1", [&key])?;
        if tx.execute("DELETE FROM loans WHERE id = ?1", [&key])? == 0 {
            // dropping the sqlite transaction rolls back
            return Err(StoreError::LoanNotFound { id });
        }
        tx.commit()?;

        debug!(loan_id = %id, removed_transactions, "deleted loan");
        Ok(())
    }

    fn list_all_loans(&self) -> StoreResult<Vec<Loan>> {
        self.query_loans("")
    }

    fn list_active_loans(&self) -> StoreResult<Vec<Loan>> {
        self.query_loans("WHERE status = 'active'")
    }

    fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::insert_transaction(&tx, transaction)?;
        tx.commit()?;
        Ok(())
    }

    fn list_transactions_for_loan(&self, id: LoanId) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE loan_id = ?1 \
             ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let rows = stmt
            .query_map([id.to_string()], TransactionRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    fn open_loan(&self, loan: &Loan, disbursement: &Transaction) -> StoreResult<()> {
        check_owner(loan, disbursement)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::insert_loan(&tx, loan)?;
        Self::insert_transaction(&tx, disbursement)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        transaction: Option<&Transaction>,
    ) -> StoreResult<()> {
        if let Some(transaction) = transaction {
            check_owner(loan, transaction)?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if Self::replace_loan(&tx, loan, Some(expected_version))? == 0 {
            let found: Option<i64> = tx
                .query_row(
                    "SELECT version FROM loans WHERE id = ?1",
                    [loan.id.to_string()],
                    |r| r.get(0),
                )
                .optional()?;
            return Err(match found {
                None => StoreError::LoanNotFound { id: loan.id },
                Some(found) => StoreError::Conflict {
                    id: loan.id,
                    expected: expected_version,
                    found: found as u64,
                },
            });
        }

        if let Some(transaction) = transaction {
            Self::insert_transaction(&tx, transaction)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// loan as stored: every field in its column representation
struct LoanRow {
    id: String,
    customer_key: String,
    principal: String,
    balance: String,
    accrued_interest: String,
    base_rate: String,
    rate_variance: String,
    effective_rate: String,
    statement_cycle_day: i64,
    last_accrual_date: Option<String>,
    status: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl LoanRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            customer_key: row.get(1)?,
            principal: row.get(2)?,
            balance: row.get(3)?,
            accrued_interest: row.get(4)?,
            base_rate: row.get(5)?,
            rate_variance: row.get(6)?,
            effective_rate: row.get(7)?,
            statement_cycle_day: row.get(8)?,
            last_accrual_date: row.get(9)?,
            status: row.get(10)?,
            version: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl From<&Loan> for LoanRow {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id.to_string(),
            customer_key: loan.customer_key.clone(),
            principal: loan.principal.to_string(),
            balance: loan.balance.to_string(),
            accrued_interest: loan.accrued_interest.to_string(),
            base_rate: loan.base_rate.to_string(),
            rate_variance: loan.rate_variance.to_string(),
            effective_rate: loan.effective_rate.to_string(),
            statement_cycle_day: i64::from(loan.statement_cycle_day.day()),
            last_accrual_date: loan.last_accrual_date.map(|d| d.to_string()),
            status: loan.status.as_str().to_string(),
            version: loan.version as i64,
            created_at: format_timestamp(loan.created_at),
            updated_at: format_timestamp(loan.updated_at),
        }
    }
}

impl TryFrom<LoanRow> for Loan {
    type Error = StoreError;

    fn try_from(row: LoanRow) -> StoreResult<Self> {
        let statement_cycle_day = u8::try_from(row.statement_cycle_day)
            .ok()
            .and_then(StatementCycleDay::new)
            .ok_or_else(|| corrupt("statement_cycle_day", row.statement_cycle_day, "outside 1..=28"))?;

        let last_accrual_date = row
            .last_accrual_date
            .as_deref()
            .map(|s| s.parse::<NaiveDate>().map_err(|e| corrupt("last_accrual_date", s, e)))
            .transpose()?;

        Ok(Loan {
            id: parse_uuid("id", &row.id)?,
            customer_key: row.customer_key,
            principal: Money::from_decimal(parse_decimal("principal", &row.principal)?),
            balance: Money::from_decimal(parse_decimal("balance", &row.balance)?),
            accrued_interest: Money::from_decimal(parse_decimal(
                "accrued_interest",
                &row.accrued_interest,
            )?),
            base_rate: Rate::from_decimal(parse_decimal("base_rate", &row.base_rate)?),
            rate_variance: Rate::from_decimal(parse_decimal("rate_variance", &row.rate_variance)?),
            effective_rate: Rate::from_decimal(parse_decimal("effective_rate", &row.effective_rate)?),
            statement_cycle_day,
            last_accrual_date,
            status: row
                .status
                .parse::<LoanStatus>()
                .map_err(|e| corrupt("status", &row.status, e))?,
            version: u64::try_from(row.version).map_err(|e| corrupt("version", row.version, e))?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

struct TransactionRow {
    id: String,
    loan_id: String,
    amount: String,
    transaction_type: String,
    timestamp: String,
}

impl TransactionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            loan_id: row.get(1)?,
            amount: row.get(2)?,
            transaction_type: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }
}

impl From<&Transaction> for TransactionRow {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id.to_string(),
            loan_id: transaction.loan_id.to_string(),
            amount: transaction.amount.to_string(),
            transaction_type: transaction.transaction_type.as_str().to_string(),
            timestamp: format_timestamp(transaction.timestamp),
        }
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> StoreResult<Self> {
        Ok(Transaction {
            id: parse_uuid("transaction id", &row.id)?,
            loan_id: parse_uuid("loan_id", &row.loan_id)?,
            amount: Money::from_decimal(parse_decimal("amount", &row.amount)?),
            transaction_type: row
                .transaction_type
                .parse::<TransactionType>()
                .map_err(|e| corrupt("type", &row.transaction_type, e))?,
            timestamp: parse_timestamp("timestamp", &row.timestamp)?,
        })
    }
}

// fixed-width so text ordering matches time ordering
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(field: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(field, value, e))
}

fn parse_decimal(field: &str, value: &str) -> StoreResult<Decimal> {
    Decimal::from_str_exact(value).map_err(|e| corrupt(field, value, e))
}

fn parse_uuid(field: &str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| corrupt(field, value, e))
}

fn corrupt(field: &str, value: impl Display, err: impl Display) -> StoreError {
    StoreError::Corrupt {
        message: format!("{field} = {value:?}: {err}", value = value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan::originate(
            "cust-7".to_string(),
            Money::from_decimal(dec!(1000.00)),
            Rate::from_decimal(dec!(0.12)),
            Rate::from_decimal(dec!(-0.02)),
            StatementCycleDay::new(28).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_decimals_round_trip_exactly() {
        let store = SqliteStore::in_memory().unwrap();
        let mut loan = loan();
        // 28 significant digits, would not survive a REAL column
        loan.accrued_interest = Money::from_decimal(dec!(1000.00) * (dec!(0.10) / dec!(365)));
        loan.last_accrual_date = NaiveDate::from_ymd_opt(2024, 1, 2);
        store.create_loan(&loan).unwrap();

        let stored = store.get_loan(loan.id).unwrap();
        assert_eq!(stored, loan);
        assert_eq!(stored.accrued_interest.to_string(), loan.accrued_interest.to_string());
        assert_eq!(stored.principal.to_string(), "1000.00");
    }

    #[test]
    fn test_open_loan_is_atomic() {
        let store = SqliteStore::in_memory().unwrap();
        let loan = loan();
        // disbursement pointing at an unknown loan aborts the whole unit
        let bad = Transaction::disbursement(Uuid::new_v4(), loan.principal, loan.created_at);
        assert!(store.open_loan(&loan, &bad).is_err());
        assert!(matches!(store.get_loan(loan.id), Err(StoreError::LoanNotFound { .. })));

        let good = Transaction::disbursement(loan.id, loan.principal, loan.created_at);
        store.open_loan(&loan, &good).unwrap();
        assert_eq!(store.list_transactions_for_loan(loan.id).unwrap(), vec![good]);
    }

    #[test]
    fn test_commit_version_check() {
        let store = SqliteStore::in_memory().unwrap();
        let original = loan();
        store.create_loan(&original).unwrap();

        let mut paid = original.clone();
        paid.balance = Money::from_major(900);
        paid.next_revision(original.created_at + Duration::minutes(1));
        let payment = Transaction::payment(paid.id, Money::from_major(100), paid.updated_at);
        store.commit_loan(&paid, 0, Some(&payment)).unwrap();

        let mut stale = original.clone();
        stale.accrued_interest = Money::ONE;
        stale.next_revision(original.created_at + Duration::minutes(2));
        let err = store.commit_loan(&stale, 0, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }));

        let stored = store.get_loan(original.id).unwrap();
        assert_eq!(stored.balance, Money::from_major(900));
        assert_eq!(stored.accrued_interest, Money::ZERO);
        assert_eq!(store.list_transactions_for_loan(original.id).unwrap(), vec![payment]);

        let mut ghost = loan();
        ghost.next_revision(Utc::now());
        assert!(matches!(store.commit_loan(&ghost, 0, None), Err(StoreError::LoanNotFound { .. })));
    }

    #[test]
    fn test_writes_reject_foreign_transactions() {
        let store = SqliteStore::in_memory().unwrap();
        let owner = loan();
        let other = loan();
        store
            .open_loan(&other, &Transaction::disbursement(other.id, other.principal, other.created_at))
            .unwrap();

        // the other loan exists, so only the ownership check can refuse these
        let foreign = Transaction::disbursement(other.id, owner.principal, owner.created_at);
        assert!(matches!(store.open_loan(&owner, &foreign), Err(StoreError::Corrupt { .. })));
        assert!(matches!(store.get_loan(owner.id), Err(StoreError::LoanNotFound { .. })));

        store.create_loan(&owner).unwrap();
        let mut paid = owner.clone();
        paid.balance = Money::from_major(900);
        paid.next_revision(owner.created_at + Duration::minutes(1));
        let payment = Transaction::payment(other.id, Money::from_major(100), paid.updated_at);
        let err = store.commit_loan(&paid, 0, Some(&payment)).unwrap_err();

        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(store.get_loan(owner.id).unwrap(), owner);
        assert_eq!(store.list_transactions_for_loan(other.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades_and_reports_missing() {
        let store = SqliteStore::in_memory().unwrap();
        let loan = loan();
        store
            .open_loan(&loan, &Transaction::disbursement(loan.id, loan.principal, loan.created_at))
            .unwrap();
        store
            .create_transaction(&Transaction::payment(loan.id, Money::from_major(10), loan.created_at))
            .unwrap();

        store.delete_loan(loan.id).unwrap();

        assert!(matches!(store.get_loan(loan.id), Err(StoreError::LoanNotFound { .. })));
        assert!(store.list_transactions_for_loan(loan.id).unwrap().is_empty());
        assert!(matches!(store.delete_loan(loan.id), Err(StoreError::LoanNotFound { .. })));
    }

    #[test]
    fn test_update_and_active_listing() {
        let store = SqliteStore::in_memory().unwrap();
        let active = loan();
        let mut closed = loan();
        closed.created_at = active.created_at + Duration::hours(1);
        store.create_loan(&active).unwrap();
        store.create_loan(&closed).unwrap();

        closed.balance = Money::ZERO;
        closed.status = LoanStatus::Closed;
        store.update_loan(&closed).unwrap();

        let all = store.list_all_loans().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, active.id);

        let listed = store.list_active_loans().unwrap();
        assert_eq!(listed, vec![active]);

        let missing = loan();
        assert!(matches!(store.update_loan(&missing), Err(StoreError::LoanNotFound { .. })));
    }

    #[test]
    fn test_transactions_keep_insertion_order_on_ties() {
        let store = SqliteStore::in_memory().unwrap();
        let loan = loan();
        store.create_loan(&loan).unwrap();

        let ts = loan.created_at;
        let first = Transaction::disbursement(loan.id, loan.principal, ts);
        let second = Transaction::payment(loan.id, Money::from_major(5), ts);
        let earlier = Transaction::payment(loan.id, Money::from_major(1), ts - Duration::seconds(1));
        for tx in [&first, &second, &earlier] {
            store.create_transaction(tx).unwrap();
        }

        assert_eq!(
            store.list_transactions_for_loan(loan.id).unwrap(),
            vec![earlier, first, second]
        );
    }

    #[test]
    fn test_corrupt_rows_are_reported() {
        let store = SqliteStore::in_memory().unwrap();
        let loan = loan();
        store.create_loan(&loan).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE loans SET balance = 'abc' WHERE id = ?1", [loan.id.to_string()])
            .unwrap();

        assert!(matches!(store.get_loan(loan.id), Err(StoreError::Corrupt { .. })));
    }
}
