use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use thiserror::Error;

use crate::amount::{from_minor_units, Amount};
use crate::entities::{Account, NewAccount};

/// How long a statement waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ERRORS
// ============================================================================

/// Column guarded by a UNIQUE constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    AccountNumber,
    NationalId,
    PhoneNumber,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UniqueField::AccountNumber => "account_number",
            UniqueField::NationalId => "nik",
            UniqueField::PhoneNumber => "phone_number",
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value for {0}")]
    Conflict(UniqueField),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt account row: {0}")]
    Corrupt(String),
    #[error("database connection is poisoned")]
    Poisoned,
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Durable account storage. Balance mutations are single conditional
/// statements and report how many rows they touched.
pub trait AccountStore: Send + Sync {
    fn find_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError>;

    fn exists_by_national_id(&self, nik: &str) -> Result<bool, StoreError>;

    fn exists_by_phone(&self, phone_number: &str) -> Result<bool, StoreError>;

    /// Insert with a zero balance. Unique violations come back as
    /// [`StoreError::Conflict`].
    fn insert(&self, account: &NewAccount) -> Result<Account, StoreError>;

    /// Decrement only if the balance covers `amount`.
    fn atomic_withdraw(&self, account_number: &str, amount: Amount) -> Result<usize, StoreError>;

    /// Increment if the account exists.
    fn atomic_deposit(&self, account_number: &str, amount: Amount) -> Result<usize, StoreError>;
}

// ============================================================================
// SQLITE
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    // (in-memory databases answer "memory" and stay that way)
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    // Balance is stored in minor units. The typeof() check stops an
    // overflowing sum from being silently stored as REAL.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            nik TEXT NOT NULL UNIQUE,
            phone_number TEXT NOT NULL UNIQUE,
            balance INTEGER NOT NULL DEFAULT 0
                CHECK (typeof(balance) = 'integer' AND balance >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

const ACCOUNT_COLUMNS: &str =
    "id, account_number, name, nik, phone_number, balance, created_at, updated_at";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

/// Raw row before timestamps are parsed.
struct AccountRow {
    id: i64,
    account_number: String,
    name: String,
    nik: String,
    phone_number: String,
    balance: i64,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AccountRow {
            id: row.get(0)?,
            account_number: row.get(1)?,
            name: row.get(2)?,
            nik: row.get(3)?,
            phone_number: row.get(4)?,
            balance: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_account(self) -> Result<Account, StoreError> {
        Ok(Account {
            id: self.id,
            account_number: self.account_number,
            name: self.name,
            nik: self.nik,
            phone_number: self.phone_number,
            balance: from_minor_units(self.balance),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Map a UNIQUE violation to the column it names.
fn unique_conflict(err: &rusqlite::Error) -> Option<UniqueField> {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) if e.code == ErrorCode::ConstraintViolation => {
            // "UNIQUE constraint failed: accounts.nik"
            let column = msg.strip_prefix("UNIQUE constraint failed: ")?;
            match column.trim() {
                "accounts.account_number" => Some(UniqueField::AccountNumber),
                "accounts.nik" => Some(UniqueField::NationalId),
                "accounts.phone_number" => Some(UniqueField::PhoneNumber),
                _ => None,
            }
        }
        _ => None,
    }
}

pub fn get_account_by_number(
    conn: &Connection,
    account_number: &str,
) -> Result<Option<Account>, StoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = ?1");
    let row = conn
        .query_row(&sql, params![account_number], AccountRow::from_row)
        .optional()?;

    row.map(AccountRow::into_account).transpose()
}

pub fn nik_exists(conn: &Connection, nik: &str) -> Result<bool, StoreError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE nik = ?1)",
        params![nik],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn phone_number_exists(conn: &Connection, phone_number: &str) -> Result<bool, StoreError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE phone_number = ?1)",
        params![phone_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn insert_account(conn: &Connection, account: &NewAccount) -> Result<Account, StoreError> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    conn.execute(
        "INSERT INTO accounts (account_number, name, nik, phone_number, balance, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![
            account.account_number,
            account.name,
            account.nik,
            account.phone_number,
            now_str,
        ],
    )
    .map_err(|e| match unique_conflict(&e) {
        Some(field) => StoreError::Conflict(field),
        None => StoreError::Database(e),
    })?;

    Ok(Account {
        id: conn.last_insert_rowid(),
        account_number: account.account_number.clone(),
        name: account.name.clone(),
        nik: account.nik.clone(),
        phone_number: account.phone_number.clone(),
        balance: from_minor_units(0),
        created_at: now,
        updated_at: now,
    })
}

/// Check-and-decrement as one statement: no read-then-write window.
pub fn withdraw_balance(
    conn: &Connection,
    account_number: &str,
    amount: Amount,
) -> Result<usize, StoreError> {
    let rows = conn.execute(
        "UPDATE accounts
         SET balance = balance - ?1,
             updated_at = ?2
         WHERE account_number = ?3 AND balance >= ?1",
        params![amount.minor_units(), Utc::now().to_rfc3339(), account_number],
    )?;
    Ok(rows)
}

pub fn deposit_balance(
    conn: &Connection,
    account_number: &str,
    amount: Amount,
) -> Result<usize, StoreError> {
    let rows = conn.execute(
        "UPDATE accounts
         SET balance = balance + ?1,
             updated_at = ?2
         WHERE account_number = ?3",
        params![amount.minor_units(), Utc::now().to_rfc3339(), account_number],
    )?;
    Ok(rows)
}

pub fn count_accounts(conn: &Connection) -> Result<i64, StoreError> {
    let count = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
    Ok(count)
}

/// [`AccountStore`] over a single SQLite connection.
///
/// `rusqlite::Connection` is not `Sync`, so calls take turns on a mutex.
/// Balance safety does not depend on that: every mutation is one
/// conditional statement.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        count_accounts(&*self.conn()?)
    }
}

impl AccountStore for SqliteStore {
    fn find_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        get_account_by_number(&*self.conn()?, account_number)
    }

    fn exists_by_national_id(&self, nik: &str) -> Result<bool, StoreError> {
        nik_exists(&*self.conn()?, nik)
    }

    fn exists_by_phone(&self, phone_number: &str) -> Result<bool, StoreError> {
        phone_number_exists(&*self.conn()?, phone_number)
    }

    fn insert(&self, account: &NewAccount) -> Result<Account, StoreError> {
        insert_account(&*self.conn()?, account)
    }

    fn atomic_withdraw(&self, account_number: &str, amount: Amount) -> Result<usize, StoreError> {
        withdraw_balance(&*self.conn()?, account_number, amount)
    }

    fn atomic_deposit(&self, account_number: &str, amount: Amount) -> Result<usize, StoreError> {
        deposit_balance(&*self.conn()?, account_number, amount)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Store whose every call fails, for checking error propagation.
    pub(crate) struct BrokenStore;

    impl AccountStore for BrokenStore {
        fn find_by_number(&self, _: &str) -> Result<Option<Account>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn exists_by_national_id(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn exists_by_phone(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn insert(&self, _: &NewAccount) -> Result<Account, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn atomic_withdraw(&self, _: &str, _: Amount) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn atomic_deposit(&self, _: &str, _: Amount) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }
    }
    use rust_decimal::Decimal;

    fn new_account(number: &str, nik: &str, phone: &str) -> NewAccount {
        NewAccount {
            account_number: number.to_string(),
            name: "Siti".to_string(),
            nik: nik.to_string(),
            phone_number: phone.to_string(),
        }
    }

    fn amount(units: i64) -> Amount {
        Amount::new(Decimal::from(units)).unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = setup();
        setup_database(&conn).unwrap();
        assert_eq!(count_accounts(&conn).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_find() {
        let conn = setup();
        let created = insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();

        assert_eq!(created.balance, Decimal::ZERO);
        assert!(created.id > 0);

        let found = get_account_by_number(&conn, "1234567890").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.nik, "nik-1");
        assert_eq!(found.balance, Decimal::ZERO);

        assert!(get_account_by_number(&conn, "0000000000").unwrap().is_none());
    }

    #[test]
    fn test_exists_checks() {
        let conn = setup();
        insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();

        assert!(nik_exists(&conn, "nik-1").unwrap());
        assert!(!nik_exists(&conn, "nik-2").unwrap());
        assert!(phone_number_exists(&conn, "0811").unwrap());
        assert!(!phone_number_exists(&conn, "0812").unwrap());
    }

    #[test]
    fn test_unique_violations_name_the_column() {
        let conn = setup();
        insert_account(&conn, &new_account("1111111111", "nik-1", "0811")).unwrap();

        let err = insert_account(&conn, &new_account("1111111111", "nik-2", "0812")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::AccountNumber)));

        let err = insert_account(&conn, &new_account("2222222222", "nik-1", "0812")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::NationalId)));

        let err = insert_account(&conn, &new_account("2222222222", "nik-2", "0811")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::PhoneNumber)));

        assert_eq!(count_accounts(&conn).unwrap(), 1);
    }

    #[test]
    fn test_withdraw_predicate_blocks_overdraft() {
        let conn = setup();
        insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();
        assert_eq!(deposit_balance(&conn, "1234567890", amount(100)).unwrap(), 1);

        assert_eq!(withdraw_balance(&conn, "1234567890", amount(150)).unwrap(), 0);
        assert_eq!(withdraw_balance(&conn, "1234567890", amount(100)).unwrap(), 1);

        let account = get_account_by_number(&conn, "1234567890").unwrap().unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_mutations_on_missing_account_touch_nothing() {
        let conn = setup();
        assert_eq!(deposit_balance(&conn, "9999999999", amount(10)).unwrap(), 0);
        assert_eq!(withdraw_balance(&conn, "9999999999", amount(10)).unwrap(), 0);
    }

    #[test]
    fn test_mutation_refreshes_updated_at() {
        let conn = setup();
        let created = insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        deposit_balance(&conn, "1234567890", amount(5)).unwrap();

        let account = get_account_by_number(&conn, "1234567890").unwrap().unwrap();
        assert!(account.updated_at > created.updated_at);
        assert_eq!(account.created_at, created.created_at);
    }

    #[test]
    fn test_check_constraint_rejects_negative_balance() {
        let conn = setup();
        insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();

        let result = conn.execute(
            "UPDATE accounts SET balance = -1 WHERE account_number = '1234567890'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deposit_overflow_is_rejected() {
        let conn = setup();
        insert_account(&conn, &new_account("1234567890", "nik-1", "0811")).unwrap();
        conn.execute(
            "UPDATE accounts SET balance = ?1 WHERE account_number = '1234567890'",
            params![i64::MAX - 1],
        )
        .unwrap();

        let result = deposit_balance(&conn, "1234567890", amount(1));
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn test_sqlite_store_implements_trait() {
        let store = SqliteStore::open_in_memory().unwrap();
        let store: &dyn AccountStore = &store;

        store.insert(&new_account("1234567890", "nik-1", "0811")).unwrap();
        assert_eq!(store.atomic_deposit("1234567890", amount(40)).unwrap(), 1);
        assert_eq!(store.atomic_withdraw("1234567890", amount(50)).unwrap(), 0);
        assert!(store.exists_by_national_id("nik-1").unwrap());
        assert!(store.exists_by_phone("0811").unwrap());

        let account = store.find_by_number("1234567890").unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(40));
    }
}
