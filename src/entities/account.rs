// Account Entity
//
// One row per registered customer. Identity attributes (account number,
// name, NIK, phone) are fixed at registration; only the balance and
// updated_at move afterwards, and only through the ledger operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Length of the public account number.
pub const ACCOUNT_NUMBER_LEN: usize = 10;

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned row id (monotonic, opaque to callers)
    pub id: i64,

    /// Public 10-digit account number ("no_rekening")
    pub account_number: String,

    pub name: String,

    /// National identity number ("NIK"), unique across accounts
    pub nik: String,

    /// Unique across accounts
    pub phone_number: String,

    /// Never negative
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by registration; the store assigns id and timestamps
/// are stamped at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub account_number: String,
    pub name: String,
    pub nik: String,
    pub phone_number: String,
}

/// True when `value` has the shape of an account number.
pub fn is_account_number(value: &str) -> bool {
    value.len() == ACCOUNT_NUMBER_LEN && value.bytes().all(|b| b.is_ascii_digit())
}
