use thiserror::Error;

use crate::amount::AmountError;
use crate::db::StoreError;

/// Failure kinds surfaced by the ledger services.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found")]
    NotFound,
    #[error("insufficient balance")]
    InsufficientFunds,
    #[error("NIK already exists")]
    DuplicateIdentity,
    #[error("phone number already exists")]
    DuplicatePhone,
    #[error("could not allocate a unique account number after {attempts} attempts")]
    AccountNumberExhausted { attempts: u32 },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
