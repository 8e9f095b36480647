// Account Ledger - Core Library
// Register accounts, read balances, withdraw and deposit without overdrafts.

pub mod amount;
pub mod db;
pub mod directory;
pub mod entities;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod query;
pub mod registration;
pub mod service;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod config;

// Re-export commonly used types
pub use amount::{Amount, AmountError};
pub use db::{setup_database, AccountStore, SqliteStore, StoreError, UniqueField};
pub use directory::{generate_account_number, AccountDirectory};
pub use entities::{Account, NewAccount};
pub use error::{LedgerError, LedgerResult};
pub use ledger::LedgerOperations;
pub use logging::{LogConfig, LogGuard, LogLevel, OperationLog, Outcome, SharedLog, TracingLog};
pub use query::AccountQuery;
pub use registration::{Registrar, Registration, MAX_ACCOUNT_NUMBER_ATTEMPTS};
pub use service::AccountService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
