// Entity Models
//
// A single entity today: the account row. Balances only change through
// crate::ledger.

pub mod account;

pub use account::{is_account_number, Account, NewAccount, ACCOUNT_NUMBER_LEN};
