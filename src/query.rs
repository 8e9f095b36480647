// Query Facade - read-only account lookups

use std::sync::Arc;

use serde_json::json;

use crate::db::AccountStore;
use crate::entities::Account;
use crate::error::{LedgerError, LedgerResult};
use crate::logging::{Outcome, SharedLog};

#[derive(Clone)]
pub struct AccountQuery {
    store: Arc<dyn AccountStore>,
    log: SharedLog,
}

impl AccountQuery {
    pub fn new(store: Arc<dyn AccountStore>, log: SharedLog) -> Self {
        AccountQuery { store, log }
    }

    /// Point lookup by account number.
    pub fn get_account(&self, account_number: &str) -> LedgerResult<Account> {
        const OP: &str = "GetAccount";
        self.log.log(OP, Outcome::Start, json!({ "account_number": account_number }));

        let found = self.store.find_by_number(account_number).map_err(|e| {
            self.log.log(OP, Outcome::Error, json!({ "error": e.to_string() }));
            LedgerError::from(e)
        })?;

        match found {
            Some(account) => {
                self.log
                    .log(OP, Outcome::Success, json!({ "account_id": account.id }));
                Ok(account)
            }
            None => {
                self.log.log(
                    OP,
                    Outcome::Error,
                    json!({ "account_number": account_number, "error": "account not found" }),
                );
                Err(LedgerError::NotFound)
            }
        }
    }
}
