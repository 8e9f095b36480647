// Ledger operations: withdraw and deposit.
//
// Each mutation is a single conditional statement in the store. Nothing
// here reads a balance and writes it back, so concurrent requests against
// the same account cannot overdraw it or lose an update.
//
// Neither operation returns the new balance. Callers re-read through
// crate::query::AccountQuery; under concurrent writers that read may
// already include someone else's mutation.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use crate::amount::Amount;
use crate::db::AccountStore;
use crate::error::{LedgerError, LedgerResult};
use crate::logging::{Outcome, SharedLog};

#[derive(Clone)]
pub struct LedgerOperations {
    store: Arc<dyn AccountStore>,
    log: SharedLog,
}

impl LedgerOperations {
    pub fn new(store: Arc<dyn AccountStore>, log: SharedLog) -> Self {
        LedgerOperations { store, log }
    }

    /// Take `amount` out of the account if the balance covers it.
    ///
    /// A zero-row update is classified afterwards with an existence lookup.
    /// Accounts are never deleted, so the lookup cannot race.
    pub fn withdraw(&self, account_number: &str, amount: Decimal) -> LedgerResult<()> {
        const OP: &str = "Withdraw";
        let amount = self.validate(OP, account_number, amount)?;

        let rows = self.run(OP, || self.store.atomic_withdraw(account_number, amount))?;
        if rows == 0 {
            let exists = self.run(OP, || self.store.find_by_number(account_number))?.is_some();
            let err = if exists {
                LedgerError::InsufficientFunds
            } else {
                LedgerError::NotFound
            };
            return Err(self.fail(OP, account_number, err));
        }

        self.log.log(
            OP,
            Outcome::Success,
            json!({ "account_number": account_number, "amount": amount.value().to_string() }),
        );
        Ok(())
    }

    /// Add `amount` to the account.
    pub fn deposit(&self, account_number: &str, amount: Decimal) -> LedgerResult<()> {
        const OP: &str = "Deposit";
        let amount = self.validate(OP, account_number, amount)?;

        let rows = self.run(OP, || self.store.atomic_deposit(account_number, amount))?;
        if rows == 0 {
            return Err(self.fail(OP, account_number, LedgerError::NotFound));
        }

        self.log.log(
            OP,
            Outcome::Success,
            json!({ "account_number": account_number, "amount": amount.value().to_string() }),
        );
        Ok(())
    }

    fn validate(&self, op: &str, account_number: &str, amount: Decimal) -> LedgerResult<Amount> {
        self.log.log(
            op,
            Outcome::Start,
            json!({ "account_number": account_number, "amount": amount.to_string() }),
        );
        Amount::new(amount).map_err(|e| self.fail(op, account_number, e.into()))
    }

    fn run<T>(
        &self,
        op: &str,
        call: impl FnOnce() -> Result<T, crate::db::StoreError>,
    ) -> LedgerResult<T> {
        call().map_err(|e| {
            self.log.log(op, Outcome::Error, json!({ "error": e.to_string() }));
            LedgerError::from(e)
        })
    }

    fn fail(&self, op: &str, account_number: &str, err: LedgerError) -> LedgerError {
        self.log.log(
            op,
            Outcome::Error,
            json!({ "account_number": account_number, "error": err.to_string() }),
        );
        err
    }
}
