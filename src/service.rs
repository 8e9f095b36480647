// Account Service - the four operations the HTTP layer calls

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::db::AccountStore;
use crate::entities::Account;
use crate::error::LedgerResult;
use crate::ledger::LedgerOperations;
use crate::logging::SharedLog;
use crate::query::AccountQuery;
use crate::registration::{Registrar, Registration};

/// Bundles registration, ledger operations and queries over one store.
#[derive(Clone)]
pub struct AccountService {
    registrar: Registrar,
    ledger: LedgerOperations,
    query: AccountQuery,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, log: SharedLog) -> Self {
        AccountService {
            registrar: Registrar::new(store.clone(), log.clone()),
            ledger: LedgerOperations::new(store.clone(), log.clone()),
            query: AccountQuery::new(store, log),
        }
    }

    pub fn register(&self, request: &Registration) -> LedgerResult<Account> {
        self.registrar.register(request)
    }

    pub fn get_account(&self, account_number: &str) -> LedgerResult<Account> {
        self.query.get_account(account_number)
    }

    /// Withdraw, then re-read the committed balance.
    pub fn withdraw(&self, account_number: &str, amount: Decimal) -> LedgerResult<Decimal> {
        self.ledger.withdraw(account_number, amount)?;
        Ok(self.query.get_account(account_number)?.balance)
    }

    /// Deposit, then re-read the committed balance.
    pub fn deposit(&self, account_number: &str, amount: Decimal) -> LedgerResult<Decimal> {
        self.ledger.deposit(account_number, amount)?;
        Ok(self.query.get_account(account_number)?.balance)
    }
}
