// Account Directory
//
// Identity uniqueness lookups and account-number generation. The lookups
// are only a fast path: the UNIQUE constraints in the store decide.

use std::sync::Arc;

use rand::Rng;
use serde_json::json;

use crate::db::AccountStore;
use crate::entities::ACCOUNT_NUMBER_LEN;
use crate::error::LedgerResult;
use crate::logging::{Outcome, SharedLog};

#[derive(Clone)]
pub struct AccountDirectory {
    store: Arc<dyn AccountStore>,
    log: SharedLog,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn AccountStore>, log: SharedLog) -> Self {
        AccountDirectory { store, log }
    }

    /// True if any account already holds this NIK.
    pub fn check_identity_exists(&self, nik: &str) -> LedgerResult<bool> {
        self.lookup("CheckIdentityExists", || self.store.exists_by_national_id(nik))
    }

    /// True if any account already holds this phone number.
    pub fn check_phone_exists(&self, phone_number: &str) -> LedgerResult<bool> {
        self.lookup("CheckPhoneExists", || self.store.exists_by_phone(phone_number))
    }

    fn lookup(
        &self,
        operation: &str,
        query: impl FnOnce() -> Result<bool, crate::db::StoreError>,
    ) -> LedgerResult<bool> {
        self.log.log(operation, Outcome::Start, json!({ "type": "directory" }));
        match query() {
            Ok(exists) => {
                self.log
                    .log(operation, Outcome::Success, json!({ "exists": exists }));
                Ok(exists)
            }
            Err(e) => {
                self.log
                    .log(operation, Outcome::Error, json!({ "error": e.to_string() }));
                Err(e.into())
            }
        }
    }
}

/// Ten digits, each drawn uniformly from 0-9. Uniqueness is not checked.
pub fn generate_account_number() -> String {
    generate_account_number_with(&mut rand::rng())
}

pub fn generate_account_number_with<R: Rng>(rng: &mut R) -> String {
    (0..ACCOUNT_NUMBER_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
