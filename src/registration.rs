// Account registration.
//
// NIK check, phone check, number generation and insert are separate store
// round-trips. Two concurrent registrations can both pass the pre-checks;
// the UNIQUE constraints on the table settle it and the losing insert is
// reported with the same error kind the pre-check would have produced.

use std::sync::Arc;

use serde_json::json;

use crate::db::{AccountStore, StoreError, UniqueField};
use crate::directory::{generate_account_number, AccountDirectory};
use crate::entities::{Account, NewAccount};
use crate::error::{LedgerError, LedgerResult};
use crate::logging::{Outcome, SharedLog};

/// Inserts attempted before giving up on finding a free account number.
pub const MAX_ACCOUNT_NUMBER_ATTEMPTS: u32 = 5;

type NumberSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Registration request after binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub nik: String,
    pub phone_number: String,
}

impl Registration {
    /// Trimmed copy; every field must be non-empty.
    fn validated(&self) -> LedgerResult<Registration> {
        let fields = [
            ("nama", &self.name),
            ("nik", &self.nik),
            ("no_hp", &self.phone_number),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(LedgerError::Validation(format!("{field} is required")));
        }
        Ok(Registration {
            name: self.name.trim().to_string(),
            nik: self.nik.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
        })
    }
}

#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn AccountStore>,
    directory: AccountDirectory,
    log: SharedLog,
    next_number: NumberSource,
}

impl Registrar {
    pub fn new(store: Arc<dyn AccountStore>, log: SharedLog) -> Self {
        Registrar {
            directory: AccountDirectory::new(store.clone(), log.clone()),
            store,
            log,
            next_number: Arc::new(generate_account_number),
        }
    }

    /// Replace the account-number generator.
    pub fn with_number_source(
        mut self,
        source: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.next_number = Arc::new(source);
        self
    }

    pub fn register(&self, request: &Registration) -> LedgerResult<Account> {
        const OP: &str = "Register";
        self.log.log(OP, Outcome::Start, json!({ "type": "service" }));

        let request = request.validated().map_err(|e| self.fail(e))?;

        if self
            .directory
            .check_identity_exists(&request.nik)
            .map_err(|e| self.fail(e))?
        {
            return Err(self.fail(LedgerError::DuplicateIdentity));
        }
        if self
            .directory
            .check_phone_exists(&request.phone_number)
            .map_err(|e| self.fail(e))?
        {
            return Err(self.fail(LedgerError::DuplicatePhone));
        }

        for attempt in 1..=MAX_ACCOUNT_NUMBER_ATTEMPTS {
            let candidate = NewAccount {
                account_number: (self.next_number)(),
                name: request.name.clone(),
                nik: request.nik.clone(),
                phone_number: request.phone_number.clone(),
            };

            match self.store.insert(&candidate) {
                Ok(account) => {
                    self.log.log(
                        OP,
                        Outcome::Success,
                        json!({ "account_id": account.id, "attempt": attempt }),
                    );
                    return Ok(account);
                }
                Err(StoreError::Conflict(UniqueField::AccountNumber)) => {
                    self.log.log(
                        OP,
                        Outcome::Warning,
                        json!({ "error": "account number collision", "attempt": attempt }),
                    );
                }
                Err(StoreError::Conflict(UniqueField::NationalId)) => {
                    return Err(self.fail(LedgerError::DuplicateIdentity));
                }
                Err(StoreError::Conflict(UniqueField::PhoneNumber)) => {
                    return Err(self.fail(LedgerError::DuplicatePhone));
                }
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        Err(self.fail(LedgerError::AccountNumberExhausted {
            attempts: MAX_ACCOUNT_NUMBER_ATTEMPTS,
        }))
    }

    fn fail(&self, err: LedgerError) -> LedgerError {
        self.log
            .log("Register", Outcome::Error, json!({ "error": err.to_string() }));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::BrokenStore;
    use crate::db::SqliteStore;
    use crate::entities::is_account_number;
    use crate::logging::tests::RecordingLog;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(nik: &str, phone: &str) -> Registration {
        Registration {
            name: "Agus".to_string(),
            nik: nik.to_string(),
            phone_number: phone.to_string(),
        }
    }

    fn registrar() -> (Registrar, Arc<SqliteStore>, Arc<RecordingLog>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let log = Arc::new(RecordingLog::default());
        (Registrar::new(store.clone(), log.clone()), store, log)
    }

    /// Store whose existence checks always say "free", so only the
    /// UNIQUE constraints can catch duplicates.
    struct BlindStore(SqliteStore);

    impl AccountStore for BlindStore {
        fn find_by_number(&self, n: &str) -> Result<Option<Account>, StoreError> {
            self.0.find_by_number(n)
        }
        fn exists_by_national_id(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn exists_by_phone(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn insert(&self, account: &NewAccount) -> Result<Account, StoreError> {
            self.0.insert(account)
        }
        fn atomic_withdraw(&self, n: &str, a: crate::amount::Amount) -> Result<usize, StoreError> {
            self.0.atomic_withdraw(n, a)
        }
        fn atomic_deposit(&self, n: &str, a: crate::amount::Amount) -> Result<usize, StoreError> {
            self.0.atomic_deposit(n, a)
        }
    }

    #[test]
    fn test_register_creates_zero_balance_account() {
        let (registrar, store, _) = registrar();
        let account = registrar.register(&request(" 3201 ", "0811")).unwrap();

        assert!(is_account_number(&account.account_number));
        assert_eq!(account.nik, "3201");
        assert_eq!(account.balance, rust_decimal::Decimal::ZERO);
        assert!(store.find_by_number(&account.account_number).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_nik_is_rejected() {
        let (registrar, store, _) = registrar();
        registrar.register(&request("3201", "0811")).unwrap();

        let err = registrar.register(&request("3201", "0822")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentity));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_phone_is_rejected() {
        let (registrar, _, _) = registrar();
        registrar.register(&request("3201", "0811")).unwrap();

        let err = registrar.register(&request("3202", "0811")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicatePhone));
    }

    #[test]
    fn test_blank_fields_fail_validation() {
        let (registrar, _, _) = registrar();
        let err = registrar.register(&request("  ", "0811")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(msg) if msg == "nik is required"));
    }

    #[test]
    fn test_unique_constraint_catches_what_precheck_missed() {
        let store = Arc::new(BlindStore(SqliteStore::open_in_memory().unwrap()));
        let log = Arc::new(RecordingLog::default());
        let registrar = Registrar::new(store, log);

        registrar.register(&request("3201", "0811")).unwrap();
        assert!(matches!(
            registrar.register(&request("3201", "0899")),
            Err(LedgerError::DuplicateIdentity)
        ));
        assert!(matches!(
            registrar.register(&request("3299", "0811")),
            Err(LedgerError::DuplicatePhone)
        ));
    }

    #[test]
    fn test_account_number_collision_is_retried() {
        let (registrar, _, log) = registrar();
        let numbers = Mutex::new(vec!["2222222222", "1111111111", "1111111111"]);
        let registrar = registrar.with_number_source(move || {
            numbers.lock().unwrap().pop().unwrap().to_string()
        });

        let first = registrar.register(&request("3201", "0811")).unwrap();
        let second = registrar.register(&request("3202", "0812")).unwrap();

        assert_eq!(first.account_number, "1111111111");
        assert_eq!(second.account_number, "2222222222");
        assert!(log.outcomes_for("Register").contains(&Outcome::Warning));
    }

    #[test]
    fn test_collision_retries_are_bounded() {
        let (registrar, _, _) = registrar();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registrar = registrar.with_number_source(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "7777777777".to_string()
        });

        registrar.register(&request("3201", "0811")).unwrap();
        let err = registrar.register(&request("3202", "0812")).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::AccountNumberExhausted { attempts } if attempts == MAX_ACCOUNT_NUMBER_ATTEMPTS
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_ACCOUNT_NUMBER_ATTEMPTS as usize);
    }

    #[test]
    fn test_store_failure_during_precheck_is_logged() {
        let log = Arc::new(RecordingLog::default());
        let registrar = Registrar::new(Arc::new(BrokenStore), log.clone());

        let err = registrar.register(&request("3201", "0811")).unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Poisoned)));
        assert_eq!(log.outcomes_for("Register"), vec![Outcome::Start, Outcome::Error]);
    }
}
