use aventon_core::{money, Cents, EngineError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current balances for one user, derived from the ledger.
/// Invariant: `0 <= hold_cents <= balance_cents` at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub currency: String,
    pub balance_cents: Cents,
    pub hold_cents: Cents,
}

impl Account {
    pub fn available(&self) -> Cents {
        self.balance_cents - self.hold_cents
    }
}

/// Account aggregator. Must only be mutated from within the settlement
/// coordinator's transaction boundary, never directly from request
/// handlers, so balances cannot drift from the ledger.
#[derive(Debug)]
pub struct AccountBook {
    accounts: HashMap<String, Account>,
    default_currency: String,
}

impl AccountBook {
    pub fn new(default_currency: &str) -> Self {
        Self {
            accounts: HashMap::new(),
            default_currency: default_currency.to_string(),
        }
    }

    /// Fetch an account, creating it with zero balances on first
    /// interaction. Accounts are never deleted.
    pub fn get_or_create(&mut self, user_id: &str) -> Account {
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Account {
                user_id: user_id.to_string(),
                currency: self.default_currency.clone(),
                balance_cents: 0,
                hold_cents: 0,
            })
            .clone()
    }

    pub fn get(&self, user_id: &str) -> Option<&Account> {
        self.accounts.get(user_id)
    }

    /// Apply a signed delta to both balance columns with checked
    /// arithmetic, rejecting any state that would break the account
    /// invariant.
    pub fn apply_delta(
        &mut self,
        user_id: &str,
        balance_delta: Cents,
        hold_delta: Cents,
    ) -> Result<Account, EngineError> {
        let account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("account {user_id}")))?;

        let new_balance = money::add(account.balance_cents, balance_delta)?;
        let new_hold = money::add(account.hold_cents, hold_delta)?;

        if new_hold < 0 {
            return Err(EngineError::InsufficientHold {
                held: account.hold_cents,
                requested: -hold_delta,
            });
        }
        if new_balance < 0 {
            return Err(EngineError::InsufficientFunds {
                available: account.available(),
                requested: -balance_delta,
            });
        }
        if new_hold > new_balance {
            // Either a hold claiming more than what is free, or a debit
            // eating into held money.
            return Err(EngineError::InsufficientFunds {
                available: account.available(),
                requested: if hold_delta > 0 { hold_delta } else { -balance_delta },
            });
        }

        account.balance_cents = new_balance;
        account.hold_cents = new_hold;
        Ok(account.clone())
    }
}
