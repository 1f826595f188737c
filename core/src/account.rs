//! Account model: balances and nonces keyed by address.

use shared::{Address, BlockchainError, Result};
use std::collections::HashMap;

/// A single account's mutable state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: u64,
}

impl Account {
    #[must_use]
    pub const fn new(balance: u64) -> Self {
        Self { nonce: 0, balance }
    }

    #[must_use]
    pub const fn has_sufficient_balance(&self, amount: u64) -> bool {
        self.balance >= amount
    }

    /// Debits `amount` and advances the nonce. Used for the sender side of a
    /// transfer, and for the fee-only debit applied to a sender whose
    /// transaction is excluded from a self-mined block.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] if the balance can't
    /// cover `amount`.
    pub fn debit(&mut self, amount: u64) -> Result<()> {
        if !self.has_sufficient_balance(amount) {
            return Err(BlockchainError::InsufficientFunds);
        }
        self.balance -= amount;
        self.nonce += 1;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }
}

/// The full account database: every address with a non-default balance or
/// nonce. Addresses absent from the map are treated as a fresh,
/// zero-balance account (`Account::default()`), matching the Ethereum
/// convention that any address can receive funds without prior
/// registration.
#[derive(Debug, Clone, Default)]
pub struct AccountDb {
    accounts: HashMap<Address, Account>,
}

impl AccountDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the initial account database from genesis balances.
    #[must_use]
    pub fn from_genesis(balances: &HashMap<Address, u64>) -> Self {
        let accounts = balances
            .iter()
            .map(|(addr, balance)| (*addr, Account::new(*balance)))
            .collect();
        Self { accounts }
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    /// Mutates the account at `address` through `f`, creating it with a
    /// default (zero) balance first if absent.
    pub fn entry_mut(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    /// Applies one transaction's worth of balance movement: `from` is
    /// debited `value + fee`, `to` is credited `value`, `miner` is credited
    /// `fee`. `from`, `to` and `miner` may coincide; each credit/debit is
    /// still applied in order, so a miner paying themselves a tip nets out
    /// correctly.
    ///
    /// `tx_nonce` must equal the sender's current nonce plus one — nonces
    /// start counting at 1, so the first transaction from a fresh account
    /// carries `nonce: 1`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] if `from` cannot cover
    /// `value + fee`, or [`BlockchainError::BadNonce`] if `tx_nonce` isn't
    /// the sender's `nonce + 1`.
    pub fn apply_transaction(
        &mut self,
        from: Address,
        to: Address,
        miner: Address,
        value: u64,
        fee: u64,
        tx_nonce: u64,
    ) -> Result<()> {
        let sender = self.get(&from);
        if tx_nonce != sender.nonce + 1 {
            return Err(BlockchainError::BadNonce {
                expected: sender.nonce + 1,
                found: tx_nonce,
            });
        }
        let total = value
            .checked_add(fee)
            .ok_or(BlockchainError::InsufficientFunds)?;
        if !sender.has_sufficient_balance(total) {
            return Err(BlockchainError::InsufficientFunds);
        }

        self.entry_mut(from).debit(total)?;
        self.entry_mut(to).credit(value);
        self.entry_mut(miner).credit(fee);
        Ok(())
    }

    /// Debits only the fee, used when a transaction is dropped from a
    /// self-mined block for a reason other than insufficient funds (still
    /// consumes gas, still advances the nonce, per the mining invariant
    /// that excluded transactions are charged and removed from the
    /// mempool rather than silently skipped).
    ///
    /// # Errors
    ///
    /// Returns [`BlockchainError::InsufficientFunds`] if `from` cannot cover
    /// `fee`.
    pub fn debit_fee_only(&mut self, from: Address, fee: u64) -> Result<()> {
        self.entry_mut(from).debit(fee)
    }

    pub fn credit(&mut self, to: Address, amount: u64) {
        self.entry_mut(to).credit(amount);
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// A deterministic snapshot of the full account set, used to compute
    /// the block's state root. Sorted by address so the digest doesn't
    /// depend on `HashMap` iteration order.
    #[must_use]
    pub fn state_digest_input(&self) -> Vec<u8> {
        let mut entries: Vec<_> = self.accounts.iter().collect();
        entries.sort_by_key(|(addr, _)| **addr);
        let mut bytes = Vec::with_capacity(entries.len() * 36);
        for (addr, account) in entries {
            bytes.extend_from_slice(addr.as_bytes());
            bytes.extend_from_slice(&account.nonce.to_be_bytes());
            bytes.extend_from_slice(&account.balance.to_be_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn missing_account_has_default_state() {
        let db = AccountDb::new();
        assert_eq!(db.get(&addr(1)), Account::default());
    }

    #[test]
    fn transfer_moves_value_charges_fee_and_pays_miner() {
        let mut db = AccountDb::new();
        db.entry_mut(addr(1)).credit(1000);

        db.apply_transaction(addr(1), addr(2), addr(3), 100, 5, 1)
            .unwrap();

        assert_eq!(db.get(&addr(1)).balance, 895);
        assert_eq!(db.get(&addr(1)).nonce, 1);
        assert_eq!(db.get(&addr(2)).balance, 100);
        assert_eq!(db.get(&addr(3)).balance, 5);
    }

    #[test]
    fn transfer_rejects_wrong_nonce() {
        let mut db = AccountDb::new();
        db.entry_mut(addr(1)).credit(1000);
        assert!(db
            .apply_transaction(addr(1), addr(2), addr(3), 100, 5, 2)
            .is_err());
    }

    #[test]
    fn transfer_rejects_insufficient_funds() {
        let mut db = AccountDb::new();
        db.entry_mut(addr(1)).credit(50);
        assert!(db
            .apply_transaction(addr(1), addr(2), addr(3), 100, 5, 1)
            .is_err());
    }

    #[test]
    fn state_digest_is_order_independent() {
        let mut a = AccountDb::new();
        a.entry_mut(addr(1)).credit(10);
        a.entry_mut(addr(2)).credit(20);

        let mut b = AccountDb::new();
        b.entry_mut(addr(2)).credit(20);
        b.entry_mut(addr(1)).credit(10);

        assert_eq!(a.state_digest_input(), b.state_digest_input());
    }

    #[test]
    fn from_genesis_seeds_balances() {
        let mut balances = HashMap::new();
        balances.insert(addr(1), 500);
        let db = AccountDb::from_genesis(&balances);
        assert_eq!(db.get(&addr(1)).balance, 500);
        assert_eq!(db.get(&addr(1)).nonce, 0);
    }
}
