use crate::error::LedgerError;
use plid_core::{Balance, WalletId};

/// One account. Balances never go negative and all arithmetic is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wallet {
    id: WalletId,
    balance: Balance,
}

impl Wallet {
    pub fn new(id: WalletId) -> Self {
        Wallet { id, balance: 0 }
    }

    pub fn id(&self) -> WalletId {
        self.id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn deposit(&mut self, amount: Balance) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.id))?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Balance) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                wallet: self.id,
                balance: self.balance,
                amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_and_withdraw() {
        let mut wallet = Wallet::new(1);
        assert_eq!(wallet.balance(), 0);

        wallet.deposit(100).unwrap();
        assert_eq!(wallet.balance(), 100);

        wallet.withdraw(30).unwrap();
        assert_eq!(wallet.balance(), 70);
    }

    #[test]
    fn withdraw_cannot_go_negative() {
        let mut wallet = Wallet::new(1);
        wallet.deposit(10).unwrap();
        let err = wallet.withdraw(11).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(wallet.balance(), 10);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let mut wallet = Wallet::new(1);
        assert!(matches!(
            wallet.deposit(0).unwrap_err(),
            LedgerError::InvalidAmount(0)
        ));
        assert!(matches!(
            wallet.deposit(-5).unwrap_err(),
            LedgerError::InvalidAmount(-5)
        ));
        assert!(matches!(
            wallet.withdraw(0).unwrap_err(),
            LedgerError::InvalidAmount(0)
        ));
    }

    #[test]
    fn deposit_overflow_is_checked() {
        let mut wallet = Wallet::new(1);
        wallet.deposit(Balance::MAX).unwrap();
        let err = wallet.deposit(1).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow(1)));
        assert_eq!(wallet.balance(), Balance::MAX);
    }
}
