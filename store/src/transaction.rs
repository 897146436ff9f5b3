//! Transaction lookup.

use crate::StoreError;
use ark_types::{Transaction, TransactionId};

/// Read access to persisted (forged) transactions.
pub trait TransactionRepository {
    fn find_transaction_by_id(&self, id: &TransactionId)
        -> Result<Option<Transaction>, StoreError>;
}
