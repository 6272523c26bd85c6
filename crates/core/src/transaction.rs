//! Value-transfer transactions.

use crate::amount::Amount;
use crate::crypto::PublicKey;
use crate::hash::{hash_encoded, DomainTag, EncodingError, Hash};
use serde::{Deserialize, Serialize};

/// An immutable transfer of `amount` from `sender` to `recipient`.
///
/// Only the issuance transaction in the genesis block has no sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    amount: Amount,
    sender: Option<PublicKey>,
    recipient: PublicKey,
}

impl Transaction {
    /// Create a new transaction.
    pub fn new(amount: Amount, sender: Option<PublicKey>, recipient: PublicKey) -> Self {
        Self {
            amount,
            sender,
            recipient,
        }
    }

    /// Create a transfer between two parties.
    pub fn transfer(amount: Amount, sender: PublicKey, recipient: PublicKey) -> Self {
        Self::new(amount, Some(sender), recipient)
    }

    /// Create the sender-less issuance transaction carried by the genesis block.
    pub fn issuance(recipient: PublicKey, amount: Amount) -> Self {
        Self::new(amount, None, recipient)
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn sender(&self) -> Option<&PublicKey> {
        self.sender.as_ref()
    }

    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }

    /// Check if this is an issuance (no sender).
    pub fn is_issuance(&self) -> bool {
        self.sender.is_none()
    }

    /// Get the transaction digest.
    ///
    /// Encodes `amount` (8 bytes), `sender` (1 tag byte, then 32 bytes when
    /// present) and `recipient` (32 bytes), in that order, under the leaf tag.
    pub fn hash(&self) -> Result<Hash, EncodingError> {
        hash_encoded(DomainTag::Leaf, self)
    }
}
