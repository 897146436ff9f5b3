//! Transaction data model.
//!
//! A transaction is identified by `(type_group, transaction_type, version)`.
//! Version 1 transactions are the legacy format (timestamp, no nonce);
//! version 2 transactions carry a per-sender nonce.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, PublicKey, Signature, TransactionId};

/// Type group of the built-in transaction types.
pub const CORE_TYPE_GROUP: u32 = 1;

/// Built-in transaction types of the core type group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoreTransactionType {
    Transfer,
    SecondSignature,
    DelegateRegistration,
    Vote,
    MultiSignature,
    Ipfs,
    MultiPayment,
    DelegateResignation,
    HtlcLock,
    HtlcClaim,
    HtlcRefund,
}

impl CoreTransactionType {
    pub const ALL: [CoreTransactionType; 11] = [
        Self::Transfer,
        Self::SecondSignature,
        Self::DelegateRegistration,
        Self::Vote,
        Self::MultiSignature,
        Self::Ipfs,
        Self::MultiPayment,
        Self::DelegateResignation,
        Self::HtlcLock,
        Self::HtlcClaim,
        Self::HtlcRefund,
    ];

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Transfer => 0,
            Self::SecondSignature => 1,
            Self::DelegateRegistration => 2,
            Self::Vote => 3,
            Self::MultiSignature => 4,
            Self::Ipfs => 5,
            Self::MultiPayment => 6,
            Self::DelegateResignation => 7,
            Self::HtlcLock => 8,
            Self::HtlcClaim => 9,
            Self::HtlcRefund => 10,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_u16() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::SecondSignature => "second-signature",
            Self::DelegateRegistration => "delegate-registration",
            Self::Vote => "vote",
            Self::MultiSignature => "multi-signature",
            Self::Ipfs => "ipfs",
            Self::MultiPayment => "multi-payment",
            Self::DelegateResignation => "delegate-resignation",
            Self::HtlcLock => "htlc-lock",
            Self::HtlcClaim => "htlc-claim",
            Self::HtlcRefund => "htlc-refund",
        }
    }
}

/// One participant signature of a multi-signature transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSignatureEntry {
    /// Position of the signer in the registered key list.
    pub index: u8,
    pub signature: Signature,
}

/// A vote or unvote for a delegate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Vote(PublicKey),
    Unvote(PublicKey),
}

impl Vote {
    pub fn public_key(&self) -> &PublicKey {
        match self {
            Self::Vote(pk) | Self::Unvote(pk) => pk,
        }
    }

    pub fn is_vote(&self) -> bool {
        matches!(self, Self::Vote(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSignatureAsset {
    pub min: u8,
    pub public_keys: Vec<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Amount,
    pub recipient_id: Address,
}

/// When an HTLC lock stops being claimable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcExpiration {
    /// Network-epoch seconds.
    EpochTimestamp(u32),
    BlockHeight(u64),
}

impl HtlcExpiration {
    /// Whether the lock is expired relative to the given chain tip.
    pub fn is_expired(&self, tip_height: u64, tip_timestamp: u32) -> bool {
        match *self {
            Self::EpochTimestamp(value) => value <= tip_timestamp,
            Self::BlockHeight(value) => value <= tip_height,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLockAsset {
    /// Hex SHA-256 of the unlock secret.
    pub secret_hash: String,
    pub expiration: HtlcExpiration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcClaimAsset {
    pub lock_transaction_id: TransactionId,
    pub unlock_secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcRefundAsset {
    pub lock_transaction_id: TransactionId,
}

/// Type-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAsset {
    SecondSignature { public_key: PublicKey },
    Delegate { username: String },
    Votes(Vec<Vote>),
    /// Version 1 multi-signature registration; no longer supported on apply.
    LegacyMultiSignature {
        min: u8,
        lifetime: u8,
        keysgroup: Vec<PublicKey>,
    },
    MultiSignature(MultiSignatureAsset),
    Ipfs(String),
    Payments(Vec<Payment>),
    Lock(HtlcLockAsset),
    Claim(HtlcClaimAsset),
    Refund(HtlcRefundAsset),
}

/// A signed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub version: u8,
    pub type_group: u32,
    #[serde(rename = "type")]
    pub transaction_type: u16,
    /// Present on version 2 transactions only.
    pub nonce: Option<u64>,
    /// Present on version 1 transactions only.
    pub timestamp: Option<u32>,
    pub sender_public_key: PublicKey,
    pub recipient_id: Option<Address>,
    pub amount: Amount,
    pub fee: Amount,
    pub vendor_field: Option<String>,
    pub asset: Option<TransactionAsset>,
    pub signature: Option<Signature>,
    pub second_signature: Option<Signature>,
    #[serde(default)]
    pub signatures: Vec<MultiSignatureEntry>,
}

impl Transaction {
    /// The core type, when this transaction belongs to the core type group.
    pub fn core_type(&self) -> Option<CoreTransactionType> {
        if self.type_group != CORE_TYPE_GROUP {
            return None;
        }
        CoreTransactionType::from_u16(self.transaction_type)
    }

    pub fn is_core_type(&self, ty: CoreTransactionType) -> bool {
        self.core_type() == Some(ty)
    }

    pub fn is_v2(&self) -> bool {
        self.version >= 2
    }

    /// Nonce as carried on the wire; version 1 transactions count as zero.
    pub fn nonce_or_zero(&self) -> u64 {
        self.nonce.unwrap_or(0)
    }

    pub fn has_multi_signatures(&self) -> bool {
        !self.signatures.is_empty()
    }

    pub fn votes(&self) -> Option<&[Vote]> {
        match &self.asset {
            Some(TransactionAsset::Votes(votes)) => Some(votes),
            _ => None,
        }
    }

    pub fn payments(&self) -> Option<&[Payment]> {
        match &self.asset {
            Some(TransactionAsset::Payments(payments)) => Some(payments),
            _ => None,
        }
    }

    /// Total of all payments of a multipayment; zero for other types.
    pub fn payments_total(&self) -> Amount {
        self.payments()
            .map(|p| p.iter().map(|p| p.amount).sum())
            .unwrap_or(Amount::ZERO)
    }

    pub fn lock_asset(&self) -> Option<&HtlcLockAsset> {
        match &self.asset {
            Some(TransactionAsset::Lock(lock)) => Some(lock),
            _ => None,
        }
    }

    pub fn claim_asset(&self) -> Option<&HtlcClaimAsset> {
        match &self.asset {
            Some(TransactionAsset::Claim(claim)) => Some(claim),
            _ => None,
        }
    }

    pub fn refund_asset(&self) -> Option<&HtlcRefundAsset> {
        match &self.asset {
            Some(TransactionAsset::Refund(refund)) => Some(refund),
            _ => None,
        }
    }

    pub fn multi_signature_asset(&self) -> Option<&MultiSignatureAsset> {
        match &self.asset {
            Some(TransactionAsset::MultiSignature(asset)) => Some(asset),
            _ => None,
        }
    }

    pub fn delegate_username(&self) -> Option<&str> {
        match &self.asset {
            Some(TransactionAsset::Delegate { username }) => Some(username),
            _ => None,
        }
    }

    pub fn second_signature_public_key(&self) -> Option<&PublicKey> {
        match &self.asset {
            Some(TransactionAsset::SecondSignature { public_key }) => Some(public_key),
            _ => None,
        }
    }

    pub fn ipfs_hash(&self) -> Option<&str> {
        match &self.asset {
            Some(TransactionAsset::Ipfs(hash)) => Some(hash),
            _ => None,
        }
    }
}
