use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Identity};

/// Sender of system minted value; such transactions are never signed
pub const MINING_REWARD_SENDER: &str = "MINING_REWARD";

/// Public key placeholder carried by reward transactions
pub const REWARD_PUBLIC_KEY: &str = "SYSTEM";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Transaction not signed")]
    MissingSignature,

    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Signer {signer} is not the sender {sender}")]
    SenderMismatch { signer: Address, sender: Address },

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Current time as fractional seconds since the Unix epoch
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A value transfer between two addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender_address: Address,

    /// Recipient's address
    pub recipient_address: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Creation time, part of the signed data
    pub timestamp: f64,

    /// Sender's PEM public key, `SYSTEM` for rewards
    pub sender_public_key: String,

    /// Signature over the canonical form
    #[serde(default)]
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transaction stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `sender_address` - The address of the sender
    /// * `recipient_address` - The address of the recipient
    /// * `amount` - The amount to transfer
    /// * `sender_public_key` - The sender's exported public key
    pub fn new(
        sender_address: Address,
        recipient_address: Address,
        amount: f64,
        sender_public_key: String,
    ) -> Self {
        Transaction {
            sender_address,
            recipient_address,
            amount,
            timestamp: epoch_seconds(),
            sender_public_key,
            signature: None,
        }
    }

    /// Creates a mining reward paid to `recipient`
    pub fn new_reward(recipient: Address, amount: f64) -> Self {
        Transaction::new(
            Address::from(MINING_REWARD_SENDER),
            recipient,
            amount,
            REWARD_PUBLIC_KEY.to_string(),
        )
    }

    pub fn is_reward(&self) -> bool {
        self.sender_address.0 == MINING_REWARD_SENDER
    }

    /// Deterministic encoding of every field except the signature.
    ///
    /// Keys come out sorted because `serde_json::Map` is ordered. Signing and
    /// verification both go through here.
    pub fn canonical_form(&self) -> Vec<u8> {
        let data = serde_json::json!({
            "amount": self.amount,
            "recipient_address": self.recipient_address.0,
            "sender_address": self.sender_address.0,
            "sender_public_key": self.sender_public_key,
            "timestamp": self.timestamp,
        });

        data.to_string().into_bytes()
    }

    /// Signs the transaction with `identity`, exactly once
    pub fn sign(&mut self, identity: &Identity) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        if identity.address() != &self.sender_address {
            return Err(TransactionError::SenderMismatch {
                signer: identity.address().clone(),
                sender: self.sender_address.clone(),
            });
        }

        self.signature = Some(identity.sign(&self.canonical_form()));
        Ok(())
    }

    /// Checks the signature, reporting why a transaction is rejected
    pub fn verify(&self) -> Result<(), TransactionError> {
        if self.is_reward() {
            return Ok(());
        }

        let signature = self
            .signature
            .as_ref()
            .ok_or(TransactionError::MissingSignature)?;

        if verify_signature(&self.canonical_form(), signature, &self.sender_public_key)? {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_transfer(sender: &Identity, recipient: &Address, amount: f64) -> Transaction {
        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.clone(),
            amount,
            sender.export_public_key().to_string(),
        );
        transaction.sign(sender).unwrap();
        transaction
    }

    #[test]
    fn test_new_transaction() {
        let sender = Identity::generate("alice").unwrap();
        let recipient = Address::from("bob");

        let transaction = Transaction::new(
            sender.address().clone(),
            recipient.clone(),
            10.5,
            sender.export_public_key().to_string(),
        );

        assert_eq!(transaction.sender_address, *sender.address());
        assert_eq!(transaction.recipient_address, recipient);
        assert_eq!(transaction.amount, 10.5);
        assert!(transaction.timestamp > 0.0);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_valid());
    }

    #[test]
    fn test_canonical_form_is_sorted_and_unsigned() {
        let transaction = Transaction {
            sender_address: Address::from("a"),
            recipient_address: Address::from("b"),
            amount: 6.0,
            timestamp: 1700000000.25,
            sender_public_key: "pem".to_string(),
            signature: Some(DigitalSignature("ff".to_string())),
        };

        let canonical = String::from_utf8(transaction.canonical_form()).unwrap();
        assert_eq!(
            canonical,
            r#"{"amount":6.0,"recipient_address":"b","sender_address":"a","sender_public_key":"pem","timestamp":1700000000.25}"#
        );
    }

    #[test]
    fn test_sign_transaction() {
        let sender = Identity::generate("alice").unwrap();
        let transaction = signed_transfer(&sender, &Address::from("bob"), 3.0);

        assert!(transaction.signature.is_some());
        assert!(transaction.verify().is_ok());
        assert!(transaction.is_valid());
    }

    #[test]
    fn test_tampering_after_signing_invalidates() {
        let sender = Identity::generate("alice").unwrap();

        let mut amount = signed_transfer(&sender, &Address::from("bob"), 3.0);
        amount.amount = 300.0;
        assert!(matches!(amount.verify(), Err(TransactionError::InvalidSignature)));

        let mut recipient = signed_transfer(&sender, &Address::from("bob"), 3.0);
        recipient.recipient_address = Address::from("mallory");
        assert!(!recipient.is_valid());

        let mut timestamp = signed_transfer(&sender, &Address::from("bob"), 3.0);
        timestamp.timestamp += 1.0;
        assert!(!timestamp.is_valid());
    }

    #[test]
    fn test_mutation_before_signing_is_signed() {
        let sender = Identity::generate("alice").unwrap();
        let mut transaction = Transaction::new(
            sender.address().clone(),
            Address::from("bob"),
            1.0,
            sender.export_public_key().to_string(),
        );

        transaction.amount = 2.0;
        transaction.sign(&sender).unwrap();

        assert!(transaction.is_valid());
        assert_eq!(transaction.amount, 2.0);
    }

    #[test]
    fn test_sign_only_once() {
        let sender = Identity::generate("alice").unwrap();
        let mut transaction = signed_transfer(&sender, &Address::from("bob"), 1.0);

        let result = transaction.sign(&sender);
        assert!(matches!(result, Err(TransactionError::AlreadySigned)));
    }

    #[test]
    fn test_sign_with_foreign_identity() {
        let sender = Identity::generate("alice").unwrap();
        let other = Identity::generate("mallory").unwrap();
        let mut transaction = Transaction::new(
            sender.address().clone(),
            Address::from("bob"),
            1.0,
            sender.export_public_key().to_string(),
        );

        let result = transaction.sign(&other);
        assert!(matches!(result, Err(TransactionError::SenderMismatch { .. })));
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_reward_transaction_bypasses_signature() {
        let transaction = Transaction::new_reward(Address::from("miner"), 10.0);

        assert!(transaction.is_reward());
        assert!(transaction.signature.is_none());
        assert_eq!(transaction.sender_public_key, REWARD_PUBLIC_KEY);
        assert!(transaction.is_valid());
    }

    #[test]
    fn test_unparseable_key_is_invalid_not_panic() {
        let sender = Identity::generate("alice").unwrap();
        let mut transaction = signed_transfer(&sender, &Address::from("bob"), 1.0);
        transaction.sender_public_key = "garbage".to_string();

        assert!(matches!(
            transaction.verify(),
            Err(TransactionError::CryptoError(CryptoError::InvalidPublicKey(_)))
        ));
        assert!(!transaction.is_valid());
    }

    #[test]
    fn test_wire_shape() {
        let transaction = Transaction::new_reward(Address::from("miner"), 10.0);
        let value = serde_json::to_value(&transaction).unwrap();

        assert_eq!(value["sender_address"], MINING_REWARD_SENDER);
        assert_eq!(value["recipient_address"], "miner");
        assert_eq!(value["amount"], 10.0);
        assert!(value["signature"].is_null());
    }
}
