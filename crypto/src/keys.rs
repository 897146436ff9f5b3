//! Ed25519 keys and signatures.
//!
//! Everything that gets signed in the node core is a 32-byte Blake2b digest
//! (a block id or a transaction signing hash), so the signing API takes
//! digests rather than arbitrary messages.

use ark_types::{KeyPair, PrivateKey, PublicKey, Signature};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

fn keypair_from_signing_key(signing_key: &SigningKey) -> KeyPair {
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Generate a new key pair from the OS random source.
pub fn generate_keypair() -> KeyPair {
    keypair_from_signing_key(&SigningKey::generate(&mut OsRng))
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_from_signing_key(&SigningKey::from_bytes(seed))
}

/// Derive a key pair from a delegate passphrase: the seed is SHA-256 of the
/// UTF-8 passphrase.
pub fn keypair_from_passphrase(passphrase: &str) -> KeyPair {
    let seed: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
    keypair_from_seed(&seed)
}

pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    PublicKey(SigningKey::from_bytes(&private.0).verifying_key().to_bytes())
}

pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

/// Sign a message (in practice a 32-byte digest).
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a signature. Keys that do not decode to a curve point never verify.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &dalek_sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_keys_are_stable() {
        let a = keypair_from_passphrase("delegate one");
        let b = keypair_from_passphrase("delegate one");
        let c = keypair_from_passphrase("delegate two");
        assert_eq!(a.public, b.public);
        assert_ne!(a.public, c.public);
        assert_eq!(public_from_private(&a.private), a.public);
    }

    #[test]
    fn digest_signature_verifies_only_for_signer() {
        let signer = keypair_from_seed(&[3u8; 32]);
        let other = generate_keypair();
        let digest = [9u8; 32];
        let sig = sign_message(&digest, &signer.private);
        assert!(verify_signature(&digest, &sig, &signer.public));
        assert!(!verify_signature(&digest, &sig, &other.public));
        assert!(!verify_signature(&[8u8; 32], &sig, &signer.public));
    }

    #[test]
    fn undecodable_key_never_verifies() {
        let kp = generate_keypair();
        let sig = sign_message(b"x", &kp.private);
        assert!(!verify_signature(b"x", &sig, &PublicKey([0xFF; 32])));
    }

    #[test]
    fn keypair_from_private_matches() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let rebuilt = keypair_from_private(PrivateKey(kp.private.0));
        assert_eq!(rebuilt.public, kp.public);
    }
}
