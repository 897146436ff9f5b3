//! Wallet address derivation from public keys.
//!
//! Address format: `ark_` + base32(public_key, 52 chars) + base32(checksum, 8 chars),
//! 64 characters in total. The checksum is the first 5 bytes of
//! Blake2b-256(public_key). Multi-signature wallets derive their address from
//! the aggregate key returned by `multi_signature_public_key`.

use ark_types::{Address, PublicKey};

/// Base32 alphabet (32 chars, avoids visually ambiguous 0/O, 2/Z, l/I, v).
const BASE32_ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// Reverse lookup table: ASCII byte → 5-bit value (0xFF = invalid).
const BASE32_DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let alpha = BASE32_ALPHABET;
    let mut i = 0;
    while i < 32 {
        table[alpha[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// 52 public key characters + 8 checksum characters.
const ENCODED_LEN: usize = 60;
const PUBKEY_CHARS: usize = 52;

fn checksum(public_key: &[u8; 32]) -> [u8; 5] {
    let hash = crate::blake2b_256(public_key);
    [hash[0], hash[1], hash[2], hash[3], hash[4]]
}

/// Encode a byte slice as base32 using the address alphabet.
fn encode_base32(bytes: &[u8]) -> String {
    let total_bits = bytes.len() * 8;
    let num_chars = total_bits.div_ceil(5);
    let mut result = String::with_capacity(num_chars);

    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u64;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let idx = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            result.push(BASE32_ALPHABET[idx] as char);
        }
    }
    // Remaining bits (padded with zeros on the right).
    if bits_in_buffer > 0 {
        let idx = ((buffer << (5 - bits_in_buffer)) & 0x1F) as usize;
        result.push(BASE32_ALPHABET[idx] as char);
    }

    result
}

/// Decode a base32 string into a fixed-size byte array. Returns `None` on
/// invalid characters or wrong length. Zero-allocation.
fn decode_base32_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;
    let mut result = [0u8; N];
    let mut pos = 0;

    for c in s.bytes() {
        if c >= 128 {
            return None;
        }
        let val = BASE32_DECODE[c as usize];
        if val == 0xFF {
            return None;
        }
        buffer = (buffer << 5) | val as u64;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            if pos < N {
                result[pos] = (buffer >> bits_in_buffer) as u8;
                pos += 1;
            }
        }
    }

    if pos < N {
        return None;
    }
    Some(result)
}

/// Derive the `ark_` address of a public key.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let mut address = String::with_capacity(Address::PREFIX.len() + ENCODED_LEN);
    address.push_str(Address::PREFIX);
    address.push_str(&encode_base32(public_key.as_bytes()));
    address.push_str(&encode_base32(&checksum(public_key.as_bytes())));
    Address::new(address)
}

/// Recover the public key of an address; `None` when malformed or the
/// checksum does not match.
pub fn decode_address(address: &str) -> Option<PublicKey> {
    let encoded = address.strip_prefix(Address::PREFIX)?;
    if encoded.len() != ENCODED_LEN || !encoded.is_ascii() {
        return None;
    }
    let (key_part, checksum_part) = encoded.split_at(PUBKEY_CHARS);
    let key: [u8; 32] = decode_base32_fixed(key_part)?;
    let sum: [u8; 5] = decode_base32_fixed(checksum_part)?;
    (sum == checksum(&key)).then_some(PublicKey(key))
}

pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    #[test]
    fn derived_address_shape() {
        let kp = keypair_from_seed(&[7u8; 32]);
        let addr = derive_address(&kp.public);
        assert!(addr.as_str().starts_with("ark_"));
        assert_eq!(addr.as_str().len(), 64);
        assert!(addr.is_valid());
        assert_eq!(decode_address(addr.as_str()), Some(kp.public));
    }

    #[test]
    fn checksum_mismatch_rejected() {
        let addr = derive_address(&keypair_from_seed(&[8u8; 32]).public);
        let mut bad = addr.as_str().to_string();
        let last = bad.pop().unwrap();
        bad.push(if last == '1' { '3' } else { '1' });
        assert!(!validate_address(&bad));
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert!(!validate_address("ark_tooshort"));
        assert!(!validate_address("ark_"));
        let addr = derive_address(&PublicKey([5u8; 32]));
        let foreign = addr.as_str().replacen("ark_", "brk_", 1);
        assert!(!validate_address(&foreign));
    }

    #[test]
    fn aggregate_keys_have_addresses() {
        // Aggregate multi-signature keys are digests, not curve points.
        let addr = derive_address(&PublicKey([0xFF; 32]));
        assert_eq!(decode_address(addr.as_str()), Some(PublicKey([0xFF; 32])));
    }
}
