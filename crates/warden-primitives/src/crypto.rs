//! keccak hashing, address derivation and TSS key proof checks

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::types::{Address, ErrorKind, PublicKey, H256};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("public key is not a valid secp256k1 point")]
    InvalidPublicKey,

    #[error("signature must be 65 bytes (r || s || v), got {0}")]
    InvalidSignatureLength(usize),

    #[error("malformed signature")]
    MalformedSignature,

    #[error("recovered signer {recovered} does not match key address {expected}")]
    SignerMismatch { expected: Address, recovered: Address },
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

/// keccak256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// incremental keccak for structured content hashes
#[derive(Clone, Default)]
pub struct ContentHasher(Keccak256);

impl ContentHasher {
    pub fn new(domain: &[u8]) -> Self {
        let mut h = Self(Keccak256::new());
        h.bytes(domain);
        h
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.0.update(v.to_be_bytes());
        self
    }

    pub fn u128(&mut self, v: u128) -> &mut Self {
        self.0.update(v.to_be_bytes());
        self
    }

    pub fn fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update(bytes);
        self
    }

    /// length prefixed, so adjacent variable fields cannot alias
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update((bytes.len() as u64).to_be_bytes());
        self.0.update(bytes);
        self
    }

    pub fn finish(self) -> H256 {
        H256(self.0.finalize().into())
    }
}

/// ethereum style address: last 20 bytes of keccak(x || y)
pub fn pubkey_to_address(pubkey: &PublicKey) -> Address {
    let hash = keccak256(&pubkey.0);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

/// hash under which a finalized TSS key is stored
pub fn key_hash(pubkey: &PublicKey) -> H256 {
    H256(keccak256(&pubkey.0))
}

/// reject byte strings that are not on the curve
pub fn validate_pubkey(pubkey: &PublicKey) -> Result<(), CryptoError> {
    parse_pubkey(pubkey).map(|_| ())
}

fn parse_pubkey(pubkey: &PublicKey) -> Result<VerifyingKey, CryptoError> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(&pubkey.0);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidPublicKey)
}

fn verifying_key_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let mut raw = [0u8; 64];
    raw.copy_from_slice(&point.as_bytes()[1..]);
    pubkey_to_address(&PublicKey(raw))
}

/// recover the signer of a 32 byte prehash from a 65 byte signature
///
/// `v` may be given as 0/1 or in the legacy 27/28 form.
pub fn recover_signer(prehash: &[u8; 32], signature: &[u8]) -> Result<Address, CryptoError> {
    if signature.len() != 65 {
        return Err(CryptoError::InvalidSignatureLength(signature.len()));
    }
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::MalformedSignature)?;
    let v = match signature[64] {
        27 | 28 => signature[64] - 27,
        v => v,
    };
    let recid = RecoveryId::from_byte(v).ok_or(CryptoError::MalformedSignature)?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recid)
        .map_err(|_| CryptoError::MalformedSignature)?;
    Ok(verifying_key_address(&key))
}

/// proof that the generated key is held: signature over keccak(pubkey)
/// must recover to the address of that very key
pub fn verify_key_signature(pubkey: &PublicKey, signature: &[u8]) -> Result<(), CryptoError> {
    validate_pubkey(pubkey)?;
    let expected = pubkey_to_address(pubkey);
    let recovered = recover_signer(&keccak256(&pubkey.0), signature)?;
    if recovered != expected {
        return Err(CryptoError::SignerMismatch { expected, recovered });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn key(seed: u8) -> (SigningKey, PublicKey) {
        let sk = SigningKey::from_slice(&[seed; 32]).unwrap();
        let point = sk.verifying_key().to_encoded_point(false);
        let pk = PublicKey::from_slice(&point.as_bytes()[1..]).unwrap();
        (sk, pk)
    }

    fn sign(sk: &SigningKey, pk: &PublicKey) -> Vec<u8> {
        let (sig, recid) = sk.sign_prehash_recoverable(&keccak256(&pk.0)).unwrap();
        let mut out = sig.to_bytes().to_vec();
        out.push(recid.to_byte());
        out
    }

    #[test]
    fn keccak_empty_vector() {
        // well known keccak256("")
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn address_from_known_key() {
        // private key 1 -> 0x7e5f4552091a69125d5dfcb7b8c2659029395bdf
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let sk = SigningKey::from_slice(&secret).unwrap();
        let point = sk.verifying_key().to_encoded_point(false);
        let pk = PublicKey::from_slice(&point.as_bytes()[1..]).unwrap();
        assert_eq!(
            pubkey_to_address(&pk).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn key_signature_accepts_own_key() {
        let (sk, pk) = key(3);
        let sig = sign(&sk, &pk);
        assert_eq!(verify_key_signature(&pk, &sig), Ok(()));

        // legacy v encoding
        let mut legacy = sig.clone();
        legacy[64] += 27;
        assert_eq!(verify_key_signature(&pk, &legacy), Ok(()));
    }

    #[test]
    fn key_signature_rejects_other_signer() {
        let (_, pk) = key(3);
        let (other, _) = key(4);
        let sig = sign(&other, &pk);
        assert!(matches!(
            verify_key_signature(&pk, &sig),
            Err(CryptoError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn key_signature_rejects_bad_length() {
        let (_, pk) = key(3);
        assert_eq!(
            verify_key_signature(&pk, &[0u8; 64]),
            Err(CryptoError::InvalidSignatureLength(64))
        );
    }

    #[test]
    fn off_curve_key_rejected() {
        assert_eq!(
            validate_pubkey(&PublicKey([1u8; 64])),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn content_hasher_length_prefixes() {
        let mut a = ContentHasher::new(b"t");
        a.bytes(b"ab").bytes(b"c");
        let mut b = ContentHasher::new(b"t");
        b.bytes(b"a").bytes(b"bc");
        assert_ne!(a.finish(), b.finish());
    }
}
