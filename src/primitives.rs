//! Cipher primitives.
//!
//! Thin wrappers over SHA-256, HMAC-SHA-256, X25519 and ChaCha20-Poly1305
//! that the symmetric state (`machine::symmetric_state`) is built on. Kept
//! as free functions, separate from any handshake state, so each one is
//! unit-testable against fixed vectors on its own.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::error::Error;

pub const HASHLEN: usize = 32;
pub const MAC_SIZE: usize = 16;

pub type PrivateKey = x25519_dalek::StaticSecret;
pub type PublicKey = x25519_dalek::PublicKey;

/// `sha256(data) -> 32 bytes`.
pub fn sha256(data: &[u8]) -> [u8; HASHLEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `hmac_sha256(key, data) -> 32 bytes`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HASHLEN] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// `x25519_keypair() -> (private, public)`.
pub fn x25519_keypair() -> (PrivateKey, PublicKey) {
    let private = PrivateKey::random_from_rng(OsRng);
    let public = PublicKey::from(&private);
    (private, public)
}

/// `x25519_dh(private, remote_public) -> 32 bytes shared`.
///
/// All-zero input produces an all-zero shared secret; the core does not
/// reject low-order points beyond what the transcript hash already binds.
pub fn x25519_dh(private: &PrivateKey, remote_public: &PublicKey) -> [u8; 32] {
    private.diffie_hellman(remote_public).to_bytes()
}

/// Nonce encoding for ChaCha20-Poly1305: 12 octets, first 4 zero, remaining
/// 8 little-endian octets of `n`. Used uniformly by both the handshake
/// layer and the post-handshake transport layer (Open Question 1 in
/// SPEC_FULL.md: unify on the standard Noise encoding everywhere).
pub fn encode_nonce(n: u64) -> [u8; 12] {
    let mut buf = [0u8; 12];
    buf[4..].copy_from_slice(&n.to_le_bytes());
    buf
}

/// `chacha20poly1305_seal(key, nonce12, aad, plaintext) -> ciphertext || tag16`.
pub fn chacha20poly1305_seal(key: &[u8; 32], n: u64, aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = encode_nonce(n);
    cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .expect("ChaCha20-Poly1305 encryption is infallible for valid key/nonce sizes")
}

/// `chacha20poly1305_open(key, nonce12, aad, ciphertext_and_tag) -> plaintext | MacError`.
pub fn chacha20poly1305_open(
    key: &[u8; 32],
    n: u64,
    aad: &[u8],
    ciphertext_and_tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = encode_nonce(n);
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload { msg: ciphertext_and_tag, aad },
        )
        .map_err(|_| Error::MacError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_encoding_is_little_endian_in_high_octets() {
        let n = encode_nonce(1);
        assert_eq!(n, [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);

        let n = encode_nonce(0x0102_0304_0506_0708);
        assert_eq!(n, [0, 0, 0, 0, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn seal_then_open_roundtrips() {
        let key = [7u8; 32];
        let aad = b"associated data";
        let plaintext = b"hello noise";

        let sealed = chacha20poly1305_seal(&key, 0, aad, plaintext);
        assert_eq!(sealed.len(), plaintext.len() + MAC_SIZE);

        let opened = chacha20poly1305_open(&key, 0, aad, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn tampering_any_ciphertext_octet_is_detected() {
        let key = [9u8; 32];
        let mut sealed = chacha20poly1305_seal(&key, 0, b"", b"payload");
        sealed[0] ^= 0x01;

        assert!(matches!(
            chacha20poly1305_open(&key, 0, b"", &sealed),
            Err(Error::MacError)
        ));
    }

    #[test]
    fn dh_is_symmetric() {
        let (a_priv, a_pub) = x25519_keypair();
        let (b_priv, b_pub) = x25519_keypair();

        assert_eq!(x25519_dh(&a_priv, &b_pub), x25519_dh(&b_priv, &a_pub));
    }

    #[test]
    fn hmac_sha256_matches_known_vector() {
        // RFC 4231 test case 1.
        let key = [0x0bu8; 20];
        let data = b"Hi There";
        let expected = "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff";
        assert_eq!(hex::encode(hmac_sha256(&key, data)), expected);
    }
}
