//! Symmetric state.
//!
//! Holds `(ck, h, k, n)` exactly as the Noise protocol framework defines
//! and implements `MixHash`, `MixKey`, `EncryptAndHash`, `DecryptAndHash`
//! and `Split`. Unlike a pattern where the responder's static key is known
//! up front (and so a cipher key always exists from message one), XX's key
//! starts empty until the first Diffie-Hellman, so `k` here is optional
//! rather than a concrete array.

use std::fmt;

use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::primitives::{chacha20poly1305_open, chacha20poly1305_seal, hmac_sha256, sha256, HASHLEN};

/// `HKDF2(chain, input)`: two-output HKDF-Extract-and-Expand.
///
/// Implemented directly from `hmac_sha256` rather than through the `hkdf`
/// crate's `Hkdf::extract`/`expand`, so the two-output shape is explicit
/// and independently testable against fixed vectors.
pub fn hkdf2(chain: &[u8; HASHLEN], input: &[u8]) -> ([u8; HASHLEN], [u8; HASHLEN]) {
    let temp = hmac_sha256(chain, input);
    let out1 = hmac_sha256(&temp, &[0x01]);

    let mut out2_input = Vec::with_capacity(HASHLEN + 1);
    out2_input.extend_from_slice(&out1);
    out2_input.push(0x02);
    let out2 = hmac_sha256(&temp, &out2_input);

    (out1, out2)
}

pub struct SymmetricState {
    ck: [u8; HASHLEN],
    h: [u8; HASHLEN],
    k: Option<[u8; HASHLEN]>,
    n: u64,
}

impl fmt::Debug for SymmetricState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SymmetricState {{ h: {}, n: {}, k: {} }}",
            hex::encode(self.h),
            self.n,
            if self.k.is_some() { "<set>" } else { "<empty>" },
        )
    }
}

impl Drop for SymmetricState {
    fn drop(&mut self) {
        self.ck.zeroize();
        self.h.zeroize();
        if let Some(ref mut k) = self.k {
            k.zeroize();
        }
    }
}

impl SymmetricState {
    /// Initializes for the given protocol name. `protocol_name`
    /// must fit in `HASHLEN` bytes for this profile's fixed
    /// `"Noise_XX_25519_ChaChaPoly_SHA256"` (exactly 32 octets, no padding
    /// needed); a longer name would be hashed down instead, per the Noise
    /// specification, but this core only ever uses the one fixed name.
    pub fn initialize(protocol_name: &[u8]) -> Self {
        let mut h = [0u8; HASHLEN];
        if protocol_name.len() <= HASHLEN {
            h[..protocol_name.len()].copy_from_slice(protocol_name);
        } else {
            h = sha256(protocol_name);
        }

        let mut state = SymmetricState { ck: h, h, k: None, n: 0 };
        // MixHash(prologue) with empty prologue.
        state.mix_hash(b"");
        state
    }

    pub fn handshake_hash(&self) -> [u8; HASHLEN] {
        self.h
    }

    /// `MixHash(data)`: `h := sha256(h || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut buf = Vec::with_capacity(HASHLEN + data.len());
        buf.extend_from_slice(&self.h);
        buf.extend_from_slice(data);
        self.h = sha256(&buf);
    }

    /// `MixKey(input)`: `(ck, temp_k) := HKDF2(ck, input)`; `k := temp_k`;
    /// `n := 0`.
    pub fn mix_key(&mut self, input: &[u8]) {
        let (ck, temp_k) = hkdf2(&self.ck, input);
        self.ck = ck;
        self.k = Some(temp_k);
        self.n = 0;
    }

    /// `EncryptAndHash(plaintext)`. Errors if `n` would overflow its
    /// 64-bit space rather than silently wrapping back to a reused nonce.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self.k {
            None => {
                self.mix_hash(plaintext);
                Ok(plaintext.to_vec())
            }
            Some(k) => {
                let ciphertext = chacha20poly1305_seal(&k, self.n, &self.h, plaintext);
                self.mix_hash(&ciphertext);
                self.n = self.n.checked_add(1).ok_or(Error::NonceOverflow)?;
                Ok(ciphertext)
            }
        }
    }

    /// `DecryptAndHash(ciphertext)`. A `MacError` aborts the handshake.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self.k {
            None => {
                self.mix_hash(ciphertext);
                Ok(ciphertext.to_vec())
            }
            Some(k) => {
                let plaintext = chacha20poly1305_open(&k, self.n, &self.h, ciphertext)
                    .map_err(|_| Error::MacError)?;
                self.mix_hash(ciphertext);
                self.n = self.n.checked_add(1).ok_or(Error::NonceOverflow)?;
                Ok(plaintext)
            }
        }
    }

    /// `Split()`: `(k1, k2) := HKDF2(ck, "")`.
    pub fn split(&self) -> ([u8; HASHLEN], [u8; HASHLEN]) {
        hkdf2(&self.ck, b"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTOCOL_NAME: &[u8] = b"Noise_XX_25519_ChaChaPoly_SHA256";

    #[test]
    fn protocol_name_is_exactly_hashlen() {
        assert_eq!(PROTOCOL_NAME.len(), HASHLEN);
    }

    #[test]
    fn initial_key_is_empty_and_mix_key_sets_it() {
        let mut state = SymmetricState::initialize(PROTOCOL_NAME);
        assert!(state.k.is_none());

        // Empty-key EncryptAndHash is the identity function.
        let ct = state.encrypt_and_hash(b"hello").unwrap();
        assert_eq!(ct, b"hello");

        state.mix_key(b"some dh output");
        assert!(state.k.is_some());
        assert_eq!(state.n, 0);
    }

    #[test]
    fn encrypt_and_hash_roundtrips_once_keyed() {
        let mut send = SymmetricState::initialize(PROTOCOL_NAME);
        let mut recv = SymmetricState::initialize(PROTOCOL_NAME);

        send.mix_key(b"shared secret");
        recv.mix_key(b"shared secret");

        let ciphertext = send.encrypt_and_hash(b"payload").unwrap();
        let plaintext = recv.decrypt_and_hash(&ciphertext).unwrap();
        assert_eq!(plaintext, b"payload");
        assert_eq!(send.handshake_hash(), recv.handshake_hash());
    }

    #[test]
    fn decrypt_and_hash_rejects_tampered_ciphertext() {
        let mut send = SymmetricState::initialize(PROTOCOL_NAME);
        let mut recv = SymmetricState::initialize(PROTOCOL_NAME);
        send.mix_key(b"shared secret");
        recv.mix_key(b"shared secret");

        let mut ciphertext = send.encrypt_and_hash(b"payload").unwrap();
        ciphertext[0] ^= 1;

        assert!(matches!(recv.decrypt_and_hash(&ciphertext), Err(Error::MacError)));
    }

    #[test]
    fn nonce_at_max_is_rejected_instead_of_wrapping() {
        let mut send = SymmetricState::initialize(PROTOCOL_NAME);
        send.mix_key(b"shared secret");
        send.n = u64::MAX;

        assert!(matches!(
            send.encrypt_and_hash(b"payload"),
            Err(Error::NonceOverflow)
        ));
    }

    #[test]
    fn split_is_deterministic_from_chaining_key() {
        let mut a = SymmetricState::initialize(PROTOCOL_NAME);
        let mut b = SymmetricState::initialize(PROTOCOL_NAME);
        a.mix_key(b"x");
        b.mix_key(b"x");

        assert_eq!(a.split(), b.split());
    }
}
