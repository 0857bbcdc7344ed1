//! C4: identity-binding layer.
//!
//! Builds and verifies the libp2p handshake payload (identity public key +
//! signature over the Noise static key with a domain-separated prefix) and
//! derives the remote peer identifier. Peer-id derivation itself is an
//! external collaborator: the core only invokes it through
//! [`PeerIdDeriver`].
//!
//! This follows the libp2p-noise identity-binding shape: sign a
//! domain-separated transcript with a long-term key, the same pattern
//! used elsewhere for peer authentication over an otherwise anonymous
//! Diffie-Hellman static key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{Error, Result};
use crate::payload::{Extensions, IdentityBindingPayload};
use crate::primitives::PublicKey as StaticPublicKey;

/// ASCII `"noise-libp2p-static-key:"` — exactly 24 octets.
pub const SIGNATURE_PREFIX: &[u8] = b"noise-libp2p-static-key:";

/// The long-term identity key the local side authenticates with.
///
/// This profile requires Ed25519; the `Unsupported` variant
/// exists so a caller's environment can hand this core an identity key of
/// another type and have construction fail cleanly with
/// `UnsupportedIdentityKey` rather than the core silently assuming a key
/// shape it doesn't understand.
pub enum IdentityKeypair {
    Ed25519(SigningKey),
    Unsupported { key_type: &'static str },
}

impl IdentityKeypair {
    fn require_ed25519(&self) -> Result<&SigningKey> {
        match self {
            IdentityKeypair::Ed25519(key) => Ok(key),
            IdentityKeypair::Unsupported { .. } => Err(Error::UnsupportedIdentityKey),
        }
    }
}

/// A fingerprint deterministically derived from an identity public key
/// (GLOSSARY: "Peer identifier"). Opaque to this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub Vec<u8>);

/// The pure function the environment provides for turning an identity
/// public key into a [`PeerId`].
pub trait PeerIdDeriver {
    fn derive(&self, identity_public_key: &[u8]) -> PeerId;
}

impl<F> PeerIdDeriver for F
where
    F: Fn(&[u8]) -> PeerId,
{
    fn derive(&self, identity_public_key: &[u8]) -> PeerId {
        (self)(identity_public_key)
    }
}

fn signed_message(static_public_key: &StaticPublicKey) -> Vec<u8> {
    let mut msg = Vec::with_capacity(SIGNATURE_PREFIX.len() + 32);
    msg.extend_from_slice(SIGNATURE_PREFIX);
    msg.extend_from_slice(static_public_key.as_bytes());
    msg
}

/// Builds the local side's identity-binding payload: the local identity
/// public key plus a signature over the local Noise static key.
pub fn build_payload(
    identity: &IdentityKeypair,
    local_static_public: &StaticPublicKey,
    extensions: Option<Extensions>,
) -> Result<IdentityBindingPayload> {
    let signing_key = identity.require_ed25519()?;

    let msg = signed_message(local_static_public);
    let sig: Signature = signing_key.sign(&msg);

    Ok(IdentityBindingPayload {
        identity_key: signing_key.verifying_key().to_bytes().to_vec(),
        identity_sig: sig.to_bytes().to_vec(),
        extensions,
    })
}

/// Verifies the remote side's identity-binding payload against the
/// Noise static key the handshake already authenticated. Returns the
/// verified remote identity public key and the derived peer id.
pub fn verify_payload(
    payload: &IdentityBindingPayload,
    remote_static_public: &StaticPublicKey,
    peer_id: &dyn PeerIdDeriver,
) -> Result<(PeerId, VerifyingKey)> {
    if payload.identity_key.is_empty() {
        return Err(Error::MissingIdentityKey);
    }
    if payload.identity_sig.is_empty() {
        return Err(Error::MissingIdentitySig);
    }

    let key_bytes: [u8; 32] = payload
        .identity_key
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidIdentityKey)?;
    let remote_identity_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| Error::InvalidIdentityKey)?;

    let sig_bytes: [u8; 64] = payload
        .identity_sig
        .as_slice()
        .try_into()
        .map_err(|_| Error::BadSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);

    let msg = signed_message(remote_static_public);
    remote_identity_key
        .verify(&msg, &signature)
        .map_err(|_| Error::BadSignature)?;

    let remote_peer_id = peer_id.derive(&payload.identity_key);
    Ok((remote_peer_id, remote_identity_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::x25519_keypair;
    use rand_core::OsRng;

    struct Sha256PeerId;
    impl PeerIdDeriver for Sha256PeerId {
        fn derive(&self, identity_public_key: &[u8]) -> PeerId {
            PeerId(crate::primitives::sha256(identity_public_key).to_vec())
        }
    }

    #[test]
    fn signature_prefix_is_exactly_24_octets() {
        assert_eq!(SIGNATURE_PREFIX.len(), 24);
    }

    #[test]
    fn build_then_verify_succeeds_and_derives_matching_peer_id() {
        let identity = SigningKey::generate(&mut OsRng);
        let expected_peer_id = Sha256PeerId.derive(&identity.verifying_key().to_bytes());
        let keypair = IdentityKeypair::Ed25519(identity);

        let (_, static_pub) = x25519_keypair();
        let payload = build_payload(&keypair, &static_pub, None).unwrap();

        let (peer_id, _) = verify_payload(&payload, &static_pub, &Sha256PeerId).unwrap();
        assert_eq!(peer_id, expected_peer_id);
    }

    #[test]
    fn verify_rejects_signature_bound_to_a_different_static_key() {
        let identity = SigningKey::generate(&mut OsRng);
        let keypair = IdentityKeypair::Ed25519(identity);

        let (_, static_pub) = x25519_keypair();
        let (_, other_static_pub) = x25519_keypair();
        let payload = build_payload(&keypair, &static_pub, None).unwrap();

        assert!(matches!(
            verify_payload(&payload, &other_static_pub, &Sha256PeerId),
            Err(Error::BadSignature)
        ));
    }

    #[test]
    fn unsupported_identity_key_type_is_rejected_at_construction() {
        let keypair = IdentityKeypair::Unsupported { key_type: "secp256k1" };
        let (_, static_pub) = x25519_keypair();

        assert!(matches!(
            build_payload(&keypair, &static_pub, None),
            Err(Error::UnsupportedIdentityKey)
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let identity = SigningKey::generate(&mut OsRng);
        let keypair = IdentityKeypair::Ed25519(identity);
        let (_, static_pub) = x25519_keypair();
        let mut payload = build_payload(&keypair, &static_pub, None).unwrap();
        payload.identity_sig[0] ^= 1;

        assert!(matches!(
            verify_payload(&payload, &static_pub, &Sha256PeerId),
            Err(Error::BadSignature)
        ));
    }
}
