//! Noise-XX (Curve25519 / ChaCha20-Poly1305 / SHA-256) handshake engine
//! with libp2p identity binding, and the post-handshake secured channel it
//! produces.
//!
//! This is the secure-channel core of a peer-to-peer networking library:
//! it mutually authenticates two peers by their long-term Ed25519 identity
//! keys, derives per-direction session keys via a Noise-XX handshake, and
//! transports arbitrary application bytes over the resulting
//! authenticated-encrypted, length-framed channel.
//!
//! Out of scope (external collaborators, see the crate's `transport`
//! module and `identity::PeerIdDeriver`): the underlying byte transport,
//! identity key storage, and peer-id derivation.

#![forbid(unsafe_code)]

mod channel;
mod error;
mod identity;
mod machine;
mod orchestrator;
mod payload;
mod primitives;
mod transport;

pub use channel::{SecuredChannel, SECURITY_PROTOCOL_ID};
pub use error::{Error, HandshakeFailure, HandshakeResult, Result};
pub use identity::{IdentityKeypair, PeerId, PeerIdDeriver};
pub use machine::{Role, SessionKeys};
pub use orchestrator::{run_initiator, run_initiator_with_raw_payload, run_responder};
pub use payload::{Extensions, IdentityBindingPayload};
pub use primitives::{PrivateKey, PublicKey};
pub use transport::Transport;

pub use ed25519_dalek::{SigningKey, VerifyingKey};
