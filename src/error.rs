//! Error taxonomy.
//!
//! One flat enum naming every failure kind the handshake and secured
//! channel can raise, wrapped at the orchestrator boundary
//! (`HandshakeFailure`) so callers never see a half-open channel.

use std::io;

/// A single failure kind. Shared between the handshake and the
/// post-handshake secured channel, since both report through the same
/// taxonomy and the orchestrator just forwards whichever kind occurred.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    TransportError(#[from] io::Error),

    #[error("short read: peer closed mid-frame")]
    ShortRead,

    #[error("operation attempted in a state that forbids it")]
    ProtocolStateViolation,

    #[error("handshake message too short for its declared tokens: {0}")]
    MalformedMessage(&'static str),

    #[error("AEAD authentication failed")]
    MacError,

    #[error("remote identity-binding payload is missing its identity key")]
    MissingIdentityKey,

    #[error("remote identity-binding payload is missing its signature")]
    MissingIdentitySig,

    #[error("remote identity public key does not deserialize")]
    InvalidIdentityKey,

    #[error("identity signature does not verify against the static key")]
    BadSignature,

    #[error("local identity key is not of a supported type")]
    UnsupportedIdentityKey,

    #[error("plaintext produces a record larger than 65535 octets")]
    RecordTooLarge,

    #[error("record body did not arrive within the read deadline")]
    ReadTimeout,

    #[error("nonce counter exhausted its 64-bit space; the channel must be re-keyed")]
    NonceOverflow,
}

/// Wraps whatever [`Error`] aborted the handshake. The handshake is
/// all-or-nothing: any failure closes the transport and
/// surfaces through this type, never leaving partial state behind.
#[derive(thiserror::Error, Debug)]
#[error("handshake failed: {0}")]
pub struct HandshakeFailure(#[from] pub Error);

pub type Result<T> = std::result::Result<T, Error>;
pub type HandshakeResult<T> = std::result::Result<T, HandshakeFailure>;
