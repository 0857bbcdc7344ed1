//! Handshake orchestrator.
//!
//! Sequences framed handshake messages over the byte transport for
//! initiator and responder, producing a fully initialized secured channel
//! on success. Each handshake message is framed with a 2-octet big-endian
//! length prefix, since the XX pattern's payloads (the identity-binding
//! record) vary in size message to message, unlike a fixed-size act
//! framing. The sequencing itself is plain `async`/`await` over the
//! transport rather than callback- or poll-driven.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::channel::SecuredChannel;
use crate::error::{Error, HandshakeFailure, HandshakeResult};
use crate::identity::{self, IdentityKeypair, PeerIdDeriver};
use crate::machine::{HandshakeState, Role};
use crate::payload::{Extensions, IdentityBindingPayload};
use crate::primitives::PrivateKey;
use crate::transport::Transport;

async fn write_handshake_frame<T: Transport>(transport: &mut T, message: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(message.len())
        .map_err(|_| Error::MalformedMessage("handshake message exceeds 65535 octets"))?;
    transport.write_all(&len.to_be_bytes()).await?;
    transport.write_all(message).await?;
    Ok(())
}

async fn read_handshake_frame<T: Transport>(transport: &mut T) -> Result<Vec<u8>, Error> {
    let mut len_bytes = [0u8; 2];
    read_exact_or_short(transport, &mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes) as usize;

    let mut message = vec![0u8; len];
    read_exact_or_short(transport, &mut message).await?;
    Ok(message)
}

async fn read_exact_or_short<T: Transport>(transport: &mut T, buf: &mut [u8]) -> Result<(), Error> {
    match transport.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ShortRead),
        Err(e) => Err(Error::TransportError(e)),
    }
}

/// Runs the full initiator sequence over `transport`, yielding
/// a secured channel on success. Any failure closes `transport` and
/// returns a wrapped [`HandshakeFailure`]; no partial channel is ever
/// returned.
pub async fn run_initiator<T: Transport>(
    mut transport: T,
    local_static: PrivateKey,
    local_identity: IdentityKeypair,
    extensions: Option<Extensions>,
    peer_id: &dyn PeerIdDeriver,
) -> HandshakeResult<SecuredChannel<T>> {
    let mut handshake = HandshakeState::new(Role::Initiator, local_static);

    match run_initiator_steps(&mut transport, &mut handshake, local_identity, extensions, peer_id).await {
        Ok((keys, remote_peer_id, remote_identity_key)) => {
            Ok(SecuredChannel::new(transport, keys, remote_peer_id, remote_identity_key))
        }
        Err(err) => {
            let _ = transport.shutdown().await;
            Err(HandshakeFailure(err))
        }
    }
}

async fn run_initiator_steps<T: Transport>(
    transport: &mut T,
    handshake: &mut HandshakeState,
    local_identity: IdentityKeypair,
    extensions: Option<Extensions>,
    peer_id: &dyn PeerIdDeriver,
) -> Result<(crate::machine::SessionKeys, identity::PeerId, ed25519_dalek::VerifyingKey), Error> {
    // Msg1: -> e
    let msg1 = handshake.write_message_1()?;
    write_handshake_frame(transport, &msg1).await?;
    tracing::trace!("initiator: sent msg1");

    // Msg2: <- e, ee, s, es + responder's identity-binding payload
    let msg2 = read_handshake_frame(transport).await?;
    let responder_payload_bytes = handshake.read_message_2(&msg2)?;
    if responder_payload_bytes.is_empty() {
        return Err(Error::MissingIdentityKey);
    }
    let responder_payload = IdentityBindingPayload::decode(&responder_payload_bytes)?;
    let remote_static = *handshake
        .remote_static_key()
        .expect("read_message_2 records the remote static key");
    let (remote_peer_id, remote_identity_key) =
        identity::verify_payload(&responder_payload, &remote_static, peer_id)?;
    tracing::trace!("initiator: verified responder identity binding");

    // Msg3: -> s, se + initiator's identity-binding payload
    let local_static_public = handshake.local_static_public();
    let our_payload = identity::build_payload(&local_identity, &local_static_public, extensions)?;
    let (msg3, keys) = handshake.write_message_3(&our_payload.encode())?;
    write_handshake_frame(transport, &msg3).await?;
    tracing::debug!("initiator: handshake complete");

    Ok((keys, remote_peer_id, remote_identity_key))
}

/// Test-only seam: drives the initiator sequence exactly like
/// [`run_initiator`], except `raw_payload` is sent verbatim as the Msg3
/// identity-binding payload instead of one built from an
/// [`IdentityKeypair`]. Lets a test suite hand the responder a payload
/// with a deliberately wrong field (e.g. a corrupted signature) while
/// still exercising the real framing, AEAD encryption and wire transit —
/// and, on the other end, the real `run_responder` decode/verify path —
/// rather than reimplementing any of that logic inline.
pub async fn run_initiator_with_raw_payload<T: Transport>(
    mut transport: T,
    local_static: PrivateKey,
    raw_payload: IdentityBindingPayload,
    peer_id: &dyn PeerIdDeriver,
) -> HandshakeResult<SecuredChannel<T>> {
    let mut handshake = HandshakeState::new(Role::Initiator, local_static);

    match run_initiator_steps_with_raw_payload(&mut transport, &mut handshake, raw_payload, peer_id).await {
        Ok((keys, remote_peer_id, remote_identity_key)) => {
            Ok(SecuredChannel::new(transport, keys, remote_peer_id, remote_identity_key))
        }
        Err(err) => {
            let _ = transport.shutdown().await;
            Err(HandshakeFailure(err))
        }
    }
}

async fn run_initiator_steps_with_raw_payload<T: Transport>(
    transport: &mut T,
    handshake: &mut HandshakeState,
    raw_payload: IdentityBindingPayload,
    peer_id: &dyn PeerIdDeriver,
) -> Result<(crate::machine::SessionKeys, identity::PeerId, ed25519_dalek::VerifyingKey), Error> {
    // Msg1: -> e
    let msg1 = handshake.write_message_1()?;
    write_handshake_frame(transport, &msg1).await?;

    // Msg2: <- e, ee, s, es + responder's identity-binding payload
    let msg2 = read_handshake_frame(transport).await?;
    let responder_payload_bytes = handshake.read_message_2(&msg2)?;
    if responder_payload_bytes.is_empty() {
        return Err(Error::MissingIdentityKey);
    }
    let responder_payload = IdentityBindingPayload::decode(&responder_payload_bytes)?;
    let remote_static = *handshake
        .remote_static_key()
        .expect("read_message_2 records the remote static key");
    let (remote_peer_id, remote_identity_key) =
        identity::verify_payload(&responder_payload, &remote_static, peer_id)?;

    // Msg3: -> s, se + the caller-supplied (possibly malformed) payload
    let (msg3, keys) = handshake.write_message_3(&raw_payload.encode())?;
    write_handshake_frame(transport, &msg3).await?;

    Ok((keys, remote_peer_id, remote_identity_key))
}

/// Runs the full responder sequence over `transport`.
pub async fn run_responder<T: Transport>(
    mut transport: T,
    local_static: PrivateKey,
    local_identity: IdentityKeypair,
    extensions: Option<Extensions>,
    peer_id: &dyn PeerIdDeriver,
) -> HandshakeResult<SecuredChannel<T>> {
    let mut handshake = HandshakeState::new(Role::Responder, local_static);

    match run_responder_steps(&mut transport, &mut handshake, local_identity, extensions, peer_id).await {
        Ok((keys, remote_peer_id, remote_identity_key)) => {
            Ok(SecuredChannel::new(transport, keys, remote_peer_id, remote_identity_key))
        }
        Err(err) => {
            let _ = transport.shutdown().await;
            Err(HandshakeFailure(err))
        }
    }
}

async fn run_responder_steps<T: Transport>(
    transport: &mut T,
    handshake: &mut HandshakeState,
    local_identity: IdentityKeypair,
    extensions: Option<Extensions>,
    peer_id: &dyn PeerIdDeriver,
) -> Result<(crate::machine::SessionKeys, identity::PeerId, ed25519_dalek::VerifyingKey), Error> {
    // Msg1: <- e
    let msg1 = read_handshake_frame(transport).await?;
    handshake.read_message_1(&msg1)?;
    tracing::trace!("responder: received msg1");

    // Msg2: -> e, ee, s, es + responder's identity-binding payload
    let local_static_public = handshake.local_static_public();
    let our_payload = identity::build_payload(&local_identity, &local_static_public, extensions)?;
    let msg2 = handshake.write_message_2(&our_payload.encode())?;
    write_handshake_frame(transport, &msg2).await?;

    // Msg3: <- s, se + initiator's identity-binding payload
    let msg3 = read_handshake_frame(transport).await?;
    let (initiator_payload_bytes, keys) = handshake.read_message_3(&msg3)?;
    if initiator_payload_bytes.is_empty() {
        return Err(Error::MissingIdentityKey);
    }
    let initiator_payload = IdentityBindingPayload::decode(&initiator_payload_bytes)?;
    let remote_static = *handshake
        .remote_static_key()
        .expect("read_message_3 records the remote static key");
    let (remote_peer_id, remote_identity_key) =
        identity::verify_payload(&initiator_payload, &remote_static, peer_id)?;
    tracing::debug!("responder: handshake complete");

    Ok((keys, remote_peer_id, remote_identity_key))
}
