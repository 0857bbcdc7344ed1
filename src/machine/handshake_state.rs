//! XX handshake engine.
//!
//! Drives the three-message Noise-XX exchange for either role: both
//! parties' statics are revealed in-band rather than either side already
//! knowing the other's static key up front.
//!
//! One concrete method per message (`write_message_1`/`read_message_1`/...)
//! rather than a single generic `write_next_message`/`read_next_message`
//! dispatch, since the orchestrator (`orchestrator.rs`) always knows
//! exactly which message is next for its role and calls the per-message
//! methods directly.

use std::fmt;

use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::machine::symmetric_state::SymmetricState;
use crate::primitives::{x25519_dh, x25519_keypair, PrivateKey, PublicKey};

/// ASCII `"Noise_XX_25519_ChaChaPoly_SHA256"` — exactly 32 octets.
pub const PROTOCOL_NAME: &[u8] = b"Noise_XX_25519_ChaChaPoly_SHA256";

const KEY_SIZE: usize = 32;
const MAC_SIZE: usize = 16;

/// Progress states and legal transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Initial,
    SentE,
    SentEes,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// The two per-direction session keys `Split` yields at handshake
/// completion.
pub struct SessionKeys {
    pub send_key: [u8; KEY_SIZE],
    pub recv_key: [u8; KEY_SIZE],
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.send_key.zeroize();
        self.recv_key.zeroize();
    }
}

pub struct HandshakeState {
    symmetric_state: SymmetricState,
    role: Role,
    progress: Progress,

    local_static: PrivateKey,
    local_static_public: PublicKey,
    local_ephemeral: PrivateKey,
    local_ephemeral_public: PublicKey,

    remote_ephemeral: Option<PublicKey>,
    remote_static: Option<PublicKey>,
}

impl fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HandshakeState {{ role: {:?}, progress: {:?}, symmetric_state: {:?} }}",
            self.role, self.progress, self.symmetric_state,
        )
    }
}

impl HandshakeState {
    /// Builds a fresh handshake context. The local ephemeral key pair is
    /// generated here, at construction, not lazily per act.
    pub fn new(role: Role, local_static: PrivateKey) -> Self {
        let local_static_public = PublicKey::from(&local_static);
        let (local_ephemeral, local_ephemeral_public) = x25519_keypair();

        HandshakeState {
            symmetric_state: SymmetricState::initialize(PROTOCOL_NAME),
            role,
            progress: Progress::Initial,
            local_static,
            local_static_public,
            local_ephemeral,
            local_ephemeral_public,
            remote_ephemeral: None,
            remote_static: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn remote_static_key(&self) -> Option<&PublicKey> {
        self.remote_static.as_ref()
    }

    pub fn local_static_public(&self) -> PublicKey {
        self.local_static_public
    }

    pub fn handshake_hash(&self) -> [u8; 32] {
        self.symmetric_state.handshake_hash()
    }

    fn fail(&mut self, err: Error) -> Error {
        self.progress = Progress::Error;
        err
    }

    /// Write Msg1 (initiator, Initial): `e`. Empty payload in this profile.
    ///
    ///    -> e
    pub fn write_message_1(&mut self) -> Result<Vec<u8>> {
        if self.role != Role::Initiator || self.progress != Progress::Initial {
            return Err(self.fail(Error::ProtocolStateViolation));
        }

        let e_pub = self.local_ephemeral_public.to_bytes();
        self.symmetric_state.mix_hash(&e_pub);
        self.symmetric_state.mix_hash(b"");

        self.progress = Progress::SentE;
        Ok(e_pub.to_vec())
    }

    /// Read Msg1 (responder, Initial).
    pub fn read_message_1(&mut self, frame: &[u8]) -> Result<()> {
        if self.role != Role::Responder || self.progress != Progress::Initial {
            return Err(self.fail(Error::ProtocolStateViolation));
        }
        if frame.len() < KEY_SIZE {
            return Err(self.fail(Error::MalformedMessage("msg1 shorter than 32 octets")));
        }

        let re = parse_public_key(&frame[..KEY_SIZE])
            .map_err(|e| self.fail(e))?;
        self.symmetric_state.mix_hash(&frame[..KEY_SIZE]);
        self.symmetric_state.mix_hash(b"");
        self.remote_ephemeral = Some(re);

        self.progress = Progress::SentE;
        Ok(())
    }

    /// Write Msg2 (responder, SentE): `e, ee, s, es` + encrypted payload.
    ///
    ///    <- e, ee, s, es
    pub fn write_message_2(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.role != Role::Responder || self.progress != Progress::SentE {
            return Err(self.fail(Error::ProtocolStateViolation));
        }

        let re = self.remote_ephemeral.expect("SentE implies remote ephemeral recorded");

        let e_pub = self.local_ephemeral_public.to_bytes();
        self.symmetric_state.mix_hash(&e_pub);

        let ee = x25519_dh(&self.local_ephemeral, &re);
        self.symmetric_state.mix_key(&ee);

        let ct_s = self
            .symmetric_state
            .encrypt_and_hash(&self.local_static_public.to_bytes())
            .map_err(|e| self.fail(e))?;

        let es = x25519_dh(&self.local_static, &re);
        self.symmetric_state.mix_key(&es);

        let ct_payload = self.symmetric_state.encrypt_and_hash(payload).map_err(|e| self.fail(e))?;

        let mut out = Vec::with_capacity(e_pub.len() + ct_s.len() + ct_payload.len());
        out.extend_from_slice(&e_pub);
        out.extend_from_slice(&ct_s);
        out.extend_from_slice(&ct_payload);

        self.progress = Progress::SentEes;
        Ok(out)
    }

    /// Read Msg2 (initiator, SentE). Returns the decrypted payload.
    pub fn read_message_2(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.role != Role::Initiator || self.progress != Progress::SentE {
            return Err(self.fail(Error::ProtocolStateViolation));
        }
        if frame.len() < KEY_SIZE + (KEY_SIZE + MAC_SIZE) + MAC_SIZE {
            return Err(self.fail(Error::MalformedMessage("msg2 shorter than 96 octets")));
        }

        let re = parse_public_key(&frame[..KEY_SIZE]).map_err(|e| self.fail(e))?;
        self.symmetric_state.mix_hash(&frame[..KEY_SIZE]);

        let ee = x25519_dh(&self.local_ephemeral, &re);
        self.symmetric_state.mix_key(&ee);

        let ct_s = &frame[KEY_SIZE..KEY_SIZE + KEY_SIZE + MAC_SIZE];
        let rs_bytes = self
            .symmetric_state
            .decrypt_and_hash(ct_s)
            .map_err(|e| self.fail(e))?;
        let rs = parse_public_key(&rs_bytes).map_err(|e| self.fail(e))?;

        let es = x25519_dh(&self.local_ephemeral, &rs);
        self.symmetric_state.mix_key(&es);

        let ct_payload = &frame[KEY_SIZE + KEY_SIZE + MAC_SIZE..];
        let payload = self
            .symmetric_state
            .decrypt_and_hash(ct_payload)
            .map_err(|e| self.fail(e))?;

        self.remote_ephemeral = Some(re);
        self.remote_static = Some(rs);
        self.progress = Progress::SentEes;
        Ok(payload)
    }

    /// Write Msg3 (initiator, SentEes): `s, se` + encrypted payload. On
    /// success, yields the session keys from `Split`.
    ///
    ///    -> s, se
    pub fn write_message_3(&mut self, payload: &[u8]) -> Result<(Vec<u8>, SessionKeys)> {
        if self.role != Role::Initiator || self.progress != Progress::SentEes {
            return Err(self.fail(Error::ProtocolStateViolation));
        }

        let re = self.remote_ephemeral.expect("SentEes implies remote ephemeral recorded");

        let ct_s = self
            .symmetric_state
            .encrypt_and_hash(&self.local_static_public.to_bytes())
            .map_err(|e| self.fail(e))?;

        let se = x25519_dh(&self.local_static, &re);
        self.symmetric_state.mix_key(&se);

        let ct_payload = self.symmetric_state.encrypt_and_hash(payload).map_err(|e| self.fail(e))?;

        let mut out = Vec::with_capacity(ct_s.len() + ct_payload.len());
        out.extend_from_slice(&ct_s);
        out.extend_from_slice(&ct_payload);

        let (k1, k2) = self.symmetric_state.split();
        let keys = SessionKeys { send_key: k1, recv_key: k2 };

        self.progress = Progress::Complete;
        Ok((out, keys))
    }

    /// Read Msg3 (responder, SentEes). Returns the decrypted payload and
    /// the session keys from `Split`.
    pub fn read_message_3(&mut self, frame: &[u8]) -> Result<(Vec<u8>, SessionKeys)> {
        if self.role != Role::Responder || self.progress != Progress::SentEes {
            return Err(self.fail(Error::ProtocolStateViolation));
        }
        if frame.len() < (KEY_SIZE + MAC_SIZE) + MAC_SIZE {
            return Err(self.fail(Error::MalformedMessage("msg3 shorter than 64 octets")));
        }

        let ct_s = &frame[..KEY_SIZE + MAC_SIZE];
        let rs_bytes = self
            .symmetric_state
            .decrypt_and_hash(ct_s)
            .map_err(|e| self.fail(e))?;
        let rs = parse_public_key(&rs_bytes).map_err(|e| self.fail(e))?;

        let se = x25519_dh(&self.local_ephemeral, &rs);
        self.symmetric_state.mix_key(&se);

        let ct_payload = &frame[KEY_SIZE + MAC_SIZE..];
        let payload = self
            .symmetric_state
            .decrypt_and_hash(ct_payload)
            .map_err(|e| self.fail(e))?;

        self.remote_static = Some(rs);

        let (k1, k2) = self.symmetric_state.split();
        let keys = SessionKeys { send_key: k2, recv_key: k1 };

        self.progress = Progress::Complete;
        Ok((payload, keys))
    }
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let arr: [u8; KEY_SIZE] = bytes
        .try_into()
        .map_err(|_| Error::MalformedMessage("public key is not 32 octets"))?;
    Ok(PublicKey::from(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_pair() -> (PrivateKey, PrivateKey) {
        let (a, _) = x25519_keypair();
        let (b, _) = x25519_keypair();
        (a, b)
    }

    #[test]
    fn full_xx_exchange_yields_matching_transcript_and_keys() {
        let (i_static, r_static) = fresh_pair();
        let mut initiator = HandshakeState::new(Role::Initiator, i_static);
        let mut responder = HandshakeState::new(Role::Responder, r_static);

        let msg1 = initiator.write_message_1().unwrap();
        responder.read_message_1(&msg1).unwrap();

        let msg2 = responder.write_message_2(b"").unwrap();
        let payload2 = initiator.read_message_2(&msg2).unwrap();
        assert!(payload2.is_empty());

        let (msg3, i_keys) = initiator.write_message_3(b"").unwrap();
        let (payload3, r_keys) = responder.read_message_3(&msg3).unwrap();
        assert!(payload3.is_empty());

        assert_eq!(initiator.handshake_hash(), responder.handshake_hash());
        assert_eq!(i_keys.send_key, r_keys.recv_key);
        assert_eq!(i_keys.recv_key, r_keys.send_key);
    }

    #[test]
    fn responder_cannot_write_first() {
        let (_, r_static) = fresh_pair();
        let mut responder = HandshakeState::new(Role::Responder, r_static);

        assert!(matches!(
            responder.write_message_2(b""),
            Err(Error::ProtocolStateViolation)
        ));
    }

    #[test]
    fn msg1_shorter_than_32_octets_is_malformed() {
        let (_, r_static) = fresh_pair();
        let mut responder = HandshakeState::new(Role::Responder, r_static);

        assert!(matches!(
            responder.read_message_1(&[0u8; 10]),
            Err(Error::MalformedMessage(_))
        ));
    }
}
