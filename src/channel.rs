//! Secured channel: the post-handshake duplex.
//!
//! Length-framed AEAD records with independent send/recv nonce counters,
//! concurrency-safe read/write serialization, and buffered partial reads.
//!
//! The transport is split into independent read/write halves
//! (`tokio::io::split`) and each half is guarded by its own
//! `tokio::sync::Mutex` — an async-aware, FIFO-fair mutex — so concurrent
//! callers serialize per direction without blocking the other direction.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::identity::PeerId;
use crate::machine::SessionKeys;
use crate::primitives::{chacha20poly1305_open, chacha20poly1305_seal, MAC_SIZE};
use crate::transport::Transport;

/// `/noise`.
pub const SECURITY_PROTOCOL_ID: &str = "/noise";

const MAX_RECORD_LEN: usize = 65535;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

struct ReadState<R> {
    transport: R,
    recv_key: [u8; 32],
    recv_nonce: u64,
    buffer: VecDeque<u8>,
}

struct WriteState<W> {
    transport: W,
    send_key: [u8; 32],
    send_nonce: u64,
}

/// The post-handshake duplex yielded by the orchestrator (C5) on a
/// successful handshake.
pub struct SecuredChannel<T> {
    read: Mutex<ReadState<ReadHalf<T>>>,
    write: Mutex<WriteState<WriteHalf<T>>>,
    closed: AtomicBool,
    read_timeout: Duration,
    remote_peer_id: PeerId,
    remote_identity_public_key: VerifyingKey,
}

impl<T: Transport> SecuredChannel<T> {
    pub fn new(
        transport: T,
        keys: SessionKeys,
        remote_peer_id: PeerId,
        remote_identity_public_key: VerifyingKey,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        SecuredChannel {
            read: Mutex::new(ReadState {
                transport: read_half,
                recv_key: keys.recv_key,
                recv_nonce: 0,
                buffer: VecDeque::new(),
            }),
            write: Mutex::new(WriteState {
                transport: write_half,
                send_key: keys.send_key,
                send_nonce: 0,
            }),
            closed: AtomicBool::new(false),
            read_timeout: DEFAULT_READ_TIMEOUT,
            remote_peer_id,
            remote_identity_public_key,
        }
    }

    /// Overrides the record-reassembly read timeout (default 30s).
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn remote_peer_id(&self) -> &PeerId {
        &self.remote_peer_id
    }

    pub fn remote_identity_public_key(&self) -> &VerifyingKey {
        &self.remote_identity_public_key
    }

    pub fn security_protocol_id(&self) -> &'static str {
        SECURITY_PROTOCOL_ID
    }

    /// `write(plaintext)`.
    pub async fn write(&self, plaintext: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::TransportError(io::Error::new(
                io::ErrorKind::NotConnected,
                "channel is closed",
            )));
        }
        if plaintext.len() + MAC_SIZE > MAX_RECORD_LEN {
            return Err(Error::RecordTooLarge);
        }

        let mut state = self.write.lock().await;

        let ciphertext = chacha20poly1305_seal(&state.send_key, state.send_nonce, b"", plaintext);
        debug_assert!(ciphertext.len() <= MAX_RECORD_LEN);

        let mut frame = Vec::with_capacity(2 + ciphertext.len());
        frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        frame.extend_from_slice(&ciphertext);

        state.transport.write_all(&frame).await.map_err(Error::TransportError)?;
        state.send_nonce = state.send_nonce.checked_add(1).ok_or(Error::NonceOverflow)?;

        tracing::trace!(bytes = plaintext.len(), "wrote secured record");
        Ok(())
    }

    /// `read(n?)`.
    pub async fn read(&self, n: Option<usize>) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(Vec::new());
        }

        let mut state = self.read.lock().await;

        match n {
            None => {
                if !state.buffer.is_empty() {
                    return Ok(state.buffer.drain(..).collect());
                }
                match self.read_one_record(&mut state).await? {
                    Some(plaintext) => Ok(plaintext),
                    None => Ok(Vec::new()),
                }
            }
            Some(0) => Ok(Vec::new()),
            Some(want) => {
                while state.buffer.len() < want {
                    match self.read_one_record(&mut state).await? {
                        Some(plaintext) => state.buffer.extend(plaintext),
                        None => break, // EOF: return whatever remains
                    }
                }
                let take = want.min(state.buffer.len());
                Ok(state.buffer.drain(..take).collect())
            }
        }
    }

    /// Reads and decrypts exactly one wire record. `Ok(None)` means a clean
    /// EOF at a frame boundary; a `MacError`/`ShortRead`
    /// is fatal and the channel should be closed by the caller.
    async fn read_one_record(&self, state: &mut ReadState<ReadHalf<T>>) -> Result<Option<Vec<u8>>> {
        let read = tokio::time::timeout(self.read_timeout, async {
            let mut len_bytes = [0u8; 2];
            if !read_filling(&mut state.transport, &mut len_bytes).await? {
                return Ok(None);
            }
            let len = u16::from_be_bytes(len_bytes) as usize;
            if len < MAC_SIZE {
                return Err(Error::MalformedMessage("record shorter than the AEAD tag"));
            }

            let mut record = vec![0u8; len];
            state
                .transport
                .read_exact(&mut record)
                .await
                .map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof => Error::ShortRead,
                    _ => Error::TransportError(e),
                })?;
            Ok(Some(record))
        })
        .await
        .map_err(|_| Error::ReadTimeout)??;

        let record = match read {
            None => return Ok(None),
            Some(record) => record,
        };

        let plaintext = chacha20poly1305_open(&state.recv_key, state.recv_nonce, b"", &record)?;
        state.recv_nonce = state.recv_nonce.checked_add(1).ok_or(Error::NonceOverflow)?;
        Ok(Some(plaintext))
    }

    /// `close()`: delegates to the transport; idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut write = self.write.lock().await;
        write.transport.shutdown().await.map_err(Error::TransportError)
    }
}

/// Reads into `buf`, returning `Ok(true)` once it's full, or `Ok(false)`
/// if the transport hit EOF before any byte of this call was read (a
/// clean close at a frame boundary). An EOF after partial progress is a
/// [`Error::ShortRead`] raised by the caller, not here, since only the
/// caller knows whether zero-vs-partial distinguishes "closed" from
/// "desynced".
async fn read_filling<R: tokio::io::AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await.map_err(Error::TransportError)?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::ShortRead);
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::SessionKeys;
    use crate::primitives::chacha20poly1305_seal;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    fn dummy_channel(transport: tokio::io::DuplexStream, send_key: [u8; 32], recv_key: [u8; 32]) -> SecuredChannel<tokio::io::DuplexStream> {
        let keys = SessionKeys { send_key, recv_key };
        let identity = SigningKey::generate(&mut OsRng);
        SecuredChannel::new(transport, keys, PeerId(vec![0u8; 4]), identity.verifying_key())
    }

    #[tokio::test]
    async fn write_rejects_send_nonce_overflow_instead_of_wrapping() {
        let (a, _b) = tokio::io::duplex(1024);
        let channel = dummy_channel(a, [1u8; 32], [2u8; 32]);
        channel.write.lock().await.send_nonce = u64::MAX;

        assert!(matches!(channel.write(b"one too many").await, Err(Error::NonceOverflow)));
    }

    #[tokio::test]
    async fn read_rejects_recv_nonce_overflow_instead_of_wrapping() {
        let (a, mut b) = tokio::io::duplex(4096);
        let recv_key = [3u8; 32];
        let channel = dummy_channel(a, [1u8; 32], recv_key);
        channel.read.lock().await.recv_nonce = u64::MAX;

        // The peer encrypts under the nonce the channel is still willing to
        // decrypt (u64::MAX); the channel must reject advancing past it
        // rather than silently wrapping back to nonce 0.
        let ciphertext = chacha20poly1305_seal(&recv_key, u64::MAX, b"", b"one too many");
        let mut frame = Vec::with_capacity(2 + ciphertext.len());
        frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        frame.extend_from_slice(&ciphertext);
        b.write_all(&frame).await.unwrap();

        assert!(matches!(channel.read(None).await, Err(Error::NonceOverflow)));
    }

    #[tokio::test]
    async fn a_zero_length_record_is_rejected_rather_than_accepted_unauthenticated() {
        let (a, mut b) = tokio::io::duplex(1024);
        let channel = dummy_channel(a, [1u8; 32], [4u8; 32]);

        // `write()` never emits a frame shorter than the AEAD tag, so a
        // peer sending a bare zero-length prefix can only be an injected,
        // unauthenticated frame; it must not be handed to the caller as an
        // already-"decrypted" empty record.
        b.write_all(&0u16.to_be_bytes()).await.unwrap();

        assert!(matches!(channel.read(None).await, Err(Error::MalformedMessage(_))));
    }
}
