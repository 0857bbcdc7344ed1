//! The byte transport required from the collaborator: a
//! datagram-or-stream connection exposing async read/write/close. Out of
//! scope to implement; this module only states the bound the
//! rest of the core requires.
//!
//! Concretely, any `tokio::io::AsyncRead + AsyncWrite` is accepted — a TCP
//! stream, a QUIC stream, or (for tests) an in-memory duplex pipe
//! (`tokio::io::duplex`).

use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the handshake orchestrator (C5) and secured channel (C6) can
/// read from, write to, and close.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}
