//! The crate-internal state machinery: symmetric state and the XX
//! handshake engine, split into two files since the symmetric state is
//! reused verbatim across Noise patterns while the handshake engine is
//! pattern-specific.

pub mod handshake_state;
pub mod symmetric_state;

pub use handshake_state::{HandshakeState, Progress, Role, SessionKeys, PROTOCOL_NAME};
