//! TLV wire codec for the identity-binding payload carried as the payload
//! of Msg2 and Msg3.
//!
//! A libp2p-compatible deployment would use the existing
//! `NoiseHandshakePayload` protobuf schema, but protobuf codegen is out of
//! scope for this core. This defines an equivalent deterministic encoding
//! explicitly: a sequence of `(tag: u8, len: u16 big-endian, value)`
//! records, using the same tag numbers (1 = identity_key, 2 = identity_sig,
//! 4 = extensions, with extensions itself TLV-encoded the same way using
//! tags 1 = webtransport_certhashes, 2 = stream_muxers).

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

const TAG_IDENTITY_KEY: u8 = 1;
const TAG_IDENTITY_SIG: u8 = 2;
const TAG_EXTENSIONS: u8 = 4;

const TAG_CERTHASHES: u8 = 1;
const TAG_STREAM_MUXERS: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    pub webtransport_certhashes: Vec<Vec<u8>>,
    pub stream_muxers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBindingPayload {
    pub identity_key: Vec<u8>,
    pub identity_sig: Vec<u8>,
    pub extensions: Option<Extensions>,
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    let mut len = [0u8; 2];
    BigEndian::write_u16(&mut len, value.len() as u16);
    out.extend_from_slice(&len);
    out.extend_from_slice(value);
}

/// Reads one `(tag, value)` record from the front of `buf`, returning the
/// record and the unread remainder.
fn read_tlv(buf: &[u8]) -> Result<(u8, &[u8], &[u8])> {
    if buf.len() < 3 {
        return Err(Error::MalformedMessage("TLV record truncated before its header"));
    }
    let tag = buf[0];
    let len = BigEndian::read_u16(&buf[1..3]) as usize;
    if buf.len() < 3 + len {
        return Err(Error::MalformedMessage("TLV record truncated before its value"));
    }
    Ok((tag, &buf[3..3 + len], &buf[3 + len..]))
}

impl Extensions {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for hash in &self.webtransport_certhashes {
            write_tlv(&mut out, TAG_CERTHASHES, hash);
        }
        for muxer in &self.stream_muxers {
            write_tlv(&mut out, TAG_STREAM_MUXERS, muxer.as_bytes());
        }
        out
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        let mut ext = Extensions::default();
        while !buf.is_empty() {
            let (tag, value, rest) = read_tlv(buf)?;
            match tag {
                TAG_CERTHASHES => ext.webtransport_certhashes.push(value.to_vec()),
                TAG_STREAM_MUXERS => {
                    let s = String::from_utf8(value.to_vec())
                        .map_err(|_| Error::MalformedMessage("stream_muxers entry is not valid UTF-8"))?;
                    ext.stream_muxers.push(s);
                }
                _ => { /* unknown extension field: ignore, forward-compatible */ }
            }
            buf = rest;
        }
        Ok(ext)
    }
}

impl IdentityBindingPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_IDENTITY_KEY, &self.identity_key);
        write_tlv(&mut out, TAG_IDENTITY_SIG, &self.identity_sig);
        if let Some(ext) = &self.extensions {
            write_tlv(&mut out, TAG_EXTENSIONS, &ext.encode());
        }
        out
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let mut identity_key = None;
        let mut identity_sig = None;
        let mut extensions = None;

        while !buf.is_empty() {
            let (tag, value, rest) = read_tlv(buf)?;
            match tag {
                TAG_IDENTITY_KEY => identity_key = Some(value.to_vec()),
                TAG_IDENTITY_SIG => identity_sig = Some(value.to_vec()),
                TAG_EXTENSIONS => extensions = Some(Extensions::decode(value)?),
                _ => { /* unknown top-level field: ignore, forward-compatible */ }
            }
            buf = rest;
        }

        Ok(IdentityBindingPayload {
            identity_key: identity_key.ok_or(Error::MissingIdentityKey)?,
            identity_sig: identity_sig.ok_or(Error::MissingIdentitySig)?,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_without_extensions() {
        let payload = IdentityBindingPayload {
            identity_key: vec![1, 2, 3],
            identity_sig: vec![4; 64],
            extensions: None,
        };
        let decoded = IdentityBindingPayload::decode(&payload.encode()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn roundtrips_with_extensions() {
        let payload = IdentityBindingPayload {
            identity_key: vec![9; 32],
            identity_sig: vec![8; 64],
            extensions: Some(Extensions {
                webtransport_certhashes: vec![vec![1, 2], vec![3, 4, 5]],
                stream_muxers: vec!["/yamux/1.0.0".to_string(), "/mplex/6.7.0".to_string()],
            }),
        };
        let decoded = IdentityBindingPayload::decode(&payload.encode()).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn missing_identity_key_is_rejected() {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_IDENTITY_SIG, &[1, 2, 3]);
        assert!(matches!(
            IdentityBindingPayload::decode(&out),
            Err(Error::MissingIdentityKey)
        ));
    }

    #[test]
    fn missing_identity_sig_is_rejected() {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_IDENTITY_KEY, &[1, 2, 3]);
        assert!(matches!(
            IdentityBindingPayload::decode(&out),
            Err(Error::MissingIdentitySig)
        ));
    }
}
