//! The signed archive envelope every persistent file is wrapped in
//! (spec.md §4.11).

use fim_error::{DatabaseError, FimError, Result, SerializerError};
use fim_types::CryptoCollaborator;

const MAGIC: u32 = 0x78f9beb3;

/// Distinguishes the kind of payload an envelope carries (spec.md §6's
/// "callers identify files by `header_id`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderId {
    Policy,
    Database,
    Report,
    Configuration,
    Key,
}

impl HeaderId {
    fn to_u32(self) -> u32 {
        match self {
            HeaderId::Policy => 1,
            HeaderId::Database => 2,
            HeaderId::Report => 3,
            HeaderId::Configuration => 4,
            HeaderId::Key => 5,
        }
    }

    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => HeaderId::Policy,
            2 => HeaderId::Database,
            3 => HeaderId::Report,
            4 => HeaderId::Configuration,
            5 => HeaderId::Key,
            _ => return None,
        })
    }
}

/// How the body is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    None,
    Compressed,
    Asymmetric,
}

impl Encoding {
    fn to_i16(self) -> i16 {
        match self {
            Encoding::None => 0,
            Encoding::Compressed => 1,
            Encoding::Asymmetric => 2,
        }
    }

    fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            0 => Encoding::None,
            1 => Encoding::Compressed,
            2 => Encoding::Asymmetric,
            _ => return None,
        })
    }
}

pub const HEADER_VERSION: i32 = 1;

/// A parsed, verified envelope: header fields plus the (already
/// decoded, already verified) body bytes.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header_version: i32,
    pub header_id: HeaderId,
    pub payload_version: u32,
    pub encoding: Encoding,
    pub baggage: Vec<u8>,
    pub body: Vec<u8>,
}

impl Envelope {
    #[must_use]
    pub fn new(header_id: HeaderId, payload_version: u32, baggage: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            header_version: HEADER_VERSION,
            header_id,
            payload_version,
            encoding: Encoding::None,
            baggage,
            body,
        }
    }

    /// Frame the envelope as plaintext (no encoding, no signature).
    #[must_use]
    pub fn write_plain(&self) -> Vec<u8> {
        self.write_with(Encoding::None, &self.body)
    }

    /// Frame the envelope with the body signed by `crypto` (spec.md
    /// §4.11's `ASYMMETRIC` encoding).
    pub fn write_signed(&self, crypto: &dyn CryptoCollaborator) -> Vec<u8> {
        let signature = crypto.sign(&self.body);
        let mut body_and_sig = self.body.clone();
        body_and_sig.extend_from_slice(&(signature.len() as u32).to_le_bytes());
        body_and_sig.extend_from_slice(&signature);
        self.write_with(Encoding::Asymmetric, &body_and_sig)
    }

    fn write_with(&self, encoding: Encoding, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.baggage.len() + body.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&self.header_version.to_le_bytes());
        out.extend_from_slice(&self.header_id.to_u32().to_le_bytes());
        out.extend_from_slice(&self.payload_version.to_le_bytes());
        out.extend_from_slice(&encoding.to_i16().to_le_bytes());
        out.extend_from_slice(&(self.baggage.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.baggage);
        out.extend_from_slice(body);
        out
    }

    /// Parse and verify `buf`. Under `ASYMMETRIC` encoding, verifies the
    /// trailing signature with `crypto` before returning the body
    /// (spec.md §8 invariant 8: a tampered body fails verification).
    pub fn read(buf: &[u8], expected_version: u32, crypto: &dyn CryptoCollaborator) -> Result<Self> {
        let bad = |msg: &str| FimError::Serializer(SerializerError::InputStreamFormat(msg.to_string()));

        let (magic_b, rest) = take(buf, 4).ok_or_else(|| bad("truncated magic"))?;
        let magic = u32::from_le_bytes(magic_b.try_into().map_err(|_| bad("bad magic"))?);
        if magic != MAGIC {
            return Err(bad("bad magic"));
        }
        let (hv_b, rest) = take(rest, 4).ok_or_else(|| bad("truncated header_version"))?;
        let header_version = i32::from_le_bytes(hv_b.try_into().map_err(|_| bad("bad header_version"))?);
        let (hid_b, rest) = take(rest, 4).ok_or_else(|| bad("truncated header_id"))?;
        let header_id = HeaderId::from_u32(u32::from_le_bytes(hid_b.try_into().map_err(|_| bad("bad header_id"))?))
            .ok_or_else(|| bad("unknown header_id"))?;
        let (pv_b, rest) = take(rest, 4).ok_or_else(|| bad("truncated payload_version"))?;
        let payload_version = u32::from_le_bytes(pv_b.try_into().map_err(|_| bad("bad payload_version"))?);
        let (enc_b, rest) = take(rest, 2).ok_or_else(|| bad("truncated encoding"))?;
        let encoding =
            Encoding::from_i16(i16::from_le_bytes(enc_b.try_into().map_err(|_| bad("bad encoding"))?))
                .ok_or_else(|| bad("unknown encoding"))?;
        let (blen_b, rest) = take(rest, 4).ok_or_else(|| bad("truncated baggage len"))?;
        let blen = i32::from_le_bytes(blen_b.try_into().map_err(|_| bad("bad baggage len"))?).max(0) as usize;
        let (baggage, rest) = take(rest, blen).ok_or_else(|| bad("truncated baggage"))?;

        if payload_version != expected_version {
            return Err(FimError::Serializer(SerializerError::VersionMismatch {
                found: payload_version as i32,
                expected: expected_version as i32,
            }));
        }

        let body = match encoding {
            Encoding::None | Encoding::Compressed => rest.to_vec(),
            Encoding::Asymmetric => {
                if rest.len() < 4 {
                    return Err(bad("truncated signature length"));
                }
                let (body, sig_len_and_sig) = rest.split_at(rest.len() - 4);
                let sig_len = u32::from_le_bytes(
                    sig_len_and_sig
                        .try_into()
                        .map_err(|_| bad("bad signature length"))?,
                ) as usize;
                if body.len() < sig_len {
                    return Err(bad("truncated signature"));
                }
                let (body, signature) = body.split_at(body.len() - sig_len);
                if !crypto.verify(body, signature) {
                    return Err(FimError::Database(DatabaseError::SignatureVerificationFailed));
                }
                body.to_vec()
            }
        };

        Ok(Self {
            header_version,
            header_id,
            payload_version,
            encoding,
            baggage: baggage.to_vec(),
            body,
        })
    }
}

fn take(buf: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if buf.len() < n {
        None
    } else {
        Some(buf.split_at(n))
    }
}
