//! Confd wire framing (SPEC_FULL.md §4.7): 4-byte magic + HMAC-signed
//! JSON body, grounded on `lib/confd/client.py`'s `_PackMagic`/
//! `_PackRequest`/`_UnpackReply`.

use crate::error::{DbError, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAGIC: &[u8; 4] = b"plj0";
pub const MAX_DATAGRAM: usize = 60 * 1024;
/// Clock-skew rejection bound (SPEC_FULL.md §4.7): requests older than
/// 2x this are rejected.
pub const NODE_MAX_CLOCK_SKEW_SECS: i64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Ping,
    NodeRoleByname,
    NodePipByInstanceIp,
    ClusterMaster,
    NodePipList,
    McPipList,
    InstancesIpsList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfdRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub salt: String,
    #[serde(default)]
    pub query: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfdReply {
    pub salt: String,
    pub status: u8,
    pub serial: u64,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    msg: serde_json::Value,
    tstamp: i64,
    hmac: String,
}

fn sign(key: &[u8], body: &[u8], tstamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(body);
    mac.update(tstamp.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Packs a signed, magic-prefixed datagram for `msg` (a request or a
/// reply), both sharing the same envelope shape.
pub fn pack(key: &[u8], msg: &impl Serialize) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg).map_err(|e| DbError::SignatureError(e.to_string()))?;
    let tstamp = now_secs();
    let hmac = sign(key, &body, tstamp);
    let envelope = Envelope { msg: serde_json::from_slice(&body).unwrap(), tstamp, hmac };
    let envelope_bytes =
        serde_json::to_vec(&envelope).map_err(|e| DbError::SignatureError(e.to_string()))?;

    if envelope_bytes.len() + MAGIC.len() > MAX_DATAGRAM {
        return Err(DbError::SignatureError("confd message exceeds 60KiB datagram limit".into()));
    }

    let mut out = Vec::with_capacity(MAGIC.len() + envelope_bytes.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&envelope_bytes);
    Ok(out)
}

/// Verifies magic + HMAC + clock skew, and deserializes the inner
/// message. Any failure is reported distinctly so the caller can
/// silently drop per SPEC_FULL.md §4.7 ("unknown/invalid -> drop").
pub fn unpack<T: for<'de> Deserialize<'de>>(key: &[u8], datagram: &[u8]) -> Result<T> {
    if datagram.len() < MAGIC.len() || &datagram[..MAGIC.len()] != MAGIC {
        return Err(DbError::ConfdMagicError);
    }
    let envelope: Envelope = serde_json::from_slice(&datagram[MAGIC.len()..])
        .map_err(|e| DbError::SignatureError(format!("malformed envelope: {e}")))?;

    let body = serde_json::to_vec(&envelope.msg).map_err(|e| DbError::SignatureError(e.to_string()))?;
    let expected = sign(key, &body, envelope.tstamp);
    if expected != envelope.hmac {
        return Err(DbError::SignatureError("HMAC verification failed".into()));
    }

    let skew = (now_secs() - envelope.tstamp).abs();
    if skew > 2 * NODE_MAX_CLOCK_SKEW_SECS {
        return Err(DbError::SignatureError(format!("confd message clock skew too large: {skew}s")));
    }

    serde_json::from_value(envelope.msg).map_err(|e| DbError::SignatureError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let key = b"secret-hmac-key";
        let req = ConfdRequest {
            kind: RequestKind::Ping,
            salt: "abc123".into(),
            query: serde_json::Value::Null,
        };
        let datagram = pack(key, &req).unwrap();
        let decoded: ConfdRequest = unpack(key, &datagram).unwrap();
        assert_eq!(decoded.salt, "abc123");
    }

    #[test]
    fn wrong_key_fails_verification() {
        let req = ConfdRequest { kind: RequestKind::Ping, salt: "s".into(), query: serde_json::Value::Null };
        let datagram = pack(b"key-a", &req).unwrap();
        let decoded: Result<ConfdRequest> = unpack(b"key-b", &datagram);
        assert!(decoded.is_err());
    }

    #[test]
    fn bad_magic_rejected() {
        let decoded: Result<ConfdRequest> = unpack(b"k", b"xxxxnotarealdatagram");
        assert!(matches!(decoded, Err(DbError::ConfdMagicError)));
    }
}
