//! Component LUXI: local UNIX stream socket transport (SPEC_FULL.md
//! §4.10), grounded on `lib/luxi.py` and, for the terminator-byte framing
//! idiom, `networking/protocol/codec.rs` (there length-delimited, here
//! terminator-delimited since that's the real protocol).

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// End-of-message marker. Must never appear inside a payload; enforced
/// by `encode` (SPEC_FULL.md §4.10).
pub const EOM: u8 = 0x03;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RW_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LuxiRequest {
    pub method: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LuxiReply {
    pub success: bool,
    pub result: serde_json::Value,
}

pub fn encode(msg: &impl Serialize) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(msg).map_err(|e| DbError::JobQueueError(e.to_string()))?;
    if bytes.contains(&EOM) {
        return Err(DbError::JobQueueError("payload contains the EOM terminator byte".into()));
    }
    bytes.push(EOM);
    Ok(bytes)
}

pub async fn write_message(stream: &mut UnixStream, msg: &impl Serialize) -> Result<()> {
    let bytes = encode(msg)?;
    tokio::time::timeout(DEFAULT_RW_TIMEOUT, stream.write_all(&bytes))
        .await
        .map_err(|_| DbError::Timeout("luxi write".into()))?
        .map_err(DbError::Io)
}

/// Reads until EOM or the receive bound (2x the r/w timeout, per
/// SPEC_FULL.md §4.10).
pub async fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let bound = DEFAULT_RW_TIMEOUT * 2;
    tokio::time::timeout(bound, read_until_eom(stream))
        .await
        .map_err(|_| DbError::Timeout("luxi read".into()))?
}

async fn read_until_eom<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.map_err(DbError::Io)?;
        if n == 0 {
            return Err(DbError::JobQueueError("connection closed before EOM".into()));
        }
        if byte[0] == EOM {
            break;
        }
        buf.push(byte[0]);
    }
    serde_json::from_slice(&buf).map_err(|e| DbError::JobQueueError(format!("malformed luxi message: {e}")))
}

pub async fn connect(path: &str) -> Result<UnixStream> {
    tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, UnixStream::connect(path))
        .await
        .map_err(|_| DbError::Timeout("luxi connect".into()))?
        .map_err(DbError::Io)
}

pub async fn bind(path: &str) -> Result<UnixListener> {
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path).map_err(DbError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rejects_payload_with_eom_byte() {
        let msg = serde_json::json!({ "x": "\u{0003}" });
        assert!(encode(&msg).is_err());
    }

    #[tokio::test]
    async fn request_reply_roundtrip_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("luxi.sock");
        let path_str = path.to_str().unwrap().to_string();

        let listener = bind(&path_str).await.unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let req: LuxiRequest = read_message(&mut stream).await.unwrap();
            assert_eq!(req.method, "SubmitJob");
            write_message(&mut stream, &LuxiReply { success: true, result: serde_json::json!(42) })
                .await
                .unwrap();
        });

        let mut client = connect(&path_str).await.unwrap();
        write_message(&mut client, &LuxiRequest { method: "SubmitJob".into(), args: serde_json::json!([]) })
            .await
            .unwrap();
        let reply: LuxiReply = read_message(&mut client).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.result, serde_json::json!(42));

        server.await.unwrap();
    }
}
