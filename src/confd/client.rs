//! Confd UDP client (SPEC_FULL.md §4.7), grounded on `lib/confd/client.py`'s
//! `ConfdAsyncUDPClient`. The original's `asyncore`-based client becomes a
//! dedicated tokio task reading the socket in a loop and placing parsed
//! messages onto a channel consumed by the filter and the caller
//! (SPEC_FULL.md §9 redesign flag).

use crate::confd::filter::ConfdFilterCallback;
use crate::confd::protocol::{self, ConfdReply, ConfdRequest, MAX_DATAGRAM};
use crate::error::{DbError, Result};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

pub const DEFAULT_COVERAGE: usize = 6;
const REQUEST_EXPIRY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum ConfdUpcall {
    Reply(ConfdReply),
    Expire { salt: String },
}

struct PendingRequest {
    deadline: Instant,
    request: ConfdRequest,
}

pub struct ConfdClient {
    socket: Arc<UdpSocket>,
    peers: Mutex<Vec<SocketAddr>>,
    hmac_key: Vec<u8>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    filter: ConfdFilterCallback,
    upcalls: mpsc::UnboundedSender<ConfdUpcall>,
}

impl ConfdClient {
    pub async fn bind(
        local_addr: SocketAddr,
        peers: Vec<SocketAddr>,
        hmac_key: Vec<u8>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ConfdUpcall>)> {
        let socket = UdpSocket::bind(local_addr).await.map_err(DbError::Io)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            socket: Arc::new(socket),
            peers: Mutex::new(peers),
            hmac_key,
            pending: Mutex::new(HashMap::new()),
            filter: ConfdFilterCallback::new(),
            upcalls: tx,
        });
        Ok((client, rx))
    }

    /// Shuffles peers and fans a request out to `coverage` of them
    /// (default 6, capped at peer count). Duplicate salts are rejected.
    pub async fn send_request(self: &Arc<Self>, request: ConfdRequest, coverage: usize) -> Result<()> {
        {
            let pending = self.pending.lock().await;
            if pending.contains_key(&request.salt) {
                return Err(DbError::GanetiLockError(format!(
                    "duplicate confd request salt {}",
                    request.salt
                )));
            }
        }

        let mut peers = self.peers.lock().await.clone();
        peers.shuffle(&mut rand::rng());
        let n = coverage.min(peers.len());
        let targets = &peers[..n];

        let datagram = protocol::pack(&self.hmac_key, &request)?;
        if datagram.len() > MAX_DATAGRAM {
            return Err(DbError::SignatureError("request exceeds datagram cap".into()));
        }

        for peer in targets {
            if let Err(e) = self.socket.send_to(&datagram, peer).await {
                warn!(%peer, error = %e, "confd send failed");
            }
        }

        self.pending.lock().await.insert(
            request.salt.clone(),
            PendingRequest { deadline: Instant::now() + REQUEST_EXPIRY, request },
        );
        Ok(())
    }

    /// Run the receive loop: reads datagrams, verifies+decodes them,
    /// runs them through the filter, and emits REPLY upcalls. Call
    /// `expire_requests` periodically (or interleave via `tokio::select!`)
    /// to emit EXPIRE upcalls for timed-out salts.
    pub async fn recv_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "confd recv error");
                    continue;
                }
            };
            self.handle_datagram(&buf[..len], from).await;
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        let reply: ConfdReply = match protocol::unpack(&self.hmac_key, datagram) {
            Ok(r) => r,
            Err(e) => {
                debug!(%from, error = %e, "dropping invalid confd datagram");
                return;
            }
        };

        let had_pending = {
            let mut pending = self.pending.lock().await;
            pending.remove(&reply.salt).is_some()
        };
        if !had_pending {
            debug!(salt = %reply.salt, "reply for unknown/expired salt, dropping");
            return;
        }

        if self.filter.accept(&reply) {
            let _ = self.upcalls.send(ConfdUpcall::Reply(reply));
        }
    }

    /// Synthesizes EXPIRE upcalls for any request past its deadline.
    pub async fn expire_requests(&self) {
        let now = Instant::now();
        let mut pending = self.pending.lock().await;
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(salt, _)| salt.clone())
            .collect();
        for salt in expired {
            pending.remove(&salt);
            self.filter.forget(&salt);
            let _ = self.upcalls.send(ConfdUpcall::Expire { salt });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confd::protocol::RequestKind;

    #[tokio::test]
    async fn duplicate_salt_is_rejected() {
        let (client, _rx) =
            ConfdClient::bind("127.0.0.1:0".parse().unwrap(), vec!["127.0.0.1:1".parse().unwrap()], b"k".to_vec())
                .await
                .unwrap();
        let req = ConfdRequest { kind: RequestKind::Ping, salt: "dup".into(), query: serde_json::Value::Null };
        client.send_request(req.clone(), DEFAULT_COVERAGE).await.unwrap();
        let err = client.send_request(req, DEFAULT_COVERAGE).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn expiry_emits_upcall() {
        let (client, mut rx) =
            ConfdClient::bind("127.0.0.1:0".parse().unwrap(), vec!["127.0.0.1:1".parse().unwrap()], b"k".to_vec())
                .await
                .unwrap();
        let req = ConfdRequest { kind: RequestKind::Ping, salt: "exp".into(), query: serde_json::Value::Null };
        client.send_request(req, DEFAULT_COVERAGE).await.unwrap();

        {
            let mut pending = client.pending.lock().await;
            pending.get_mut("exp").unwrap().deadline = Instant::now();
        }
        client.expire_requests().await;

        let upcall = rx.recv().await.unwrap();
        assert!(matches!(upcall, ConfdUpcall::Expire { salt } if salt == "exp"));
    }
}
