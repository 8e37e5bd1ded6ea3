//! Cluster bootstrap (SPEC_FULL.md §10.5), grounded on
//! `lib/bootstrap.py`'s `InitCluster`/`_InitGanetiServerSetup`/
//! `GenerateClusterCrypto`. Only the in-memory/on-disk state this
//! control plane owns is built here — no SSH key distribution, no
//! network device probing; those stay outside scope.

use crate::config::entities::{Cluster, ConfigData, Node};
use crate::error::{DbError, PrereqCode, Result};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use base64::Engine;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::RsaPrivateKey;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

static MAC_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{2}:[0-9a-f]{2}:[0-9a-f]{2}$").unwrap());

/// HMAC key shared by confd server and clients (SPEC_FULL.md §4.7),
/// generated fresh on every bootstrap the way `GenerateHmacKey` writes
/// a new random key file.
pub fn generate_hmac_key() -> Vec<u8> {
    let mut key = vec![0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Master node's RSA host keypair (`rsahostkeypub` on `Cluster`).
/// Returns `(private_key, base64-encoded DER public key)`.
pub fn generate_host_keypair() -> Result<(RsaPrivateKey, String)> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| DbError::SignatureError(format!("rsa keygen failed: {e}")))?;
    let public_der = private
        .to_public_key()
        .to_pkcs1_der()
        .map_err(|e| DbError::SignatureError(format!("rsa pubkey encode failed: {e}")))?
        .into_vec();
    let public = base64::engine::general_purpose::STANDARD.encode(public_der);
    Ok((private, public))
}

pub struct InitClusterParams {
    pub cluster_name: String,
    pub mac_prefix: String,
    pub master_name: String,
    pub master_ip: String,
    pub candidate_pool_size: u32,
}

/// Builds the initial single-node `ConfigData` for a freshly bootstrapped
/// cluster (SPEC_FULL.md §4.1/§10.5). Mirrors `InitCluster`'s validation
/// and the object it assembles, minus anything this control plane
/// doesn't model (storage dirs, network device checks, SSH setup).
pub fn init_cluster(params: InitClusterParams) -> Result<ConfigData> {
    if !MAC_PREFIX_RE.is_match(&params.mac_prefix) {
        return Err(DbError::prereq(
            PrereqCode::Inval,
            format!("Invalid mac prefix given '{}'", params.mac_prefix),
        ));
    }
    if params.candidate_pool_size == 0 {
        return Err(DbError::prereq(
            PrereqCode::Inval,
            "candidate pool size must be positive",
        ));
    }

    let (_private, public_b64) = generate_host_keypair()?;
    let master_uuid = Uuid::new_v4();

    let cluster = Cluster {
        cluster_name: params.cluster_name.clone(),
        master_node: master_uuid,
        candidate_pool_size: params.candidate_pool_size,
        enabled_hypervisors: BTreeSet::new(),
        hvparams: BTreeMap::new(),
        beparams: BTreeMap::new(),
        nicparams: BTreeMap::new(),
        uuid: Uuid::new_v4(),
        ctime: 0.0,
        mtime: 0.0,
        serial_no: 1,
        tcp_udp_port_pool: BTreeSet::new(),
        mac_prefix: params.mac_prefix,
        rsa_host_pubkey: public_b64,
    };

    let master_node = Node {
        uuid: master_uuid,
        name: params.master_name,
        primary_ip: params.master_ip.clone(),
        secondary_ip: params.master_ip,
        master_candidate: true,
        offline: false,
        drained: false,
        master_capable: true,
        vm_capable: true,
        group: Uuid::nil(),
        ndparams: BTreeMap::new(),
        tags: BTreeSet::new(),
        serial_no: 1,
    };

    let mut nodes = BTreeMap::new();
    nodes.insert(master_uuid, master_node);

    Ok(ConfigData {
        version: 1,
        cluster: Some(cluster),
        nodes,
        instances: BTreeMap::new(),
        node_groups: BTreeMap::new(),
        networks: BTreeMap::new(),
        serial_no: 1,
        ctime: 0.0,
        mtime: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_mac_prefix() {
        let err = init_cluster(InitClusterParams {
            cluster_name: "test.example".into(),
            mac_prefix: "zz:zz:zz".into(),
            master_name: "master.example".into(),
            master_ip: "192.0.2.1".into(),
            candidate_pool_size: 3,
        })
        .unwrap_err();
        assert!(matches!(err, DbError::OpPrereqError(PrereqCode::Inval, _)));
    }

    #[test]
    fn builds_single_master_node_cluster() {
        let cfg = init_cluster(InitClusterParams {
            cluster_name: "test.example".into(),
            mac_prefix: "aa:00:00".into(),
            master_name: "master.example".into(),
            master_ip: "192.0.2.1".into(),
            candidate_pool_size: 3,
        })
        .unwrap();
        assert_eq!(cfg.nodes.len(), 1);
        let cluster = cfg.cluster.unwrap();
        assert_eq!(cluster.cluster_name, "test.example");
        assert!(!cluster.rsa_host_pubkey.is_empty());
    }

    #[test]
    fn hmac_keys_differ_between_calls() {
        assert_ne!(generate_hmac_key(), generate_hmac_key());
    }
}
