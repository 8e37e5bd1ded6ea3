//! Cluster-wide `known_hosts` bookkeeping (SPEC_FULL.md §10.5), grounded
//! on `lib/ssh.py`'s `WriteKnownHostsFile`/`AddAuthorizedKey`. No SSH
//! client or handshake lives here — only the file format the real
//! daemon maintains so nodes can verify each other.

use crate::config::entities::Cluster;
use crate::error::{DbError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Renders the `known_hosts` line set for a cluster: one `ssh-rsa`
/// entry keyed by cluster name, matching `WriteKnownHostsFile`'s
/// format (`<cluster_name> ssh-rsa <key>`).
pub fn known_hosts_contents(cluster: &Cluster) -> String {
    if cluster.rsa_host_pubkey.is_empty() {
        return String::new();
    }
    format!("{} ssh-rsa {}\n", cluster.cluster_name, cluster.rsa_host_pubkey)
}

/// Writes the known_hosts file atomically (temp + rename), the same
/// discipline `ConfigStore::persist` uses for the config file.
pub fn write_known_hosts_file(cluster: &Cluster, path: &Path) -> Result<()> {
    let data = known_hosts_contents(cluster);
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path).map_err(DbError::Io)?;
        file.write_all(data.as_bytes()).map_err(DbError::Io)?;
        file.sync_all().map_err(DbError::Io)?;
    }
    fs::rename(&tmp_path, path).map_err(DbError::Io)?;
    Ok(())
}

/// One line of an authorized_keys file: `<key-type> <key> <comment>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub key_type: String,
    pub key: String,
    pub comment: String,
}

fn parse_authorized_keys(contents: &str) -> Vec<AuthorizedKey> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut parts = line.splitn(3, ' ');
            let (key_type, key, comment) = (parts.next()?, parts.next()?, parts.next().unwrap_or(""));
            Some(AuthorizedKey {
                key_type: key_type.to_string(),
                key: key.to_string(),
                comment: comment.to_string(),
            })
        })
        .collect()
}

/// Idempotently appends a key to an authorized_keys file, grounded on
/// `AddAuthorizedKey`'s dedup-by-key-material behaviour.
pub fn add_authorized_key(path: &Path, entry: &AuthorizedKey) -> Result<()> {
    let existing = fs::read_to_string(path).unwrap_or_default();
    let mut keys = parse_authorized_keys(&existing);
    if keys.iter().any(|k| k.key == entry.key) {
        return Ok(());
    }
    keys.push(entry.clone());
    persist_authorized_keys(path, &keys)
}

/// Removes any line whose key material matches, grounded on
/// `RemoveAuthorizedKey`.
pub fn remove_authorized_key(path: &Path, key: &str) -> Result<()> {
    let existing = fs::read_to_string(path).unwrap_or_default();
    let keys: Vec<_> = parse_authorized_keys(&existing)
        .into_iter()
        .filter(|k| k.key != key)
        .collect();
    persist_authorized_keys(path, &keys)
}

fn persist_authorized_keys(path: &Path, keys: &[AuthorizedKey]) -> Result<()> {
    let mut data = String::new();
    for k in keys {
        if k.comment.is_empty() {
            data.push_str(&format!("{} {}\n", k.key_type, k.key));
        } else {
            data.push_str(&format!("{} {} {}\n", k.key_type, k.key, k.comment));
        }
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data).map_err(DbError::Io)?;
    fs::rename(&tmp_path, path).map_err(DbError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::entities::Cluster;
    use std::collections::{BTreeMap, BTreeSet};
    use uuid::Uuid;

    fn test_cluster() -> Cluster {
        Cluster {
            cluster_name: "test.example".into(),
            master_node: Uuid::new_v4(),
            candidate_pool_size: 3,
            enabled_hypervisors: BTreeSet::new(),
            hvparams: BTreeMap::new(),
            beparams: BTreeMap::new(),
            nicparams: BTreeMap::new(),
            uuid: Uuid::new_v4(),
            ctime: 0.0,
            mtime: 0.0,
            serial_no: 1,
            tcp_udp_port_pool: BTreeSet::new(),
            mac_prefix: "aa:00:00".into(),
            rsa_host_pubkey: "AAAAB3NzaC1yc2E=".into(),
        }
    }

    #[test]
    fn known_hosts_line_matches_cluster_name_and_key() {
        let contents = known_hosts_contents(&test_cluster());
        assert_eq!(contents, "test.example ssh-rsa AAAAB3NzaC1yc2E=\n");
    }

    #[test]
    fn add_authorized_key_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_keys");
        let entry = AuthorizedKey { key_type: "ssh-rsa".into(), key: "AAAA".into(), comment: "root@master".into() };
        add_authorized_key(&path, &entry).unwrap();
        add_authorized_key(&path, &entry).unwrap();
        let keys = parse_authorized_keys(&fs::read_to_string(&path).unwrap());
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn remove_authorized_key_drops_matching_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_keys");
        let entry = AuthorizedKey { key_type: "ssh-rsa".into(), key: "AAAA".into(), comment: String::new() };
        add_authorized_key(&path, &entry).unwrap();
        remove_authorized_key(&path, "AAAA").unwrap();
        let keys = parse_authorized_keys(&fs::read_to_string(&path).unwrap());
        assert!(keys.is_empty());
    }
}
