//! Component F: DRBD state-machine parser (SPEC_FULL.md §4.6).

use crate::error::{DbError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrbdVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl DrbdVersion {
    pub fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self { major, minor, revision }
    }

    /// Parses `version: 8.3.7 (api:88/proto:86-91)`.
    pub fn parse(line: &str) -> Result<Self> {
        let re = Regex::new(r"version:\s*(\d+)\.(\d+)\.(\d+)").expect("static regex");
        let caps = re
            .captures(line)
            .ok_or_else(|| DbError::BlockDeviceError(format!("unparseable DRBD version line: {line}")))?;
        let get = |i: usize| caps[i].parse::<u32>().unwrap();
        Ok(Self::new(get(1), get(2), get(3)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Primary,
    Secondary,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinorStatus {
    pub minor: u32,
    pub connected: bool,
    pub primary: bool,
    pub peer_role: PeerRole,
    pub disk_uptodate: bool,
    pub diskless: bool,
    pub standalone: bool,
    pub is_in_resync: bool,
    pub sync_percent: Option<f64>,
}

/// Parses one `/proc/drbd`-style per-minor status line, e.g.:
/// ` 0: cs:Connected ro:Primary/Secondary ds:UpToDate/UpToDate`
pub fn parse_minor_status(line: &str) -> Option<MinorStatus> {
    let minor_re = Regex::new(r"^\s*(\d+):").ok()?;
    let minor: u32 = minor_re.captures(line)?[1].parse().ok()?;

    let connected = line.contains("cs:Connected");
    let standalone = line.contains("cs:StandAlone");
    let diskless = line.contains("ds:Diskless");
    let primary = line.contains("ro:Primary/");
    let disk_uptodate = line.contains("UpToDate/") || line.ends_with("UpToDate");
    let is_in_resync = line.contains("cs:SyncSource") || line.contains("cs:SyncTarget");

    let peer_role = if line.contains("/Primary") {
        PeerRole::Primary
    } else if line.contains("/Secondary") {
        PeerRole::Secondary
    } else {
        PeerRole::Unknown
    };

    let sync_re = Regex::new(r"sync'ed:\s*([\d.]+)%").ok()?;
    let sync_percent = sync_re.captures(line).and_then(|c| c[1].parse::<f64>().ok());

    Some(MinorStatus {
        minor,
        connected,
        primary,
        peer_role,
        disk_uptodate,
        diskless,
        standalone,
        is_in_resync,
        sync_percent,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierFlags {
    pub disk_barrier: bool,
    pub disk_drain: bool,
    pub disk_flushes: bool,
    pub md_flushes: bool,
}

/// Version-gated barrier-flag compatibility table (SPEC_FULL.md §4.6).
/// `requested` is the subset of `{b,f,d,n}` the caller asked to disable;
/// returns the flags actually allowed, or `BlockDeviceError` if the
/// requested combination exceeds what the version supports.
pub fn compute_disk_barrier_args(version: DrbdVersion, requested: &str) -> Result<BarrierFlags> {
    let wants = |c: char| requested.contains(c);

    let allowed: BarrierFlags = if version < DrbdVersion::new(8, 0, 12) {
        BarrierFlags { disk_barrier: false, disk_drain: false, disk_flushes: false, md_flushes: false }
    } else if version == DrbdVersion::new(8, 0, 12) {
        BarrierFlags { disk_barrier: false, disk_drain: false, disk_flushes: false, md_flushes: wants('n') }
    } else if version < DrbdVersion::new(8, 3, 0) {
        BarrierFlags { disk_barrier: false, disk_drain: wants('d'), disk_flushes: wants('f'), md_flushes: wants('n') }
    } else {
        BarrierFlags {
            disk_barrier: wants('b'),
            disk_drain: wants('d'),
            disk_flushes: wants('f'),
            md_flushes: wants('n'),
        }
    };

    if (wants('b') && !allowed.disk_barrier)
        || (wants('d') && !allowed.disk_drain)
        || (wants('f') && !allowed.disk_flushes)
    {
        return Err(DbError::BlockDeviceError(format!(
            "DRBD {}.{}.{} does not support requested barrier flags {requested:?}",
            version.major, version.minor, version.revision
        )));
    }

    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses() {
        let v = DrbdVersion::parse("version: 8.3.7 (api:88/proto:86-91)").unwrap();
        assert_eq!(v, DrbdVersion::new(8, 3, 7));
    }

    #[test]
    fn old_version_rejects_all_flags() {
        let v = DrbdVersion::new(7, 9, 9);
        assert!(compute_disk_barrier_args(v, "b").is_err());
        let ok = compute_disk_barrier_args(v, "").unwrap();
        assert!(!ok.disk_barrier && !ok.disk_drain && !ok.disk_flushes);
    }

    #[test]
    fn modern_version_allows_full_set() {
        let v = DrbdVersion::new(8, 3, 11);
        let flags = compute_disk_barrier_args(v, "bdfn").unwrap();
        assert!(flags.disk_barrier && flags.disk_drain && flags.disk_flushes && flags.md_flushes);
    }

    #[test]
    fn mid_version_rejects_barrier_but_allows_drain_flush() {
        let v = DrbdVersion::new(8, 2, 6);
        assert!(compute_disk_barrier_args(v, "b").is_err());
        let flags = compute_disk_barrier_args(v, "df").unwrap();
        assert!(flags.disk_drain && flags.disk_flushes && !flags.disk_barrier);
    }

    #[test]
    fn parses_minor_status_line() {
        let line = " 0: cs:Connected ro:Primary/Secondary ds:UpToDate/UpToDate";
        let status = parse_minor_status(line).unwrap();
        assert_eq!(status.minor, 0);
        assert!(status.connected);
        assert!(status.primary);
        assert_eq!(status.peer_role, PeerRole::Secondary);
    }
}
