//! Component E: bitmap-backed IPv4 address pool (SPEC_FULL.md §4.5),
//! a direct generalization of `lib/network.py`'s `AddressPool`.

use crate::config::entities::Network;
use crate::error::{DbError, Result};
use std::net::Ipv4Addr;

pub const IPV4_NETWORK_MIN_SIZE: u32 = 30;
pub const IPV4_NETWORK_MAX_SIZE: u32 = 16;

fn num_hosts(prefixlen: u32) -> u64 {
    1u64 << (32 - prefixlen)
}

/// A simple fixed-length bitset over `"0"`/`"1"` strings, standing in
/// for Python's `bitarray` so the on-disk representation
/// (`Network::reservations`) stays a plain bitstring.
#[derive(Debug, Clone)]
struct Bitset {
    bits: Vec<bool>,
}

impl Bitset {
    fn zeroed(len: usize) -> Self {
        Self { bits: vec![false; len] }
    }

    fn from_bitstring(s: &str, len: usize) -> Self {
        if s.is_empty() {
            return Self::zeroed(len);
        }
        Self { bits: s.bytes().map(|b| b == b'1').collect() }
    }

    fn to_bitstring(&self) -> String {
        self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
    }

    fn count_true(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    fn all_true(&self) -> bool {
        self.bits.iter().all(|&b| b)
    }

    fn or_with(&self, other: &Bitset) -> Bitset {
        Bitset { bits: self.bits.iter().zip(&other.bits).map(|(a, b)| *a || *b).collect() }
    }

    fn first_free(&self) -> Option<usize> {
        self.bits.iter().position(|&b| !b)
    }
}

pub struct AddressPool {
    prefixlen: u32,
    base: Ipv4Addr,
    gateway: Option<Ipv4Addr>,
    reservations: Bitset,
    ext_reservations: Bitset,
}

impl AddressPool {
    pub fn from_network(net: &Network) -> Result<Self> {
        let (base, prefixlen) = parse_cidr(&net.network)?;
        let hosts = num_hosts(prefixlen);

        if prefixlen < IPV4_NETWORK_MAX_SIZE {
            return Err(DbError::AddressPoolError(format!(
                "a big network with {hosts} host(s) is currently not supported; \
                 please specify at most a /{IPV4_NETWORK_MAX_SIZE} network"
            )));
        }
        if prefixlen > IPV4_NETWORK_MIN_SIZE {
            return Err(DbError::AddressPoolError(format!(
                "a network with only {hosts} host(s) is too small; \
                 please specify at least a /{IPV4_NETWORK_MIN_SIZE} network"
            )));
        }

        let gateway = net.gateway.as_deref().map(str::parse).transpose().map_err(|_| {
            DbError::AddressPoolError(format!("invalid gateway address: {:?}", net.gateway))
        })?;

        let len = hosts as usize;
        let reservations = Bitset::from_bitstring(&net.reservations, len);
        let ext_reservations = Bitset::from_bitstring(&net.ext_reservations, len);

        if reservations.bits.len() != len || ext_reservations.bits.len() != len {
            return Err(DbError::AddressPoolError(
                "reservation bitmap length mismatch".into(),
            ));
        }

        Ok(Self { prefixlen, base, gateway, reservations, ext_reservations })
    }

    pub fn write_back(&self, net: &mut Network) {
        net.reservations = self.reservations.to_bitstring();
        net.ext_reservations = self.ext_reservations.to_bitstring();
    }

    fn size(&self) -> u64 {
        num_hosts(self.prefixlen)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.addr_index(addr).is_ok()
    }

    fn addr_index(&self, addr: Ipv4Addr) -> Result<usize> {
        let base_u32 = u32::from(self.base);
        let addr_u32 = u32::from(addr);
        let size = self.size() as u32;
        if addr_u32 < base_u32 || addr_u32 >= base_u32 + size {
            return Err(DbError::AddressPoolError(format!(
                "{}/{} does not contain {}",
                self.base, self.prefixlen, addr
            )));
        }
        Ok((addr_u32 - base_u32) as usize)
    }

    fn union(&self) -> Bitset {
        self.reservations.or_with(&self.ext_reservations)
    }

    pub fn is_reserved(&self, addr: Ipv4Addr, external: bool) -> Result<bool> {
        let idx = self.addr_index(addr)?;
        Ok(if external { self.ext_reservations.bits[idx] } else { self.reservations.bits[idx] })
    }

    pub fn reserve(&mut self, addr: Ipv4Addr, external: bool) -> Result<()> {
        if self.is_reserved(addr, external)? {
            let msg = if external {
                format!("IP {addr} is already externally reserved")
            } else {
                format!("IP {addr} is already used by an instance")
            };
            return Err(DbError::AddressPoolError(msg));
        }
        let idx = self.addr_index(addr)?;
        if external {
            self.ext_reservations.bits[idx] = true;
        } else {
            self.reservations.bits[idx] = true;
        }
        Ok(())
    }

    pub fn release(&mut self, addr: Ipv4Addr, external: bool) -> Result<()> {
        if !self.is_reserved(addr, external)? {
            let msg = if external {
                format!("IP {addr} is not externally reserved")
            } else {
                format!("IP {addr} is not used by an instance")
            };
            return Err(DbError::AddressPoolError(msg));
        }
        let idx = self.addr_index(addr)?;
        if external {
            self.ext_reservations.bits[idx] = false;
        } else {
            self.reservations.bits[idx] = false;
        }
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.union().all_true()
    }

    pub fn get_free_count(&self) -> u64 {
        self.size() - self.union().count_true() as u64
    }

    pub fn get_reserved_count(&self) -> u64 {
        self.union().count_true() as u64
    }

    pub fn get_map(&self) -> String {
        self.union().to_bitstring().chars().map(|c| if c == '1' { 'X' } else { '.' }).collect()
    }

    /// First free address in address order (O(1) index scan), reserves
    /// it internally, and returns it — matches `GetFreeAddress`.
    pub fn get_free_address(&mut self) -> Result<Ipv4Addr> {
        if self.is_full() {
            return Err(DbError::AddressPoolError(format!("{}/{} is full", self.base, self.prefixlen)));
        }
        let idx = self.union().first_free().expect("checked not full above");
        let addr = self.addr_at(idx);
        self.reserve(addr, false)?;
        Ok(addr)
    }

    /// Like `get_free_address` but does not reserve (matches
    /// `GenerateFree`, which just previews the next candidate).
    pub fn generate_free(&self) -> Result<Ipv4Addr> {
        match self.union().first_free() {
            Some(idx) => Ok(self.addr_at(idx)),
            None => Err(DbError::AddressPoolError(format!("{}/{} is full", self.base, self.prefixlen))),
        }
    }

    pub fn get_external_reservations(&self) -> Vec<Ipv4Addr> {
        self.ext_reservations
            .bits
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(idx, _)| self.addr_at(idx))
            .collect()
    }

    fn addr_at(&self, idx: usize) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) + idx as u32)
    }

    /// `InitializeNetwork`: reserve network/broadcast addresses and the
    /// gateway (if any) as external reservations.
    pub fn initialize(net: &mut Network) -> Result<Self> {
        let mut pool = Self::from_network(net)?;
        let last_idx = (pool.size() - 1) as usize;
        pool.reserve(pool.addr_at(0), true)?;
        pool.reserve(pool.addr_at(last_idx), true)?;
        if let Some(gw) = pool.gateway {
            pool.reserve(gw, true)?;
        }
        pool.write_back(net);
        Ok(pool)
    }
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u32)> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| DbError::AddressPoolError(format!("invalid CIDR: {cidr}")))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| DbError::AddressPoolError(format!("invalid network address: {addr}")))?;
    let len: u32 = len
        .parse()
        .map_err(|_| DbError::AddressPoolError(format!("invalid prefix length: {len}")))?;
    Ok((addr, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_network() -> Network {
        Network {
            uuid: uuid::Uuid::new_v4(),
            name: "net1".into(),
            network: "192.0.2.0/29".into(),
            gateway: Some("192.0.2.1".into()),
            network6: None,
            gateway6: None,
            reservations: String::new(),
            ext_reservations: String::new(),
        }
    }

    #[test]
    fn scenario_s4_address_pool() {
        let mut net = fresh_network();
        let mut pool = AddressPool::initialize(&mut net).unwrap();

        let reserved_ext = pool.get_external_reservations();
        let expected: Vec<Ipv4Addr> =
            ["192.0.2.0", "192.0.2.1", "192.0.2.7"].iter().map(|s| s.parse().unwrap()).collect();
        let mut reserved_sorted = reserved_ext.clone();
        reserved_sorted.sort();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        assert_eq!(reserved_sorted, expected_sorted);

        let free: Ipv4Addr = "192.0.2.2".parse().unwrap();
        assert_eq!(pool.generate_free().unwrap(), free);

        pool.reserve(free, false).unwrap();
        let err = pool.reserve(free, false);
        assert!(matches!(err, Err(DbError::AddressPoolError(_))));
    }

    #[test]
    fn free_plus_reserved_equals_size() {
        let mut net = fresh_network();
        let pool = AddressPool::initialize(&mut net).unwrap();
        assert_eq!(pool.get_free_count() + pool.get_reserved_count(), pool.size());
    }

    #[test]
    fn reserve_then_release_is_noop_on_union() {
        let mut net = fresh_network();
        let mut pool = AddressPool::initialize(&mut net).unwrap();
        let before = pool.get_map();
        let addr: Ipv4Addr = "192.0.2.3".parse().unwrap();
        pool.reserve(addr, false).unwrap();
        pool.release(addr, false).unwrap();
        assert_eq!(pool.get_map(), before);
    }

    #[test]
    fn rejects_oversized_and_undersized_networks() {
        let mut too_big = fresh_network();
        too_big.network = "10.0.0.0/8".into();
        too_big.gateway = None;
        assert!(AddressPool::from_network(&too_big).is_err());

        let mut too_small = fresh_network();
        too_small.network = "192.0.2.0/31".into();
        too_small.gateway = None;
        assert!(AddressPool::from_network(&too_small).is_err());
    }
}
