//! Component E: IPv4 address pool allocator (SPEC_FULL.md §4.5).

pub mod pool;

pub use pool::AddressPool;
