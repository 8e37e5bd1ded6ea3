//! Component K: LU library skeleton (SPEC_FULL.md §4.10/K) — spec
//! covers the dispatch skeleton only; a handful of representative LUs
//! are implemented to exercise it end-to-end (scenarios S1/S2/S3/S6).

pub mod group;

use crate::mcpu::registry::LuRegistry;

pub fn build_registry() -> LuRegistry {
    let mut registry = LuRegistry::new();
    group::register(&mut registry);
    registry
}
