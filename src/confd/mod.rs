//! Component G: Confd authenticated UDP query/reply service (SPEC_FULL.md §4.7).

pub mod client;
pub mod filter;
pub mod protocol;

pub use client::{ConfdClient, ConfdUpcall};
pub use filter::ConfdFilterCallback;
pub use protocol::{ConfdReply, ConfdRequest, RequestKind};
