//! Component H: opcode processor (SPEC_FULL.md §4.8).

pub mod processor;
pub mod registry;

pub use processor::{OpCode, Processor};
pub use registry::{LockIntent, LockPlan, LuRegistry, LuState, LuVtable};
