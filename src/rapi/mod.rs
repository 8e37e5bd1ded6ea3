//! Component J: RAPI translator (SPEC_FULL.md §4, §6), grounded on
//! `lib/rapi/{baserlib,connector}.py`. Maps REST verbs onto opcodes
//! submitted through the job queue, with HTTP basic auth against a
//! flat users file the way `lib/rapi/baserlib.py`'s `JsonErrorHandler`
//! and users-file loader do.

pub mod auth;
pub mod connector;
pub mod server;

pub use connector::{RapiResource, CONNECTOR};
pub use server::{router, RapiState};
