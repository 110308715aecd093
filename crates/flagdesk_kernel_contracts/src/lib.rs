#![forbid(unsafe_code)]

pub mod catalog;
pub mod common;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod session;

pub use common::{ContractViolation, SchemaVersion, TimestampMs, Validate};
