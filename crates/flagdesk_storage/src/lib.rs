#![forbid(unsafe_code)]

pub mod repo;
pub mod shared;
pub mod store;

pub use shared::SharedStore;
pub use store::{FlagdeskStore, StorageError};
