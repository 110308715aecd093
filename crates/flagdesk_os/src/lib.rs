#![forbid(unsafe_code)]

pub mod authz;
pub mod config;
pub mod dispatcher;
pub mod ledger;
pub mod render;
pub mod retry;
pub mod session;

pub use config::OsConfig;
pub use dispatcher::{CommandDispatcher, DispatchError};
pub use session::SessionStore;

#[cfg(test)]
pub(crate) mod test_support;
