#![forbid(unsafe_code)]

pub mod pagination;
pub mod projection;
pub mod ranking;
pub mod workflow;
