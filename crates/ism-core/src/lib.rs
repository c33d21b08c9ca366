pub mod catalog;
pub mod change;
pub mod config;
pub mod error;
pub mod executor;
pub mod indices;
pub mod io;
pub mod jobs;
pub mod managed;
pub mod notify;
pub mod paths;
pub mod policy;
pub mod registry;
pub mod report;
pub mod retry;
pub mod runner;
pub mod store;
pub mod units;

#[cfg(test)]
mod testutil;

pub use error::{IsmError, Result};
