// src/lib.rs
//! Follows a FreeSWITCH event socket and writes a log line for every call
//! that is initiated, answered and ended.

pub mod config;
pub mod error;
pub mod esl;
pub mod logging;
pub mod processor;
pub mod supervisor;
pub mod tracker;

pub use config::Config;
pub use error::{ConfigError, EslError};
pub use processor::{CallLogEntry, EventProcessor};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use tracker::{CallRecord, CallTracker};
