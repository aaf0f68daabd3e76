//! Logger setup.
//!
//! Library code only uses the `log` macros. Binaries and test harnesses call
//! [`init_logging`] once to route them through `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
