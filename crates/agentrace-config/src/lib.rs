//! Configuration for agentrace: paths, thresholds and the compliance schema.
//!
//! Configuration is built once at process start ([`Config::discover`]) and
//! passed down explicitly. The environment is read only during discovery.

mod config;

pub use config::*;
