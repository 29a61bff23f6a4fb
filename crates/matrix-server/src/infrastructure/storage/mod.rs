//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file and provides
//! defaults when the file does not exist.  Nothing else in the server touches
//! the file system.

pub mod config;
