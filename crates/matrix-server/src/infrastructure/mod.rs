//! Infrastructure layer for matrix-server.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and limiting concurrent connections
//! - Reading and writing frames on each connection
//! - Loading the TOML configuration file

pub mod frame_io;
pub mod server;
pub mod storage;

pub use server::{run_server, serve};
