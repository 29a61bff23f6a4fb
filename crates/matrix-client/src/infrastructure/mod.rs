//! Infrastructure layer for matrix-client.

pub mod network;
