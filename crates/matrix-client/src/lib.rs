//! matrix-client library entry point.
//!
//! An async client for the matrix job server.  A typical job:
//!
//! 1. [`MatrixClient::connect`] to the server.
//! 2. [`MatrixClient::configure`] with the matrix size and worker count.
//! 3. [`MatrixClient::upload_matrix`].
//! 4. [`MatrixClient::start`] the job.
//! 5. [`MatrixClient::poll_until_done`] to receive the result.

/// Infrastructure layer: the TCP connection to the server.
pub mod infrastructure;

pub use infrastructure::network::{ClientError, MatrixClient, StatusReply};
