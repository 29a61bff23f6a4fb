//! # matrix-core
//!
//! Shared library for the matrix job server containing the binary frame
//! codec, the per-connection session state machine, and the parallel
//! column-minimum processor.
//!
//! This crate is used by both the server and the client library.
//! It has zero dependencies on network sockets or an async runtime.
//!
//! # Architecture overview
//!
//! A client uploads an `n × n` matrix of `i32` values together with a worker
//! count, asks the server to start a job, and polls until the result is ready.
//!
//! - **`protocol`** – How bytes travel over the connection.  Every message is
//!   one frame: a 1-byte tag, a 4-byte big-endian length, and the payload.
//!
//! - **`domain`** – Pure logic with no I/O.  [`Session`] enforces the order of
//!   operations (configure, upload, start, poll) and [`processor`] runs the
//!   two-phase gather/scatter computation on a bounded thread pool.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `matrix_core::Session` instead of `matrix_core::domain::session::Session`.
pub use domain::matrix::Matrix;
pub use domain::processor::{self, column_minima_scatter, ConfigError};
pub use domain::session::{JobOutcome, JobTicket, Session, SessionOutcome, StateError, TransitionError};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::{Frame, JobConfig, JobStatus, Request, Response, Tag};
