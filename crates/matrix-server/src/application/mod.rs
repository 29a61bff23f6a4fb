//! Application layer for matrix-server.
//!
//! Drives the `matrix-core` session state machine for each connection and
//! launches jobs.  Knows nothing about sockets: frames arrive through a
//! [`SessionHandle`] and replies go back the same way.

pub mod job;
pub mod session_actor;

pub use job::{JobHandle, MatrixProcessor};
pub use session_actor::{spawn_session, ActorError, Dispatch, SessionHandle, SessionOptions};
