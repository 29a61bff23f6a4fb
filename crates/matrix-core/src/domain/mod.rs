//! Domain logic for the matrix job server.
//!
//! Pure business rules with no infrastructure dependencies: no sockets, no
//! async runtime, no configuration files.  Outer layers (the server's session
//! actor and connection handler) drive these types; nothing here depends on
//! them.

/// Square `i32` matrix type.
pub mod matrix;

/// Two-phase column-minimum computation on a bounded thread pool.
pub mod processor;

/// Per-connection state machine enforcing the order of requests.
pub mod session;
