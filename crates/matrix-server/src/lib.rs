//! matrix-server library crate.
//!
//! Accepts TCP connections from matrix clients, gives each one its own
//! session, and runs their column-minimum jobs on a shared compute pool.
//!
//! # Architecture
//!
//! ```text
//! Client (TLV frames over TCP)
//!         ↕
//! [matrix-server]
//!   ├── application/
//!   │     ├── session_actor/  One task per connection owning its Session
//!   │     └── job/            Launches jobs on the rayon compute pool
//!   └── infrastructure/
//!         ├── frame_io/       Async frame read/write
//!         ├── server/         Accept loop and per-connection tasks
//!         └── storage/        TOML configuration
//! ```
//!
//! Protocol types, the session state machine, and the processor live in
//! `matrix-core`.

/// Application layer: session actors and job launching.
pub mod application;

/// Infrastructure layer: sockets, framing, and configuration.
pub mod infrastructure;
