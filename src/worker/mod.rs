//! Worker communication module.
//!
//! Postgres and DuckDB statements run in an out-of-process database worker.
//! The engine stays driver-agnostic: it sends SQL plus positional arguments
//! and receives column names and JSON rows back.
//!
//! ```text
//! ┌──────────────────────────────┐   stdin (NDJSON)   ┌──────────────────┐
//! │ WorkerClient (tokio)         │ ─────────────────▶ │ database worker  │
//! │  request ids, pending map    │ ◀───────────────── │ (child process)  │
//! └──────────────────────────────┘   stdout (NDJSON)  └──────────────────┘
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::WorkerClient;
pub use error::{WorkerError, WorkerResult};
