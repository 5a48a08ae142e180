//! # banter-store
//!
//! Storage collaborators for the banter chat service:
//!
//! - [`RecordStore`] — keyed CRUD over rooms and messages, with
//!   room-scoped time-ordered queries and vector-similarity search.
//!   [`SqliteRecordStore`] is the reference implementation (r2d2 pool,
//!   WAL, embedded migrations, brute-force KNN over BLOB embeddings).
//! - [`SharedStore`] — the low-latency counter/cache store used by the
//!   rate limiter and the embedding cache. Atomic increment-with-expiry
//!   and get/set-with-TTL. Treated as unreliable: every call site
//!   degrades gracefully when it errors.

#![deny(unsafe_code)]

pub mod blob;
pub mod connection;
pub mod errors;
pub mod migrations;
pub mod records;
pub mod shared;
pub mod vector;

pub use connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
pub use errors::{Result, StoreError};
pub use records::{RecordStore, SqliteRecordStore};
pub use shared::{FlakySharedStore, MemorySharedStore, SharedStore};
