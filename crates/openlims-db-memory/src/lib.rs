//! # openlims-db-memory
//!
//! In-memory [`LimsStorage`](openlims_storage::LimsStorage) backend built on
//! papaya's lock-free hash map. It enforces the same invariants a relational
//! backend would express as constraints: unique accession numbers and test
//! codes, foreign keys, cascade deletes, the (sample, test) pair uniqueness,
//! and the work-item state machine.
//!
//! Useful for tests and for running the server without external
//! infrastructure.

mod storage;

pub use storage::InMemoryStorage;
