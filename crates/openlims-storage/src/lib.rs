//! # openlims-storage
//!
//! Storage abstraction layer for the OpenLIMS server.
//!
//! This crate defines the trait and types that all storage backends must
//! implement. It does not contain any implementations - those are provided
//! by separate crates (`openlims-db-memory`).
//!
//! ## Overview
//!
//! The main trait is [`LimsStorage`], which defines the contract for:
//! - Patient, catalog test, and sample CRUD
//! - Work item lifecycle (attach, detach, sync, status, results)
//! - The lab branding record
//!
//! ## Storage Backends
//!
//! To implement a storage backend, implement the [`LimsStorage`] trait:
//!
//! ```ignore
//! use async_trait::async_trait;
//! use openlims_storage::{LimsStorage, StorageError};
//!
//! struct MyStorage {
//!     // ...
//! }
//!
//! #[async_trait]
//! impl LimsStorage for MyStorage {
//!     async fn insert_patient(&self, patient: Patient) -> Result<Patient, StorageError> {
//!         // Implementation
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::LimsStorage;
pub use types::{
    ListParams, Page, RecordedResult, SyncOutcome, TestFilter, WorkItemChange,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn LimsStorage>;
