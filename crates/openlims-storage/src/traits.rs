//! The storage trait every persistence backend must implement.

use async_trait::async_trait;
use indexmap::IndexMap;

use openlims_core::{LabSettings, OrderedTest, Patient, Sample, TestDefinition};

use crate::error::StorageError;
use crate::types::{ListParams, Page, RecordedResult, SyncOutcome, TestFilter, WorkItemChange};

/// Persistence contract for the LIMS. Implementations must be thread-safe
/// (`Send + Sync`) and enforce the relational invariants themselves:
/// uniqueness of accession numbers and test codes, referential integrity of
/// foreign keys, cascade deletes, and the work-item state machine.
///
/// # Example
///
/// ```ignore
/// use openlims_storage::{LimsStorage, StorageError};
/// use openlims_core::Sample;
///
/// async fn load_by_accession(
///     storage: &dyn LimsStorage,
///     accession: &str,
/// ) -> Result<Sample, StorageError> {
///     storage
///         .get_sample_by_accession(accession)
///         .await?
///         .ok_or_else(|| StorageError::not_found("Sample", accession))
/// }
/// ```
#[async_trait]
pub trait LimsStorage: Send + Sync {
    // ==================== Patients ====================

    /// Inserts a new patient.
    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StorageError>;

    /// Reads a patient by ID. Returns `None` if absent.
    async fn get_patient(&self, id: &str) -> Result<Option<Patient>, StorageError>;

    /// Lists patients, newest first.
    async fn list_patients(&self, params: &ListParams) -> Result<Page<Patient>, StorageError>;

    /// Case-insensitive substring search over patient names.
    async fn search_patients(&self, name: &str) -> Result<Vec<Patient>, StorageError>;

    /// Replaces an existing patient record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the patient does not exist.
    async fn update_patient(&self, patient: Patient) -> Result<Patient, StorageError>;

    /// Deletes a patient, cascading to its samples and their work items.
    async fn delete_patient(&self, id: &str) -> Result<(), StorageError>;

    // ==================== Test catalog ====================

    /// Inserts a new catalog test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` when the code is taken.
    async fn insert_test(&self, test: TestDefinition) -> Result<TestDefinition, StorageError>;

    /// Reads a catalog test by ID.
    async fn get_test(&self, id: &str) -> Result<Option<TestDefinition>, StorageError>;

    /// Lists catalog tests matching the filter, ordered by code.
    async fn list_tests(&self, filter: &TestFilter) -> Result<Vec<TestDefinition>, StorageError>;

    /// Replaces an existing catalog test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` when the new code collides with
    /// another test, `StorageError::NotFound` when the test is absent.
    async fn update_test(&self, test: TestDefinition) -> Result<TestDefinition, StorageError>;

    /// Deletes a catalog test, cascading to its work items.
    async fn delete_test(&self, id: &str) -> Result<(), StorageError>;

    /// Number of samples this test is attached to.
    async fn count_samples_for_test(&self, test_id: &str) -> Result<usize, StorageError>;

    // ==================== Samples ====================

    /// Inserts a sample and creates one Pending work item per supplied test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` on accession collision,
    /// `StorageError::NotFound` when the patient or any test is absent.
    async fn insert_sample(
        &self,
        sample: Sample,
        test_ids: &[String],
    ) -> Result<Sample, StorageError>;

    /// Reads a sample by ID.
    async fn get_sample(&self, id: &str) -> Result<Option<Sample>, StorageError>;

    /// Reads a sample by its accession number.
    async fn get_sample_by_accession(
        &self,
        accession: &str,
    ) -> Result<Option<Sample>, StorageError>;

    /// Lists samples, newest first.
    async fn list_samples(&self, params: &ListParams) -> Result<Page<Sample>, StorageError>;

    /// All samples owned by one patient, newest first.
    async fn list_samples_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Sample>, StorageError>;

    /// Replaces a sample's metadata. Never touches the test set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when absent,
    /// `StorageError::AlreadyExists` when the accession was changed to a
    /// taken value.
    async fn update_sample(&self, sample: Sample) -> Result<Sample, StorageError>;

    /// Deletes a sample, cascading to its work items.
    async fn delete_sample(&self, id: &str) -> Result<(), StorageError>;

    // ==================== Work items ====================

    /// All work items for one sample, in attachment order.
    async fn list_work_items(&self, sample_id: &str) -> Result<Vec<OrderedTest>, StorageError>;

    /// One work item by its (sample, test) pair.
    async fn get_work_item(
        &self,
        sample_id: &str,
        test_id: &str,
    ) -> Result<Option<OrderedTest>, StorageError>;

    /// Attaches tests to a sample: fresh Pending work items for pairs that
    /// do not exist yet, existing pairs untouched. Returns the sample's full
    /// work item list.
    async fn attach_tests(
        &self,
        sample_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<OrderedTest>, StorageError>;

    /// Removes one test from a sample.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WouldDiscardResults` when the work item has
    /// recorded results and `force` is false.
    async fn detach_test(
        &self,
        sample_id: &str,
        test_id: &str,
        force: bool,
    ) -> Result<(), StorageError>;

    /// Replaces the sample's test set wholesale. Kept pairs retain their
    /// status and results; new pairs start Pending; removed pairs lose their
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WouldDiscardResults` when removal would
    /// discard recorded results and `force` is false.
    async fn sync_tests(
        &self,
        sample_id: &str,
        test_ids: &[String],
        force: bool,
    ) -> Result<SyncOutcome, StorageError>;

    /// Applies a partial change to one work item. Status changes are
    /// validated against the state machine; result entries are classified
    /// against the test's parameter schema.
    async fn update_work_item(
        &self,
        sample_id: &str,
        test_id: &str,
        change: WorkItemChange,
    ) -> Result<OrderedTest, StorageError>;

    /// Upserts the result payload for one (sample, test) pair, replacing any
    /// previous payload and attaching the pair (Pending) when it did not
    /// exist yet. Does not change status. Idempotent.
    async fn save_results(
        &self,
        sample_id: &str,
        test_id: &str,
        entries: IndexMap<String, String>,
    ) -> Result<OrderedTest, StorageError>;

    /// All work items with a recorded payload, across all samples.
    async fn list_recorded_results(&self) -> Result<Vec<RecordedResult>, StorageError>;

    // ==================== Lab settings ====================

    /// Reads the branding record. Returns `None` when never configured.
    async fn get_settings(&self) -> Result<Option<LabSettings>, StorageError>;

    /// Creates or replaces the branding record.
    async fn put_settings(&self, settings: LabSettings) -> Result<LabSettings, StorageError>;

    // ==================== Metadata ====================

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
