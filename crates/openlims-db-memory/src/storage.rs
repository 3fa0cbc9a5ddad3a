use async_trait::async_trait;
use indexmap::IndexMap;
use papaya::HashMap as PapayaHashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use openlims_core::{LabSettings, OrderedTest, Patient, ResultPayload, Sample, TestDefinition};
use openlims_storage::{
    LimsStorage, ListParams, Page, RecordedResult, StorageError, SyncOutcome, TestFilter,
    WorkItemChange,
};

pub type PairKey = String; // Format: "sample_id/test_id"

pub(crate) fn make_pair_key(sample_id: &str, test_id: &str) -> PairKey {
    format!("{sample_id}/{test_id}")
}

/// A work item plus its insertion sequence number, which stands in for the
/// auto-increment row ID a relational backend would order by.
#[derive(Debug, Clone)]
struct StoredWorkItem {
    seq: u64,
    item: OrderedTest,
}

/// In-memory LIMS storage backend using papaya lock-free HashMaps.
///
/// One map per table, plus a composite-keyed map for the (sample, test)
/// work items. Uniqueness and referential checks scan the relevant map,
/// which is fine at in-memory scale.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    patients: Arc<PapayaHashMap<String, Patient>>,
    tests: Arc<PapayaHashMap<String, TestDefinition>>,
    samples: Arc<PapayaHashMap<String, Sample>>,
    work_items: Arc<PapayaHashMap<PairKey, StoredWorkItem>>,
    settings: Arc<RwLock<Option<LabSettings>>>,
    /// Monotonic counter ordering work items within and across samples.
    seq_counter: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn accession_taken(&self, accession: &str, exclude_sample_id: Option<&str>) -> bool {
        let guard = self.samples.pin();
        guard.iter().any(|(id, sample)| {
            sample.accession_number == accession && Some(id.as_str()) != exclude_sample_id
        })
    }

    fn code_taken(&self, code: &str, exclude_test_id: Option<&str>) -> bool {
        let guard = self.tests.pin();
        guard
            .iter()
            .any(|(id, test)| test.code == code && Some(id.as_str()) != exclude_test_id)
    }

    fn require_patient(&self, id: &str) -> Result<Patient, StorageError> {
        let guard = self.patients.pin();
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("Patient", id))
    }

    fn require_test(&self, id: &str) -> Result<TestDefinition, StorageError> {
        let guard = self.tests.pin();
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("Test", id))
    }

    fn require_sample(&self, id: &str) -> Result<Sample, StorageError> {
        let guard = self.samples.pin();
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("Sample", id))
    }

    /// Rejects duplicate IDs in a request and verifies every test exists.
    fn check_test_ids(&self, test_ids: &[String]) -> Result<(), StorageError> {
        let mut seen = HashSet::new();
        for id in test_ids {
            if !seen.insert(id.as_str()) {
                return Err(StorageError::validation(format!(
                    "duplicate test id in request: {id}"
                )));
            }
            self.require_test(id)?;
        }
        Ok(())
    }

    fn sorted_work_items(&self, sample_id: &str) -> Vec<StoredWorkItem> {
        let guard = self.work_items.pin();
        let mut items: Vec<StoredWorkItem> = guard
            .iter()
            .filter(|(_, stored)| stored.item.sample_id == sample_id)
            .map(|(_, stored)| stored.clone())
            .collect();
        items.sort_by_key(|stored| stored.seq);
        items
    }

    fn insert_pending_item(&self, sample_id: &str, test_id: &str) {
        let key = make_pair_key(sample_id, test_id);
        let stored = StoredWorkItem {
            seq: self.next_seq(),
            item: OrderedTest::new(sample_id, test_id),
        };
        let guard = self.work_items.pin();
        guard.insert(key, stored);
    }

    fn remove_work_items_for_sample(&self, sample_id: &str) {
        let prefix = format!("{sample_id}/");
        let guard = self.work_items.pin();
        let keys: Vec<PairKey> = guard
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            guard.remove(&key);
        }
    }

    fn remove_work_items_for_test(&self, test_id: &str) {
        let guard = self.work_items.pin();
        let keys: Vec<PairKey> = guard
            .iter()
            .filter(|(_, stored)| stored.item.test_id == test_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            guard.remove(&key);
        }
    }
}

#[async_trait]
impl LimsStorage for InMemoryStorage {
    // ==================== Patients ====================

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, StorageError> {
        let guard = self.patients.pin();
        if guard.get(&patient.id).is_some() {
            return Err(StorageError::already_exists("Patient", &patient.id));
        }
        guard.insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, id: &str) -> Result<Option<Patient>, StorageError> {
        let guard = self.patients.pin();
        Ok(guard.get(id).cloned())
    }

    async fn list_patients(&self, params: &ListParams) -> Result<Page<Patient>, StorageError> {
        let guard = self.patients.pin();
        let mut patients: Vec<Patient> = guard.iter().map(|(_, p)| p.clone()).collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = patients.len();
        let items = patients
            .into_iter()
            .skip(params.offset())
            .take(params.per_page)
            .collect();
        Ok(Page::new(items, total, params))
    }

    async fn search_patients(&self, name: &str) -> Result<Vec<Patient>, StorageError> {
        let needle = name.to_lowercase();
        let guard = self.patients.pin();
        let mut matches: Vec<Patient> = guard
            .iter()
            .filter(|(_, p)| p.name.to_lowercase().contains(&needle))
            .map(|(_, p)| p.clone())
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn update_patient(&self, patient: Patient) -> Result<Patient, StorageError> {
        let guard = self.patients.pin();
        if guard.get(&patient.id).is_none() {
            return Err(StorageError::not_found("Patient", &patient.id));
        }
        guard.insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    async fn delete_patient(&self, id: &str) -> Result<(), StorageError> {
        {
            let guard = self.patients.pin();
            if guard.remove(id).is_none() {
                return Err(StorageError::not_found("Patient", id));
            }
        }

        // Cascade: samples owned by the patient and their work items.
        let owned: Vec<String> = {
            let guard = self.samples.pin();
            guard
                .iter()
                .filter(|(_, s)| s.patient_id == id)
                .map(|(sample_id, _)| sample_id.clone())
                .collect()
        };
        for sample_id in owned {
            let guard = self.samples.pin();
            guard.remove(&sample_id);
            drop(guard);
            self.remove_work_items_for_sample(&sample_id);
        }
        Ok(())
    }

    // ==================== Test catalog ====================

    async fn insert_test(&self, test: TestDefinition) -> Result<TestDefinition, StorageError> {
        if self.code_taken(&test.code, None) {
            return Err(StorageError::already_exists("Test", &test.code));
        }
        let guard = self.tests.pin();
        if guard.get(&test.id).is_some() {
            return Err(StorageError::already_exists("Test", &test.id));
        }
        guard.insert(test.id.clone(), test.clone());
        Ok(test)
    }

    async fn get_test(&self, id: &str) -> Result<Option<TestDefinition>, StorageError> {
        let guard = self.tests.pin();
        Ok(guard.get(id).cloned())
    }

    async fn list_tests(&self, filter: &TestFilter) -> Result<Vec<TestDefinition>, StorageError> {
        let in_use_ids: Option<HashSet<String>> = match filter.in_use {
            Some(true) => {
                let guard = self.work_items.pin();
                Some(
                    guard
                        .iter()
                        .map(|(_, stored)| stored.item.test_id.clone())
                        .collect(),
                )
            }
            _ => None,
        };

        let guard = self.tests.pin();
        let mut tests: Vec<TestDefinition> = guard
            .iter()
            .filter(|(_, t)| {
                filter
                    .sample_type
                    .is_none_or(|specimen| t.supports(specimen))
                    && filter
                        .category
                        .as_ref()
                        .is_none_or(|c| &t.category == c)
                    && filter
                        .department
                        .as_ref()
                        .is_none_or(|d| &t.department == d)
                    && filter.status.is_none_or(|s| t.status == s)
                    && in_use_ids
                        .as_ref()
                        .is_none_or(|ids| ids.contains(&t.id))
            })
            .map(|(_, t)| t.clone())
            .collect();
        tests.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(tests)
    }

    async fn update_test(&self, test: TestDefinition) -> Result<TestDefinition, StorageError> {
        if self.code_taken(&test.code, Some(&test.id)) {
            return Err(StorageError::already_exists("Test", &test.code));
        }
        let guard = self.tests.pin();
        if guard.get(&test.id).is_none() {
            return Err(StorageError::not_found("Test", &test.id));
        }
        guard.insert(test.id.clone(), test.clone());
        Ok(test)
    }

    async fn delete_test(&self, id: &str) -> Result<(), StorageError> {
        {
            let guard = self.tests.pin();
            if guard.remove(id).is_none() {
                return Err(StorageError::not_found("Test", id));
            }
        }
        self.remove_work_items_for_test(id);
        Ok(())
    }

    async fn count_samples_for_test(&self, test_id: &str) -> Result<usize, StorageError> {
        let guard = self.work_items.pin();
        Ok(guard
            .iter()
            .filter(|(_, stored)| stored.item.test_id == test_id)
            .count())
    }

    // ==================== Samples ====================

    async fn insert_sample(
        &self,
        sample: Sample,
        test_ids: &[String],
    ) -> Result<Sample, StorageError> {
        self.require_patient(&sample.patient_id)?;
        self.check_test_ids(test_ids)?;
        if self.accession_taken(&sample.accession_number, None) {
            return Err(StorageError::already_exists(
                "Sample",
                &sample.accession_number,
            ));
        }

        {
            let guard = self.samples.pin();
            if guard.get(&sample.id).is_some() {
                return Err(StorageError::already_exists("Sample", &sample.id));
            }
            guard.insert(sample.id.clone(), sample.clone());
        }

        for test_id in test_ids {
            self.insert_pending_item(&sample.id, test_id);
        }
        Ok(sample)
    }

    async fn get_sample(&self, id: &str) -> Result<Option<Sample>, StorageError> {
        let guard = self.samples.pin();
        Ok(guard.get(id).cloned())
    }

    async fn get_sample_by_accession(
        &self,
        accession: &str,
    ) -> Result<Option<Sample>, StorageError> {
        let guard = self.samples.pin();
        Ok(guard
            .iter()
            .find(|(_, s)| s.accession_number == accession)
            .map(|(_, s)| s.clone()))
    }

    async fn list_samples(&self, params: &ListParams) -> Result<Page<Sample>, StorageError> {
        let guard = self.samples.pin();
        let mut samples: Vec<Sample> = guard.iter().map(|(_, s)| s.clone()).collect();
        samples.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = samples.len();
        let items = samples
            .into_iter()
            .skip(params.offset())
            .take(params.per_page)
            .collect();
        Ok(Page::new(items, total, params))
    }

    async fn list_samples_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Sample>, StorageError> {
        let guard = self.samples.pin();
        let mut samples: Vec<Sample> = guard
            .iter()
            .filter(|(_, s)| s.patient_id == patient_id)
            .map(|(_, s)| s.clone())
            .collect();
        samples.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(samples)
    }

    async fn update_sample(&self, sample: Sample) -> Result<Sample, StorageError> {
        self.require_patient(&sample.patient_id)?;
        if self.accession_taken(&sample.accession_number, Some(&sample.id)) {
            return Err(StorageError::already_exists(
                "Sample",
                &sample.accession_number,
            ));
        }
        let guard = self.samples.pin();
        if guard.get(&sample.id).is_none() {
            return Err(StorageError::not_found("Sample", &sample.id));
        }
        guard.insert(sample.id.clone(), sample.clone());
        Ok(sample)
    }

    async fn delete_sample(&self, id: &str) -> Result<(), StorageError> {
        {
            let guard = self.samples.pin();
            if guard.remove(id).is_none() {
                return Err(StorageError::not_found("Sample", id));
            }
        }
        self.remove_work_items_for_sample(id);
        Ok(())
    }

    // ==================== Work items ====================

    async fn list_work_items(&self, sample_id: &str) -> Result<Vec<OrderedTest>, StorageError> {
        self.require_sample(sample_id)?;
        Ok(self
            .sorted_work_items(sample_id)
            .into_iter()
            .map(|stored| stored.item)
            .collect())
    }

    async fn get_work_item(
        &self,
        sample_id: &str,
        test_id: &str,
    ) -> Result<Option<OrderedTest>, StorageError> {
        let key = make_pair_key(sample_id, test_id);
        let guard = self.work_items.pin();
        Ok(guard.get(&key).map(|stored| stored.item.clone()))
    }

    async fn attach_tests(
        &self,
        sample_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<OrderedTest>, StorageError> {
        self.require_sample(sample_id)?;
        self.check_test_ids(test_ids)?;

        for test_id in test_ids {
            let key = make_pair_key(sample_id, test_id);
            let exists = {
                let guard = self.work_items.pin();
                guard.get(&key).is_some()
            };
            if !exists {
                self.insert_pending_item(sample_id, test_id);
            }
        }
        self.list_work_items(sample_id).await
    }

    async fn detach_test(
        &self,
        sample_id: &str,
        test_id: &str,
        force: bool,
    ) -> Result<(), StorageError> {
        let key = make_pair_key(sample_id, test_id);
        let guard = self.work_items.pin();
        let stored = guard
            .get(&key)
            .ok_or_else(|| StorageError::not_found("Ordered test", &key))?;
        if !force && stored.item.has_recorded_results() {
            return Err(StorageError::would_discard_results(
                sample_id,
                vec![test_id.to_string()],
            ));
        }
        guard.remove(&key);
        Ok(())
    }

    async fn sync_tests(
        &self,
        sample_id: &str,
        test_ids: &[String],
        force: bool,
    ) -> Result<SyncOutcome, StorageError> {
        self.require_sample(sample_id)?;
        self.check_test_ids(test_ids)?;

        let target: HashSet<&str> = test_ids.iter().map(String::as_str).collect();
        let current = self.sorted_work_items(sample_id);

        let to_detach: Vec<&StoredWorkItem> = current
            .iter()
            .filter(|stored| !target.contains(stored.item.test_id.as_str()))
            .collect();

        if !force {
            let blocking: Vec<String> = to_detach
                .iter()
                .filter(|stored| stored.item.has_recorded_results())
                .map(|stored| stored.item.test_id.clone())
                .collect();
            if !blocking.is_empty() {
                return Err(StorageError::would_discard_results(sample_id, blocking));
            }
        }

        let mut outcome = SyncOutcome::default();

        for stored in &to_detach {
            let key = make_pair_key(sample_id, &stored.item.test_id);
            let guard = self.work_items.pin();
            guard.remove(&key);
            outcome.detached.push(stored.item.test_id.clone());
        }

        for test_id in test_ids {
            let key = make_pair_key(sample_id, test_id);
            let exists = {
                let guard = self.work_items.pin();
                guard.get(&key).is_some()
            };
            if exists {
                outcome.kept.push(test_id.clone());
            } else {
                self.insert_pending_item(sample_id, test_id);
                outcome.attached.push(test_id.clone());
            }
        }
        Ok(outcome)
    }

    async fn update_work_item(
        &self,
        sample_id: &str,
        test_id: &str,
        change: WorkItemChange,
    ) -> Result<OrderedTest, StorageError> {
        let key = make_pair_key(sample_id, test_id);
        let mut stored = {
            let guard = self.work_items.pin();
            guard
                .get(&key)
                .cloned()
                .ok_or_else(|| StorageError::not_found("Ordered test", &key))?
        };

        if let Some(next) = change.status {
            stored.item.status = stored
                .item
                .status
                .transition(next)
                .map_err(|e| StorageError::validation(e.to_string()))?;
        }
        if let Some(entries) = change.results {
            let test = self.require_test(test_id)?;
            stored.item.results = Some(ResultPayload::classify(&test.parameters, entries));
        }
        if let Some(notes) = change.notes {
            stored.item.notes = Some(notes);
        }
        stored.item.touch();

        let guard = self.work_items.pin();
        guard.insert(key, stored.clone());
        Ok(stored.item)
    }

    async fn save_results(
        &self,
        sample_id: &str,
        test_id: &str,
        entries: IndexMap<String, String>,
    ) -> Result<OrderedTest, StorageError> {
        self.require_sample(sample_id)?;
        let test = self.require_test(test_id)?;

        let key = make_pair_key(sample_id, test_id);
        let mut stored = {
            let guard = self.work_items.pin();
            guard.get(&key).cloned()
        }
        .unwrap_or_else(|| StoredWorkItem {
            seq: self.next_seq(),
            item: OrderedTest::new(sample_id, test_id),
        });

        stored.item.results = Some(ResultPayload::classify(&test.parameters, entries));
        stored.item.touch();

        let guard = self.work_items.pin();
        guard.insert(key, stored.clone());
        Ok(stored.item)
    }

    async fn list_recorded_results(&self) -> Result<Vec<RecordedResult>, StorageError> {
        let guard = self.work_items.pin();
        let mut recorded: Vec<(u64, RecordedResult)> = guard
            .iter()
            .filter(|(_, stored)| stored.item.has_recorded_results())
            .map(|(_, stored)| {
                (
                    stored.seq,
                    RecordedResult {
                        sample_id: stored.item.sample_id.clone(),
                        test_id: stored.item.test_id.clone(),
                        results: stored.item.results.clone().unwrap_or_default(),
                    },
                )
            })
            .collect();
        recorded.sort_by_key(|(seq, _)| *seq);
        Ok(recorded.into_iter().map(|(_, r)| r).collect())
    }

    // ==================== Lab settings ====================

    async fn get_settings(&self) -> Result<Option<LabSettings>, StorageError> {
        Ok(self.settings.read().await.clone())
    }

    async fn put_settings(&self, settings: LabSettings) -> Result<LabSettings, StorageError> {
        let mut slot = self.settings.write().await;
        *slot = Some(settings.clone());
        Ok(settings)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use openlims_core::time::{parse_clock_time, parse_date};
    use openlims_core::{Gender, TestParameter, WorkStatus};

    fn patient(name: &str) -> Patient {
        Patient::new(name).with_gender(Gender::Female)
    }

    fn cbc() -> TestDefinition {
        TestDefinition::new("CBC", "Complete Blood Count")
            .with_sample_types(vec![openlims_core::SpecimenType::Blood])
            .with_parameters(vec![
                TestParameter::new("Hemoglobin").with_units("g/dL"),
                TestParameter::new("WBC").with_units("10^3/uL"),
            ])
    }

    fn lipid() -> TestDefinition {
        TestDefinition::new("LIPID", "Lipid Profile")
            .with_sample_types(vec![openlims_core::SpecimenType::Blood])
            .with_parameters(vec![TestParameter::new("Cholesterol")])
    }

    fn sample_for(patient_id: &str, accession: &str) -> Sample {
        Sample::new(
            accession,
            patient_id,
            openlims_core::SpecimenType::Blood,
            parse_date("2025-06-01").unwrap(),
            parse_clock_time("08:30").unwrap(),
        )
    }

    async fn seed(storage: &InMemoryStorage) -> (Patient, TestDefinition, TestDefinition) {
        let p = storage.insert_patient(patient("John Doe")).await.unwrap();
        let cbc = storage.insert_test(cbc()).await.unwrap();
        let lipid = storage.insert_test(lipid()).await.unwrap();
        (p, cbc, lipid)
    }

    #[tokio::test]
    async fn test_patient_crud() {
        let storage = InMemoryStorage::new();
        let p = storage.insert_patient(patient("John Doe")).await.unwrap();

        let read = storage.get_patient(&p.id).await.unwrap().unwrap();
        assert_eq!(read.name, "John Doe");

        let mut updated = read.clone();
        updated.name = "John Q. Doe".into();
        storage.update_patient(updated).await.unwrap();
        let read = storage.get_patient(&p.id).await.unwrap().unwrap();
        assert_eq!(read.name, "John Q. Doe");

        storage.delete_patient(&p.id).await.unwrap();
        assert!(storage.get_patient(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patient_search_is_case_insensitive() {
        let storage = InMemoryStorage::new();
        storage.insert_patient(patient("John Doe")).await.unwrap();
        storage.insert_patient(patient("Jane Roe")).await.unwrap();

        let hits = storage.search_patients("doe").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "John Doe");

        let hits = storage.search_patients("o").await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_test_code_uniqueness() {
        let storage = InMemoryStorage::new();
        storage.insert_test(cbc()).await.unwrap();

        let duplicate = storage.insert_test(cbc()).await;
        assert!(matches!(
            duplicate.unwrap_err(),
            StorageError::AlreadyExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_test_rejects_code_collision() {
        let storage = InMemoryStorage::new();
        storage.insert_test(cbc()).await.unwrap();
        let other = storage.insert_test(lipid()).await.unwrap();

        let mut renamed = other.clone();
        renamed.code = "CBC".into();
        assert!(matches!(
            storage.update_test(renamed).await.unwrap_err(),
            StorageError::AlreadyExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_tests_filters() {
        let storage = InMemoryStorage::new();
        let urine = TestDefinition::new("UA", "Urinalysis")
            .with_sample_types(vec![openlims_core::SpecimenType::Urine])
            .with_category("Chemistry");
        storage.insert_test(cbc()).await.unwrap();
        storage.insert_test(urine).await.unwrap();

        let blood_only = storage
            .list_tests(&TestFilter::new().with_sample_type(openlims_core::SpecimenType::Blood))
            .await
            .unwrap();
        assert_eq!(blood_only.len(), 1);
        assert_eq!(blood_only[0].code, "CBC");

        let chemistry = storage
            .list_tests(&TestFilter::new().with_category("Chemistry"))
            .await
            .unwrap();
        assert_eq!(chemistry.len(), 1);
        assert_eq!(chemistry[0].code, "UA");
    }

    #[tokio::test]
    async fn test_in_use_filter() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _lipid) = seed(&storage).await;
        storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        let in_use = storage
            .list_tests(&TestFilter::new().with_in_use(true))
            .await
            .unwrap();
        assert_eq!(in_use.len(), 1);
        assert_eq!(in_use[0].code, "CBC");
    }

    #[tokio::test]
    async fn test_intake_creates_pending_work_items() {
        let storage = InMemoryStorage::new();
        let (p, cbc, lipid) = seed(&storage).await;

        let sample = storage
            .insert_sample(
                sample_for(&p.id, "ACC001"),
                &[cbc.id.clone(), lipid.id.clone()],
            )
            .await
            .unwrap();

        let items = storage.list_work_items(&sample.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].test_id, cbc.id);
        assert_eq!(items[1].test_id, lipid.id);
        for item in items {
            assert_eq!(item.status, WorkStatus::Pending);
            assert!(item.results.is_none());
            assert!(item.notes.is_none());
        }
    }

    #[tokio::test]
    async fn test_intake_rejects_unknown_patient_and_test() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;

        let err = storage
            .insert_sample(sample_for("nonexistent", "ACC001"), &[])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = storage
            .insert_sample(
                sample_for(&p.id, "ACC001"),
                &[cbc.id.clone(), "nonexistent".into()],
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        // Nothing half-created.
        assert!(
            storage
                .get_sample_by_accession("ACC001")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_intake_rejects_duplicate_test_ids() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;

        let err = storage
            .insert_sample(
                sample_for(&p.id, "ACC001"),
                &[cbc.id.clone(), cbc.id.clone()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_accession_uniqueness() {
        let storage = InMemoryStorage::new();
        let (p, _, _) = seed(&storage).await;
        storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[])
            .await
            .unwrap();

        let err = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[])
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_get_sample_by_accession() {
        let storage = InMemoryStorage::new();
        let (p, _, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[])
            .await
            .unwrap();

        let found = storage
            .get_sample_by_accession("ACC001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, sample.id);
        assert!(
            storage
                .get_sample_by_accession("ACC999")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_attach_is_additive_and_duplicate_safe() {
        let storage = InMemoryStorage::new();
        let (p, cbc, lipid) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        // Record a result, then attach the same test again plus a new one.
        storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! { "Hemoglobin".to_string() => "14.2".to_string() },
            )
            .await
            .unwrap();

        let items = storage
            .attach_tests(&sample.id, &[cbc.id.clone(), lipid.id.clone()])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        // Existing pair untouched: results survive.
        assert!(items[0].has_recorded_results());
        assert_eq!(items[1].status, WorkStatus::Pending);
    }

    #[tokio::test]
    async fn test_detach_guards_recorded_results() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();
        storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! { "WBC".to_string() => "6.1".to_string() },
            )
            .await
            .unwrap();

        let err = storage
            .detach_test(&sample.id, &cbc.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::WouldDiscardResults { .. }));

        storage.detach_test(&sample.id, &cbc.id, true).await.unwrap();
        assert!(storage.list_work_items(&sample.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_replaces_set_and_keeps_survivors() {
        let storage = InMemoryStorage::new();
        let (p, cbc, lipid) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();
        storage
            .update_work_item(
                &sample.id,
                &cbc.id,
                WorkItemChange::new().with_status(WorkStatus::InProgress),
            )
            .await
            .unwrap();

        let outcome = storage
            .sync_tests(&sample.id, &[cbc.id.clone(), lipid.id.clone()], false)
            .await
            .unwrap();
        assert_eq!(outcome.kept, vec![cbc.id.clone()]);
        assert_eq!(outcome.attached, vec![lipid.id.clone()]);
        assert!(outcome.detached.is_empty());

        // The kept item retained its advanced status.
        let kept = storage
            .get_work_item(&sample.id, &cbc.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.status, WorkStatus::InProgress);
    }

    #[tokio::test]
    async fn test_sync_guards_then_forces_result_discard() {
        let storage = InMemoryStorage::new();
        let (p, cbc, lipid) = seed(&storage).await;
        let sample = storage
            .insert_sample(
                sample_for(&p.id, "ACC001"),
                &[cbc.id.clone(), lipid.id.clone()],
            )
            .await
            .unwrap();
        storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! { "Hemoglobin".to_string() => "14.2".to_string() },
            )
            .await
            .unwrap();

        // Unforced removal of CBC is refused and names the blocker.
        let err = storage
            .sync_tests(&sample.id, &[lipid.id.clone()], false)
            .await
            .unwrap_err();
        match err {
            StorageError::WouldDiscardResults { test_ids, .. } => {
                assert_eq!(test_ids, vec![cbc.id.clone()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Forced removal goes through and the results are gone with the row.
        let outcome = storage
            .sync_tests(&sample.id, &[lipid.id.clone()], true)
            .await
            .unwrap();
        assert_eq!(outcome.detached, vec![cbc.id.clone()]);
        let items = storage.list_work_items(&sample.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].test_id, lipid.id);
        assert!(
            storage
                .get_work_item(&sample.id, &cbc.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_save_results_is_idempotent_upsert() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        let entries = indexmap! {
            "Hemoglobin".to_string() => "14.2".to_string(),
            "WBC".to_string() => "6.1".to_string(),
        };
        let first = storage
            .save_results(&sample.id, &cbc.id, entries.clone())
            .await
            .unwrap();
        let second = storage
            .save_results(&sample.id, &cbc.id, entries)
            .await
            .unwrap();

        assert_eq!(first.results, second.results);
        let recorded = storage.list_recorded_results().await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].results.value_for("Hemoglobin"),
            Some("14.2")
        );
    }

    #[tokio::test]
    async fn test_save_results_replaces_payload() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! {
                    "Hemoglobin".to_string() => "14.2".to_string(),
                    "WBC".to_string() => "6.1".to_string(),
                },
            )
            .await
            .unwrap();
        let replaced = storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! { "WBC".to_string() => "7.0".to_string() },
            )
            .await
            .unwrap();

        let payload = replaced.results.unwrap();
        assert_eq!(payload.value_for("WBC"), Some("7.0"));
        assert_eq!(payload.value_for("Hemoglobin"), None);
    }

    #[tokio::test]
    async fn test_save_results_does_not_change_status() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        let item = storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! { "WBC".to_string() => "6.1".to_string() },
            )
            .await
            .unwrap();
        assert_eq!(item.status, WorkStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_work_item_enforces_state_machine() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        storage
            .update_work_item(
                &sample.id,
                &cbc.id,
                WorkItemChange::new().with_status(WorkStatus::Completed),
            )
            .await
            .unwrap();

        let err = storage
            .update_work_item(
                &sample.id,
                &cbc.id,
                WorkItemChange::new().with_status(WorkStatus::Pending),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_result_keys_land_in_extra() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        let item = storage
            .save_results(
                &sample.id,
                &cbc.id,
                indexmap! {
                    "Hemoglobin".to_string() => "14.2".to_string(),
                    "RDW".to_string() => "12.9".to_string(),
                },
            )
            .await
            .unwrap();
        let payload = item.results.unwrap();
        assert_eq!(payload.value_for("Hemoglobin"), Some("14.2"));
        assert!(payload.values.get("RDW").is_none());
        assert_eq!(payload.extra.get("RDW").map(String::as_str), Some("12.9"));
    }

    #[tokio::test]
    async fn test_delete_sample_cascades_to_work_items() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        storage.delete_sample(&sample.id).await.unwrap();
        assert!(
            storage
                .get_work_item(&sample.id, &cbc.id)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(storage.count_samples_for_test(&cbc.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_patient_cascades_to_samples_and_work_items() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        storage.delete_patient(&p.id).await.unwrap();
        assert!(storage.get_sample(&sample.id).await.unwrap().is_none());
        assert!(
            storage
                .get_work_item(&sample.id, &cbc.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_test_cascades_to_work_items() {
        let storage = InMemoryStorage::new();
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        storage.delete_test(&cbc.id).await.unwrap();
        assert!(
            storage
                .get_work_item(&sample.id, &cbc.id)
                .await
                .unwrap()
                .is_none()
        );
        // The sample itself stays.
        assert!(storage.get_sample(&sample.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_settings_default_and_replace() {
        let storage = InMemoryStorage::new();
        assert!(storage.get_settings().await.unwrap().is_none());

        storage
            .put_settings(LabSettings::new(
                "City Lab",
                "12 Main St",
                "555-0100",
                "lab@example.com",
            ))
            .await
            .unwrap();
        let read = storage.get_settings().await.unwrap().unwrap();
        assert_eq!(read.name, "City Lab");

        storage
            .put_settings(LabSettings::new("New Lab", "1 Side St", "555-0101", "n@l"))
            .await
            .unwrap();
        let read = storage.get_settings().await.unwrap().unwrap();
        assert_eq!(read.name, "New Lab");
    }

    #[tokio::test]
    async fn test_pagination() {
        let storage = InMemoryStorage::new();
        for i in 0..7 {
            storage
                .insert_patient(patient(&format!("Patient {i}")))
                .await
                .unwrap();
        }

        let params = ListParams::new(1, 3);
        let page = storage.list_patients(&params).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page.total, 7);
        assert_eq!(page.last_page(), 3);

        let params = ListParams::new(3, 3);
        let page = storage.list_patients(&params).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        use tokio::task::JoinSet;

        let storage = Arc::new(InMemoryStorage::new());
        let mut join_set = JoinSet::new();

        for i in 0..20 {
            let storage_clone = Arc::clone(&storage);
            join_set.spawn(async move {
                storage_clone
                    .insert_patient(Patient::new(format!("Concurrent {i}")))
                    .await
            });
        }

        let mut success_count = 0;
        while let Some(result) = join_set.join_next().await {
            if result.unwrap().is_ok() {
                success_count += 1;
            }
        }
        assert_eq!(success_count, 20);

        let page = storage
            .list_patients(&ListParams::new(1, 100))
            .await
            .unwrap();
        assert_eq!(page.total, 20);
    }

    #[tokio::test]
    async fn test_concurrent_result_saves_last_write_wins() {
        use tokio::task::JoinSet;

        let storage = Arc::new(InMemoryStorage::new());
        let (p, cbc, _) = seed(&storage).await;
        let sample = storage
            .insert_sample(sample_for(&p.id, "ACC001"), &[cbc.id.clone()])
            .await
            .unwrap();

        let mut join_set = JoinSet::new();
        for i in 0..10 {
            let storage_clone = Arc::clone(&storage);
            let sample_id = sample.id.clone();
            let test_id = cbc.id.clone();
            join_set.spawn(async move {
                storage_clone
                    .save_results(
                        &sample_id,
                        &test_id,
                        indexmap! { "WBC".to_string() => format!("{i}.0") },
                    )
                    .await
            });
        }
        while let Some(result) = join_set.join_next().await {
            assert!(result.unwrap().is_ok());
        }

        // Exactly one record survives with one of the written values.
        let recorded = storage.list_recorded_results().await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].results.value_for("WBC").is_some());
    }
}
