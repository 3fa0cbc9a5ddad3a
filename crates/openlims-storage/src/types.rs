//! Shared types used by the storage trait: pagination, list filters, and
//! the outcome of a test-set sync.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use openlims_core::{ResultPayload, SpecimenType, TestStatus, WorkStatus};

/// Pagination input for list operations. Pages are 1-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    pub page: usize,
    pub per_page: usize,
}

impl ListParams {
    pub const DEFAULT_PER_PAGE: usize = 15;
    pub const MAX_PER_PAGE: usize = 100;

    #[must_use]
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Index of the first item on this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }
}

/// One page of a list result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching items across all pages.
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: usize, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Number of the last page (at least 1, even when empty).
    #[must_use]
    pub fn last_page(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Filters for listing catalog tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFilter {
    /// Only tests that support this specimen type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<SpecimenType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TestStatus>,
    /// When true, only tests attached to at least one sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_use: Option<bool>,
}

impl TestFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sample_type(mut self, sample_type: SpecimenType) -> Self {
        self.sample_type = Some(sample_type);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TestStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_in_use(mut self, in_use: bool) -> Self {
        self.in_use = Some(in_use);
        self
    }

    /// Returns true if this filter matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_type.is_none()
            && self.category.is_none()
            && self.department.is_none()
            && self.status.is_none()
            && self.in_use.is_none()
    }
}

/// A change applied to one work item. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkItemChange {
    pub status: Option<WorkStatus>,
    /// Raw entered values; classified against the test's parameter schema
    /// by the backend before storing.
    pub results: Option<IndexMap<String, String>>,
    pub notes: Option<String>,
}

impl WorkItemChange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: WorkStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_results(mut self, results: IndexMap<String, String>) -> Self {
        self.results = Some(results);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Outcome of replacing a sample's test set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Test IDs that received fresh Pending work items.
    pub attached: Vec<String>,
    /// Test IDs whose work items were removed.
    pub detached: Vec<String>,
    /// Test IDs whose work items were left untouched.
    pub kept: Vec<String>,
}

/// A work item joined with its recorded payload, as returned by the
/// result-listing operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedResult {
    pub sample_id: String,
    pub test_id: String,
    pub results: ResultPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_normalization() {
        let params = ListParams::new(0, 0);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 1);

        let params = ListParams::new(3, 1000);
        assert_eq!(params.per_page, ListParams::MAX_PER_PAGE);
        assert_eq!(params.offset(), 2 * ListParams::MAX_PER_PAGE);
    }

    #[test]
    fn test_page_last_page() {
        let params = ListParams::new(1, 15);
        let page: Page<u32> = Page::new(vec![], 0, &params);
        assert_eq!(page.last_page(), 1);

        let page: Page<u32> = Page::new(vec![1, 2, 3], 31, &params);
        assert_eq!(page.last_page(), 3);

        let page: Page<u32> = Page::new(vec![1], 30, &params);
        assert_eq!(page.last_page(), 2);
    }

    #[test]
    fn test_filter_builder() {
        let filter = TestFilter::new()
            .with_sample_type(SpecimenType::Blood)
            .with_category("Hematology")
            .with_in_use(true);

        assert!(!filter.is_empty());
        assert_eq!(filter.sample_type, Some(SpecimenType::Blood));
        assert_eq!(filter.in_use, Some(true));
        assert!(filter.department.is_none());
    }

    #[test]
    fn test_empty_filter() {
        assert!(TestFilter::new().is_empty());
    }

    #[test]
    fn test_work_item_change_builder() {
        let change = WorkItemChange::new()
            .with_status(WorkStatus::InProgress)
            .with_notes("hemolyzed, redraw requested");

        assert_eq!(change.status, Some(WorkStatus::InProgress));
        assert!(change.results.is_none());
        assert!(change.notes.is_some());
    }
}
