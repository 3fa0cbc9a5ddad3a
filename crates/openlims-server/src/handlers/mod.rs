pub mod catalog;
pub mod patients;
pub mod reports;
pub mod results;
pub mod samples;
pub mod settings;
pub mod system;

use serde::Deserialize;

use openlims_storage::ListParams;

/// `?page=` / `?per_page=` query parameters shared by the list endpoints.
#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(ListParams::DEFAULT_PER_PAGE),
        )
    }
}
