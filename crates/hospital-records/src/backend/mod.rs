//! Records Backends
//!
//! Abstraction over wherever the hospital keeps its records.

mod memory;

pub use memory::InMemoryRecords;

use async_trait::async_trait;

use crate::error::{RecordsError, Result};
use crate::model::{Department, Patient, PatientQuery, StaffMember, StaffQuery};

/// Records backend trait (Strategy pattern)
///
/// Implement this for each records system: an EHR API, a database, or the
/// in-memory demo data.
#[async_trait]
pub trait RecordsBackend: Send + Sync {
    /// Patients matching `query`, ordered by id
    async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<Patient>>;

    /// A single patient by id
    async fn get_patient(&self, id: &str) -> Result<Patient>;

    /// Staff members matching `query`, ordered by id
    async fn list_staff(&self, query: &StaffQuery) -> Result<Vec<StaffMember>>;

    /// A single staff member by id (case-insensitive)
    async fn get_staff(&self, id: &str) -> Result<StaffMember> {
        self.list_staff(&StaffQuery::default())
            .await?
            .into_iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| RecordsError::StaffNotFound(id.to_string()))
    }

    /// All departments, ordered by id
    async fn list_departments(&self) -> Result<Vec<Department>>;

    /// A single department by id (case-insensitive)
    async fn get_department(&self, id: &str) -> Result<Department> {
        self.list_departments()
            .await?
            .into_iter()
            .find(|d| d.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| RecordsError::DepartmentNotFound(id.to_string()))
    }

    /// Backend name
    fn name(&self) -> &str;
}
