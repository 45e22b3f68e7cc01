//! In-Memory Records
//!
//! For testing and demo purposes. Seeded with a small, fixed hospital.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::RecordsBackend;
use crate::error::{RecordsError, Result};
use crate::model::{Department, Patient, PatientQuery, StaffMember, StaffQuery, StaffRole};

/// Records held in memory
#[derive(Clone, Debug)]
pub struct InMemoryRecords {
    patients: Vec<Patient>,
    staff: Vec<StaffMember>,
    departments: Vec<Department>,
}

impl Default for InMemoryRecords {
    fn default() -> Self {
        Self::demo()
    }
}

impl InMemoryRecords {
    /// Build from explicit record sets; each set is kept sorted by id
    pub fn new(mut patients: Vec<Patient>, mut staff: Vec<StaffMember>, mut departments: Vec<Department>) -> Self {
        patients.sort_by(|a, b| a.id.cmp(&b.id));
        staff.sort_by(|a, b| a.id.cmp(&b.id));
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            patients,
            staff,
            departments,
        }
    }

    /// Demo hospital
    pub fn demo() -> Self {
        let departments = vec![
            Department::new("D-CARD", "Cardiology", 3),
            Department::new("D-EMER", "Emergency", 1),
            Department::new("D-NEUR", "Neurology", 4),
            Department::new("D-ONCO", "Oncology", 5),
            Department::new("D-PEDS", "Pediatrics", 2),
        ];

        let patients = vec![
            Patient::new("P-1001", "Mohamed", "Nazif", 1984, "D-CARD")
                .admitted(NaiveDate::from_ymd_opt(2024, 5, 2), "C-310"),
            Patient::new("P-1002", "Sarah", "Mitchell", 1991, "D-NEUR"),
            Patient::new("P-1003", "Mohamed", "Nasser", 1977, "D-EMER")
                .admitted(NaiveDate::from_ymd_opt(2024, 5, 9), "E-12"),
            Patient::new("P-1004", "Leila", "Haddad", 2015, "D-PEDS")
                .admitted(NaiveDate::from_ymd_opt(2024, 5, 6), "P-207"),
            Patient::new("P-1005", "James", "O'Connor", 1958, "D-ONCO")
                .discharged(NaiveDate::from_ymd_opt(2024, 4, 18)),
            Patient::new("P-1006", "Ana", "Souza", 1969, "D-CARD"),
        ];

        let staff = vec![
            StaffMember::new("S-201", "Amira", "Khalil", StaffRole::Doctor, "D-CARD"),
            StaffMember::new("S-202", "David", "Chen", StaffRole::Doctor, "D-NEUR"),
            StaffMember::new("S-203", "Grace", "Okafor", StaffRole::Nurse, "D-EMER"),
            StaffMember::new("S-204", "Tomas", "Novak", StaffRole::Nurse, "D-CARD"),
            StaffMember::new("S-205", "Priya", "Raman", StaffRole::Doctor, "D-PEDS"),
            StaffMember::new("S-206", "Lucas", "Martin", StaffRole::Technician, "D-ONCO"),
            StaffMember::new("S-207", "Helen", "Brooks", StaffRole::Administrator, "D-EMER"),
        ];

        Self::new(patients, staff, departments)
    }

    fn ensure_department(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) if !self.departments.iter().any(|d| d.id.eq_ignore_ascii_case(id)) => {
                Err(RecordsError::DepartmentNotFound(id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordsBackend for InMemoryRecords {
    async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<Patient>> {
        self.ensure_department(query.department_id.as_deref())?;
        Ok(self.patients.iter().filter(|p| query.matches(p)).cloned().collect())
    }

    async fn get_patient(&self, id: &str) -> Result<Patient> {
        self.patients
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .cloned()
            .ok_or_else(|| RecordsError::PatientNotFound(id.to_string()))
    }

    async fn list_staff(&self, query: &StaffQuery) -> Result<Vec<StaffMember>> {
        self.ensure_department(query.department_id.as_deref())?;
        Ok(self.staff.iter().filter(|s| query.matches(s)).cloned().collect())
    }

    async fn list_departments(&self) -> Result<Vec<Department>> {
        Ok(self.departments.clone())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
