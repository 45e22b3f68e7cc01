//! Domain Models
//!
//! Records as the lookup tools return them. Field names follow the
//! `first_name` / `last_name` / `name` convention the entity resolver reads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A hospital department
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Department identifier (e.g., "D-CARD")
    pub id: String,

    /// Display name (e.g., "Cardiology")
    pub name: String,

    /// Floor the department occupies
    pub floor: u8,
}

impl Department {
    pub fn new(id: impl Into<String>, name: impl Into<String>, floor: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            floor,
        }
    }
}

/// Where a patient currently stands with the hospital
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Admitted,
    Outpatient,
    Discharged,
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admitted => write!(f, "admitted"),
            Self::Outpatient => write!(f, "outpatient"),
            Self::Discharged => write!(f, "discharged"),
        }
    }
}

/// A patient record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient identifier (e.g., "P-1001")
    pub id: String,

    pub first_name: String,

    pub last_name: String,

    pub year_of_birth: u16,

    /// Department responsible for the patient
    pub department_id: String,

    pub status: PatientStatus,

    /// Admission date, for admitted and discharged patients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admitted_on: Option<NaiveDate>,

    /// Assigned room, while admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Patient {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        year_of_birth: u16,
        department_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            year_of_birth,
            department_id: department_id.into(),
            status: PatientStatus::Outpatient,
            admitted_on: None,
            room: None,
        }
    }

    /// Mark as admitted into `room`
    #[must_use]
    pub fn admitted(mut self, on: Option<NaiveDate>, room: impl Into<String>) -> Self {
        self.status = PatientStatus::Admitted;
        self.admitted_on = on;
        self.room = Some(room.into());
        self
    }

    /// Mark as discharged
    #[must_use]
    pub fn discharged(mut self, admitted_on: Option<NaiveDate>) -> Self {
        self.status = PatientStatus::Discharged;
        self.admitted_on = admitted_on;
        self.room = None;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Staff role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Doctor,
    Nurse,
    Technician,
    Administrator,
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Doctor => write!(f, "doctor"),
            Self::Nurse => write!(f, "nurse"),
            Self::Technician => write!(f, "technician"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

/// A staff member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    /// Staff identifier (e.g., "S-201")
    pub id: String,

    pub first_name: String,

    pub last_name: String,

    pub role: StaffRole,

    pub department_id: String,
}

impl StaffMember {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: StaffRole,
        department_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            department_id: department_id.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Filter for patient listings; unset fields match everything
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatientQuery {
    #[serde(default)]
    pub department_id: Option<String>,

    #[serde(default)]
    pub status: Option<PatientStatus>,
}

impl PatientQuery {
    pub fn matches(&self, patient: &Patient) -> bool {
        self.department_id
            .as_deref()
            .is_none_or(|id| patient.department_id.eq_ignore_ascii_case(id))
            && self.status.is_none_or(|status| patient.status == status)
    }
}

/// Filter for staff listings; unset fields match everything
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StaffQuery {
    #[serde(default)]
    pub department_id: Option<String>,

    #[serde(default)]
    pub role: Option<StaffRole>,
}

impl StaffQuery {
    pub fn matches(&self, member: &StaffMember) -> bool {
        self.department_id
            .as_deref()
            .is_none_or(|id| member.department_id.eq_ignore_ascii_case(id))
            && self.role.is_none_or(|role| member.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patient_serializes_resolver_fields() {
        let patient = Patient::new("P-1", "Mohamed", "Nazif", 1984, "D-CARD");
        let value = serde_json::to_value(&patient).unwrap();

        assert_eq!(value["id"], "P-1");
        assert_eq!(value["first_name"], "Mohamed");
        assert_eq!(value["last_name"], "Nazif");
        assert_eq!(value["status"], "outpatient");
        assert!(value.get("room").is_none());
    }

    #[test]
    fn test_admission_lifecycle() {
        let patient = Patient::new("P-1", "Ana", "Silva", 1990, "D-NEUR")
            .admitted(NaiveDate::from_ymd_opt(2024, 3, 1), "N-204");
        assert_eq!(patient.status, PatientStatus::Admitted);
        assert_eq!(patient.room.as_deref(), Some("N-204"));

        let patient = patient.discharged(NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(patient.status, PatientStatus::Discharged);
        assert!(patient.room.is_none());
    }

    #[test]
    fn test_queries() {
        let patient = Patient::new("P-1", "Ana", "Silva", 1990, "D-NEUR");

        let query: PatientQuery = serde_json::from_value(json!({"department_id": "d-neur"})).unwrap();
        assert!(query.matches(&patient));

        let query: PatientQuery = serde_json::from_value(json!({"status": "admitted"})).unwrap();
        assert!(!query.matches(&patient));

        assert!(PatientQuery::default().matches(&patient));

        let nurse = StaffMember::new("S-1", "Grace", "Okafor", StaffRole::Nurse, "D-EMER");
        let query: StaffQuery = serde_json::from_value(json!({"role": "doctor"})).unwrap();
        assert!(!query.matches(&nurse));
        assert_eq!(nurse.full_name(), "Grace Okafor");
    }
}
