//! Error Types for Hospital Records

use medassist_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordsError>;

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Staff member not found: {0}")]
    StaffNotFound(String),

    #[error("Department not found: {0}")]
    DepartmentNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Records backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RecordsError> for AgentError {
    fn from(err: RecordsError) -> Self {
        match err {
            RecordsError::InvalidArgument(msg) => Self::ToolValidation(msg),
            RecordsError::Serialization(e) => Self::Json(e),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}
