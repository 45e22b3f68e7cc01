//! Patient Lookup Tools

use std::sync::Arc;

use async_trait::async_trait;
use medassist_core::{
    Result as CoreResult, Tool, ToolDefinition,
    tool::ParameterSchema,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::parse_args;
use crate::backend::RecordsBackend;
use crate::model::PatientQuery;

/// Tool listing patients, optionally by department and status
pub struct ListPatientsTool {
    backend: Arc<dyn RecordsBackend>,
}

impl ListPatientsTool {
    pub fn new(backend: Arc<dyn RecordsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListPatientsTool {
    fn definition(&self) -> ToolDefinition {
        let mut status = ParameterSchema::optional("status", "string", "Only patients with this status");
        status.enum_values = Some(vec![json!("admitted"), json!("outpatient"), json!("discharged")]);

        ToolDefinition {
            name: "list_patients".into(),
            description: "List hospital patients with their ids, names, department and admission status.".into(),
            parameters: vec![
                ParameterSchema::optional("department_id", "string", "Only patients of this department (e.g., 'D-CARD')"),
                ParameterSchema::optional(
                    "department_name",
                    "string",
                    "Department name, used when the id is not known",
                ),
                status,
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let query: PatientQuery = parse_args(arguments)?;
        let patients = self.backend.list_patients(&query).await?;

        tracing::debug!(count = patients.len(), "Listed patients");
        Ok(json!({
            "count": patients.len(),
            "patients": patients,
        }))
    }
}

#[derive(Deserialize)]
struct GetPatientArgs {
    patient_id: String,
}

/// Tool fetching one patient record with its department
pub struct GetPatientTool {
    backend: Arc<dyn RecordsBackend>,
}

impl GetPatientTool {
    pub fn new(backend: Arc<dyn RecordsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetPatientTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_patient".into(),
            description: "Get a patient's full record, including department and room.".into(),
            parameters: vec![
                ParameterSchema::required("patient_id", "string", "Patient id (e.g., 'P-1001')"),
                ParameterSchema::optional(
                    "patient_name",
                    "string",
                    "Patient name, used when the id is not known",
                ),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let args: GetPatientArgs = parse_args(arguments)?;
        let patient = self.backend.get_patient(&args.patient_id).await?;
        let department = self.backend.get_department(&patient.department_id).await.ok();

        Ok(json!({
            "patient": patient,
            "department": department,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryRecords;
    use medassist_core::AgentError;

    fn backend() -> Arc<dyn RecordsBackend> {
        Arc::new(InMemoryRecords::demo())
    }

    #[tokio::test]
    async fn test_list_patients_filters() {
        let tool = ListPatientsTool::new(backend());

        let all = tool.execute(&json!({})).await.unwrap();
        assert_eq!(all["count"], 6);

        let admitted = tool
            .execute(&json!({"status": "admitted", "department_name": "ignored"}))
            .await
            .unwrap();
        assert_eq!(admitted["count"], 3);
        assert_eq!(admitted["patients"][0]["id"], "P-1001");
    }

    #[tokio::test]
    async fn test_get_patient() {
        let tool = GetPatientTool::new(backend());

        let record = tool.execute(&json!({"patient_id": "P-1004"})).await.unwrap();
        assert_eq!(record["patient"]["first_name"], "Leila");
        assert_eq!(record["patient"]["room"], "P-207");
        assert_eq!(record["department"]["name"], "Pediatrics");
    }

    #[tokio::test]
    async fn test_get_patient_errors() {
        let tool = GetPatientTool::new(backend());

        assert!(tool.validate(&json!({"patient_name": "Nazif"})).is_err());

        let err = tool.execute(&json!({"patient_id": "P-0"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(msg) if msg.contains("P-0")));
    }
}
