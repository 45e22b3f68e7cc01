//! Staff Directory Tools

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
use crate::model::StaffQuery;

/// Tool listing staff members, optionally by department and role
pub struct ListStaffTool {
    backend: Arc<dyn RecordsBackend>,
}

impl ListStaffTool {
    pub fn new(backend: Arc<dyn RecordsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListStaffTool {
    fn definition(&self) -> ToolDefinition {
        let mut role = ParameterSchema::optional("role", "string", "Only staff with this role");
        role.enum_values = Some(vec![
            json!("doctor"),
            json!("nurse"),
            json!("technician"),
            json!("administrator"),
        ]);

        ToolDefinition {
            name: "list_staff".into(),
            description: "List hospital staff (doctors, nurses, technicians, administrators) with their ids and departments.".into(),
            parameters: vec![
                ParameterSchema::optional("department_id", "string", "Only staff of this department"),
                ParameterSchema::optional(
                    "department_name",
                    "string",
                    "Department name, used when the id is not known",
                ),
                role,
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let query: StaffQuery = parse_args(arguments)?;
        let staff = self.backend.list_staff(&query).await?;

        Ok(json!({
            "count": staff.len(),
            "staff": staff,
        }))
    }
}

#[derive(Deserialize)]
struct GetStaffArgs {
    staff_id: String,
}

/// Tool fetching one staff member with their department
pub struct GetStaffTool {
    backend: Arc<dyn RecordsBackend>,
}

impl GetStaffTool {
    pub fn new(backend: Arc<dyn RecordsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetStaffTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_staff".into(),
            description: "Get a staff member's record, including role and department.".into(),
            parameters: vec![
                ParameterSchema::required("staff_id", "string", "Staff id (e.g., 'S-201')"),
                ParameterSchema::optional("staff_name", "string", "Staff member name, used when the id is not known"),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let args: GetStaffArgs = parse_args(arguments)?;
        let member = self.backend.get_staff(&args.staff_id).await?;
        let department = self.backend.get_department(&member.department_id).await.ok();

        Ok(json!({
            "staff_member": member,
            "department": department,
        }))
    }
}
