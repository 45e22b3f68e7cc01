//! Department Listing Tool

use std::sync::Arc;

use async_trait::async_trait;
use medassist_core::{Result as CoreResult, Tool, ToolDefinition};
use serde_json::{Value, json};

use crate::backend::RecordsBackend;

pub struct ListDepartmentsTool {
    backend: Arc<dyn RecordsBackend>,
}

impl ListDepartmentsTool {
    pub fn new(backend: Arc<dyn RecordsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListDepartmentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_departments".into(),
            description: "List hospital departments with their ids, names and floors.".into(),
            parameters: vec![],
            has_side_effects: false,
        }
    }

    async fn execute(&self, _arguments: &Value) -> CoreResult<Value> {
        let departments = self.backend.list_departments().await?;
        Ok(json!({
            "count": departments.len(),
            "departments": departments,
        }))
    }
}
