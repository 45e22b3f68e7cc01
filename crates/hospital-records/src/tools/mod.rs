//! Records Lookup Tools
//!
//! In-process tools over a [`RecordsBackend`]. Listing tools answer with
//! `{"<collection>": [...], "count": n}`, the shape the entity resolver
//! reads candidates from.

mod departments;
mod patients;
mod staff;

pub use departments::ListDepartmentsTool;
pub use patients::{GetPatientTool, ListPatientsTool};
pub use staff::{GetStaffTool, ListStaffTool};

use std::sync::Arc;

use medassist_core::{AgentError, ToolRegistry};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::RecordsBackend;

/// Register every records tool against `backend`
pub fn register_records_tools(registry: &mut ToolRegistry, backend: &Arc<dyn RecordsBackend>) {
    registry.register(ListPatientsTool::new(Arc::clone(backend)));
    registry.register(GetPatientTool::new(Arc::clone(backend)));
    registry.register(ListStaffTool::new(Arc::clone(backend)));
    registry.register(GetStaffTool::new(Arc::clone(backend)));
    registry.register(ListDepartmentsTool::new(Arc::clone(backend)));
}

/// A registry holding only the records tools
pub fn records_registry(backend: Arc<dyn RecordsBackend>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_records_tools(&mut registry, &backend);
    registry
}

/// Decode tool arguments; unknown keys (such as unresolved `*_name`
/// arguments) are ignored
fn parse_args<T: DeserializeOwned>(arguments: &Value) -> medassist_core::Result<T> {
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| AgentError::ToolValidation(e.to_string()))
}
