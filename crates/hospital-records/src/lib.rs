//! # hospital-records
//!
//! Hospital records domain for the MedAssist agent: patients, staff and
//! departments, a records backend abstraction, and the lookup tools the
//! agent calls.
//!
//! ## Name resolution
//!
//! Users rarely know record ids. Tools that take an id also declare the
//! matching `*_name` parameter; the agent resolves the name against the
//! listing tools before the call runs:
//!
//! ```text
//! ┌──────────────────────────┐      ┌───────────────────────────────┐
//! │ get_patient              │      │ list_patients                 │
//! │ { patient_name:          │ ───▶ │ Mohamed Nazif  P-1001   92.3% │
//! │   "Mohamed Nasif" }      │      │ Mohamed Nasser P-1003   78.6% │
//! └──────────────────────────┘      └───────────────┬───────────────┘
//!                                                   ▼
//!                          { patient_id: "P-1001", _fuzzyMatchInfo: {...} }
//! ```

pub mod backend;
pub mod error;
pub mod model;
pub mod tools;

pub use backend::{InMemoryRecords, RecordsBackend};
pub use error::{RecordsError, Result};
pub use model::{Department, Patient, PatientQuery, PatientStatus, StaffMember, StaffQuery, StaffRole};
pub use tools::{records_registry, register_records_tools};

/// System prompt for the hospital assistant agent
pub const HOSPITAL_ASSISTANT_PROMPT: &str = r"You are MedAssist, an assistant for hospital staff. You answer questions about patients, staff and departments using the hospital records tools.

## Working with records

1. Never guess record contents. Look them up with the tools before answering.
2. When you only know a name, pass it as `patient_name`, `staff_name` or `department_name`; the system resolves it to an id for you.
3. If a tool result carries `_fuzzyMatchInfo`, the name was matched approximately or matched more than one record. Tell the user which record you used (for example: did you mean Mohamed Nazif?) and mention any `ties`.
4. If a lookup fails, say so plainly and ask for a more specific name or id.

## Tools Available

- `list_patients` - Patients, optionally by department or status
- `get_patient` - One patient's full record
- `list_staff` - Staff, optionally by department or role
- `get_staff` - One staff member with their department
- `list_departments` - All departments

Keep answers short and factual. Do not give medical advice.";
