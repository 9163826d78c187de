//! Agent identity and the persistent record type

pub mod id;
pub mod record;

pub use id::{generate_id, parse_label, validate_label, validate_name, RESERVED_LABEL_PREFIX};
pub use record::{AgentRecord, AgentStatus, ExitReason, TerminateMode, TimeoutReason};
