//! Job lifecycle - records, the registry that owns them, and the supervisor that feeds them
//!
//! - record: JobRecord state machine (`Running -> Completed`) and JobSnapshot
//! - registry: shared map of records with timed reclamation
//! - supervisor: spawns artifacts and streams their output into records

pub mod record;
pub mod registry;
pub mod supervisor;

pub use record::{JobRecord, JobSnapshot, JobState, JobStatus};
pub use registry::{JobHandle, JobRegistry};
pub use supervisor::{StartOutcome, Supervisor, TIMEOUT_EXIT_CODE};
