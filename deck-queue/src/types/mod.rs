pub mod ctx;
pub mod events;
pub mod ids;
pub mod job;

pub use ctx::{ActorRole, JobCtx};
pub use events::JobEvent;
pub use ids::{JobId, WorkerId};
pub use job::{bound_error, ErrorKind, Job, JobStatus, JobType, MAX_ERROR_BYTES};
