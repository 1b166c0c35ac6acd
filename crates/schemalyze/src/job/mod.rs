pub mod record;
pub mod status;

pub use record::{JobRecord, JobStatusView, NewJob};
pub use status::JobStatus;
