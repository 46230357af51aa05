pub mod dispatcher;
pub mod job;
pub mod registry;

pub use dispatcher::JobDispatcher;
pub use job::{DispatchSummary, JobSpec, Phase, WorkerReport};
pub use registry::WorkerRegistry;
