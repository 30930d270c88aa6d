mod job;
mod registry;
mod state;

#[allow(unused_imports)]
pub use job::JobResult;
pub use job::{Job, Quote};
pub use registry::JobRegistry;
pub use state::{JobState, StateKind};
