pub mod config;
pub mod job;
pub mod watch;

pub use config::ServerConfig;
pub use job::{JobSnapshot, JobStatus};
pub use watch::{Watch, WatchForm, WatchView};
