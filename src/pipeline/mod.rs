// Monitoring pipeline: one run per source, fetch through notify.

pub mod monitor;

pub use monitor::{run, RunSummary};
