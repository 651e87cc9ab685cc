// Lookout: review monitoring across the app store, the support forum,
// and the public review site.
//
// This is the library root. Each module corresponds to a stage of the
// monitoring pipeline: sources fetch, detect classifies against the
// seen-set, dispatch and notify deliver alerts.

pub mod config;
pub mod db;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod sources;
pub mod status;
