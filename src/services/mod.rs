pub mod adapters;
pub mod encoding;
pub mod inference;
pub mod pipeline;
pub mod polling;
pub mod reaper;
pub mod store;
pub mod submission;
pub mod worker;
