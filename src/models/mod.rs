pub mod extraction;
pub mod job;
