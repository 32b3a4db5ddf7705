// Batch video processing: worker pool and run summary

pub mod orchestrator;
pub mod types;
