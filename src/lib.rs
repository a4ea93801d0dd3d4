//! Cheque extraction service
//!
//! This library provides the asynchronous job lifecycle behind the cheque
//! extractor: submission, a shared job store, a worker pool running the
//! detection and recognition pipeline, and pollable results.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
