//! Reconciliation tooling for recruiting pipeline applications whose Application Step
//! Result (ASR) scores were corrected after the fact.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
