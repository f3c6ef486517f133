// casewatch-core/src/lib.rs

// 1. Documentation: public items are documented where it helps, not enforced
#![allow(missing_docs)]
// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts for the outside world: where tables come from, where records go.
pub mod ports;

// 2. Domain (Business core)
// Records, configuration, normalization, validation, metrics.
// Depends on NOTHING else (no infra, no app).
pub mod domain;

// 3. Infrastructure (Adapters)
// HTTP/file sources, CSV codec, DuckDB store, config loading.
// Depends on Domain and Ports.
pub mod infrastructure;

// 4. Application (Use Cases)
// Fetch with fallback, persist, pipeline orchestration, clean.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
// use casewatch_core::PipelineError;
pub use error::PipelineError;
