// casewatch-core/src/infrastructure/mod.rs

pub mod adapters;
pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod sources;
