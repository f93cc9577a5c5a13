//! CLI command implementations.

pub mod config;
pub mod remote;
pub mod repository;
pub mod versions;
