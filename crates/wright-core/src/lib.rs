//! Core data types for wright: versions and constraints, install profiles,
//! validated requirements, manifest loading, and resolver configuration.

pub mod config;
pub mod manifest;
pub mod profile;
pub mod requirement;
pub mod version;
