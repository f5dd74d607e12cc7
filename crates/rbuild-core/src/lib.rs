//! Core types for the rbuild distributed build pipeline
//!
//! This crate provides the platform catalog, the build job description
//! and the error types shared by every other rbuild crate.

pub mod build;
pub mod error;
pub mod job;
pub mod platform;

pub use build::{BuildRecord, BuildStatus};
pub use error::{Error, Result};
pub use job::{routing_key, validate_name, BuildJob};
pub use platform::{
    extension_for_package, Architecture, BuildSystem, BuildSystemKind, Catalog, Platform,
};
