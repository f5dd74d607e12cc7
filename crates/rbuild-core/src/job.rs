//! Build job description

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Broker routing key addressing the worker for a platform/architecture pair
pub fn routing_key(platform: &str, arch: &str) -> String {
    format!("{platform}_{arch}")
}

/// Check that `value` is safe to embed in a build directory name
///
/// Only ASCII letters, digits, `.`, `_` and `-` are accepted, and the value
/// must not be empty or start with a dot.
pub fn validate_name(field: &'static str, value: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if value.is_empty() || value.starts_with('.') || !value.chars().all(allowed) {
        return Err(Error::InvalidName { field, value: value.to_string() });
    }
    Ok(())
}

/// One build request, created on receipt and dropped when the build ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    /// Operation id, echoed as correlation id on every envelope
    pub op_id: String,
    /// Target platform name
    pub platform: String,
    /// Target architecture name or bit count
    pub arch: String,
    /// Extra generator arguments, in order
    pub branding_options: Vec<String>,
    /// Requested package generators, without duplicates
    pub package_types: Vec<String>,
    /// Opaque hand-off destination
    pub destination: String,
}

impl BuildJob {
    /// Create a job with no branding options or package types
    pub fn new(
        op_id: impl Into<String>,
        platform: impl Into<String>,
        arch: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            op_id: op_id.into(),
            platform: platform.into(),
            arch: arch.into(),
            branding_options: Vec::new(),
            package_types: Vec::new(),
            destination: destination.into(),
        }
    }

    /// Set the branding options
    pub fn with_branding_options(mut self, options: Vec<String>) -> Self {
        self.branding_options = options;
        self
    }

    /// Set the package types, dropping empty entries and repeats
    pub fn with_package_types<I, S>(mut self, package_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_types.clear();
        for package_type in package_types {
            let package_type = package_type.into();
            if !package_type.is_empty() && !self.package_types.contains(&package_type) {
                self.package_types.push(package_type);
            }
        }
        self
    }

    /// Reject ids and names that would escape the build root
    pub fn validate(&self) -> Result<()> {
        validate_name("op_id", &self.op_id)?;
        validate_name("platform", &self.platform)?;
        validate_name("arch", &self.arch)
    }

    /// Routing key of the worker this job targets
    pub fn routing_key(&self) -> String {
        routing_key(&self.platform, &self.arch)
    }
}
