//! Package artifact location and hand-off

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use rbuild_config::HandoffConfig;
use rbuild_core::{extension_for_package, Error as CoreError};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{BuildError, Result};

/// Package metadata file written by the generator into the build directory
pub const CPACK_CONFIG_FILE: &str = "CPackConfig.cmake";

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?mi)^\s*SET\(\s*CPACK_PACKAGE_FILE_NAME\s+"([^"]*)"\s*\)"#)
            .expect("Invalid regex")
    })
}

/// Extract the package file name from package metadata text
pub fn parse_package_file_name(content: &str) -> Option<String> {
    file_name_pattern()
        .captures(content)
        .map(|caps| caps[1].to_string())
        .filter(|name| !name.is_empty())
}

/// Read the package file name from `CPackConfig.cmake` in `build_dir`
pub async fn package_file_name(build_dir: &Path) -> Result<String> {
    let path = build_dir.join(CPACK_CONFIG_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BuildError::ArtifactNameNotFound { path });
        }
        Err(e) => return Err(e.into()),
    };

    let name = parse_package_file_name(&content)
        .ok_or_else(|| BuildError::ArtifactNameNotFound { path: path.clone() })?;
    debug!("Package file name is {}", name);
    Ok(name)
}

/// Path of the package a generator produces
pub fn artifact_path(build_dir: &Path, file_name: &str, package_type: &str) -> Result<PathBuf> {
    let extension = extension_for_package(package_type)
        .ok_or_else(|| CoreError::UnknownPackageType { name: package_type.to_string() })?;
    Ok(build_dir.join(format!("{file_name}.{extension}")))
}

/// Post-install step that delivers a finished package
#[async_trait]
pub trait ArtifactHandoff: Send + Sync {
    /// Deliver `artifact` to `destination` and describe the result
    async fn post_install_step(&self, artifact: &Path, destination: &str) -> Result<Value>;
}

/// Copies the package into the destination directory
#[derive(Debug, Clone, Default)]
pub struct CopyHandoff;

#[async_trait]
impl ArtifactHandoff for CopyHandoff {
    async fn post_install_step(&self, artifact: &Path, destination: &str) -> Result<Value> {
        if destination.trim().is_empty() {
            return Err(BuildError::handoff("no destination given"));
        }
        let file_name = artifact
            .file_name()
            .ok_or_else(|| BuildError::handoff(format!("{} has no file name", artifact.display())))?;

        let destination = PathBuf::from(destination);
        tokio::fs::create_dir_all(&destination).await.map_err(|e| {
            BuildError::handoff(format!("cannot create {}: {e}", destination.display()))
        })?;

        let target = destination.join(file_name);
        tokio::fs::copy(artifact, &target).await.map_err(|e| {
            BuildError::handoff(format!("cannot copy {}: {e}", artifact.display()))
        })?;

        info!("Copied {} to {}", artifact.display(), target.display());
        Ok(json!({ "path": target.to_string_lossy() }))
    }
}

/// Leaves the package in the build directory and reports where it is
#[derive(Debug, Clone, Default)]
pub struct KeepHandoff;

#[async_trait]
impl ArtifactHandoff for KeepHandoff {
    async fn post_install_step(&self, artifact: &Path, _destination: &str) -> Result<Value> {
        if !artifact.is_file() {
            return Err(BuildError::handoff(format!("{} does not exist", artifact.display())));
        }
        Ok(json!({ "path": artifact.to_string_lossy() }))
    }
}

/// Hand-off selected by configuration
pub fn handoff_from_config(config: &HandoffConfig) -> Arc<dyn ArtifactHandoff> {
    match config {
        HandoffConfig::Copy => Arc::new(CopyHandoff),
        HandoffConfig::Keep => Arc::new(KeepHandoff),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const CPACK_CONFIG: &str = r#"
# This file will be configured to contain variables for CPack.
SET(CPACK_GENERATOR "DEB")
SET(CPACK_PACKAGE_FILE_NAME "app-1.2.0-Linux")
SET(CPACK_PACKAGE_FILE_NAME "ignored")
"#;

    #[test]
    fn test_parse_package_file_name() {
        assert_eq!(parse_package_file_name(CPACK_CONFIG).as_deref(), Some("app-1.2.0-Linux"));
        assert_eq!(parse_package_file_name("set(cpack_package_file_name \"x\")").as_deref(), Some("x"));
        assert_eq!(parse_package_file_name("SET(CPACK_GENERATOR \"DEB\")"), None);
    }

    #[tokio::test]
    async fn test_package_file_name_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = package_file_name(temp_dir.path()).await;
        assert!(matches!(result, Err(BuildError::ArtifactNameNotFound { .. })));
    }

    #[test]
    fn test_artifact_path() {
        let dir = Path::new("/build");
        assert_eq!(artifact_path(dir, "app-1.0", "TGZ").unwrap(), dir.join("app-1.0.tar.gz"));
        assert!(matches!(
            artifact_path(dir, "app-1.0", "SNAP"),
            Err(BuildError::Core(CoreError::UnknownPackageType { .. }))
        ));
    }

    #[tokio::test]
    async fn test_copy_handoff() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("app-1.0.deb");
        std::fs::write(&artifact, b"package").unwrap();
        let destination = temp_dir.path().join("out");

        let result = CopyHandoff
            .post_install_step(&artifact, destination.to_str().unwrap())
            .await
            .unwrap();

        let copied = destination.join("app-1.0.deb");
        assert!(copied.is_file());
        assert_eq!(result["path"], json!(copied.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_copy_handoff_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let result = CopyHandoff
            .post_install_step(&temp_dir.path().join("missing.deb"), "/tmp")
            .await;
        assert!(matches!(result, Err(BuildError::ArtifactHandoffFailed { .. })));
    }

    #[tokio::test]
    async fn test_copy_handoff_rejects_empty_destination() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("app-1.0.deb");
        std::fs::write(&artifact, b"package").unwrap();
        let cwd_copy = std::env::current_dir().unwrap().join("app-1.0.deb");

        for destination in ["", "  "] {
            let result = CopyHandoff.post_install_step(&artifact, destination).await;
            assert!(matches!(result, Err(BuildError::ArtifactHandoffFailed { .. })));
        }
        assert!(!cwd_copy.exists());
    }
}
