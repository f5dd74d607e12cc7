//! Build pipeline orchestration
//!
//! The orchestrator drives one project through configure, compile and
//! package, translating every command's output into overall progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rbuild_config::Config;
use rbuild_core::{BuildJob, BuildSystem, BuildSystemKind, Catalog, Platform};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::{
    artifact,
    compositor::{ProgressRange, RangeCompositor, StatusUpdate},
    context::{BuildContext, BuildStage},
    error::{BuildError, Result},
    progress::{Dialect, Policy},
    runner::CommandRunner,
};

/// Build driver targets producing a signed APK, in order
pub const ANDROID_PACKAGE_TARGETS: [&str; 3] = ["apk_release", "apk_aligned", "apk_signed"];

/// What to build and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Operation id used in logs and build records
    pub op_id: String,
    pub platform: String,
    pub arch: String,
    pub build_system: BuildSystemKind,
    /// Extra generator arguments
    pub branding_options: Vec<String>,
    /// Package generators; the platform's list when empty
    pub package_types: Vec<String>,
    /// Directory owned by this build
    pub build_dir: PathBuf,
}

impl BuildOptions {
    pub fn new(
        platform: impl Into<String>,
        arch: impl Into<String>,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            op_id: "local".to_string(),
            platform: platform.into(),
            arch: arch.into(),
            build_system: BuildSystemKind::default(),
            branding_options: Vec::new(),
            package_types: Vec::new(),
            build_dir: build_dir.into(),
        }
    }

    /// Options for a broker job, building in `build_<platform>_<arch>_for_<op_id>`
    pub fn for_job(job: &BuildJob, build_root: &Path, build_system: BuildSystemKind) -> Result<Self> {
        job.validate()?;
        let dir_name = format!("build_{}_{}_for_{}", job.platform, job.arch, job.op_id);
        Ok(Self {
            op_id: job.op_id.clone(),
            platform: job.platform.clone(),
            arch: job.arch.clone(),
            build_system,
            branding_options: job.branding_options.clone(),
            package_types: job.package_types.clone(),
            build_dir: build_root.join(dir_name),
        })
    }

    pub fn with_op_id(mut self, op_id: impl Into<String>) -> Self {
        self.op_id = op_id.into();
        self
    }

    pub fn with_build_system(mut self, build_system: BuildSystemKind) -> Self {
        self.build_system = build_system;
        self
    }

    pub fn with_branding_options(mut self, options: Vec<String>) -> Self {
        self.branding_options = options;
        self
    }

    pub fn with_package_types(mut self, package_types: Vec<String>) -> Self {
        self.package_types = package_types;
        self
    }
}

/// Anything that can turn build options into package files
#[async_trait]
pub trait BuildPipeline: Send + Sync {
    /// Run the build, reporting progress on `status`
    async fn build(
        &self,
        options: &BuildOptions,
        status: UnboundedSender<StatusUpdate>,
    ) -> Result<Vec<PathBuf>>;
}

/// Removes a build directory on drop unless disarmed
#[derive(Debug)]
pub struct BuildDirGuard {
    path: PathBuf,
    armed: bool,
}

impl BuildDirGuard {
    /// Guard `path`; `keep` leaves the directory in place even on failure
    pub fn new(path: impl Into<PathBuf>, keep: bool) -> Self {
        Self { path: path.into(), armed: !keep }
    }

    /// Keep the directory
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BuildDirGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed build directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove build directory {}: {}", self.path.display(), e),
        }
    }
}

/// CMake/CPack based build pipeline
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    config: Config,
}

impl Orchestrator {
    /// Create an orchestrator for the configured project
    pub fn new(config: Config, catalog: Arc<Catalog>) -> Self {
        Self { catalog, config }
    }

    /// Override the project root
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.project.root = root.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn run_stages(
        &self,
        options: &BuildOptions,
        context: &mut BuildContext,
        compositor: &mut RangeCompositor,
    ) -> Result<Vec<PathBuf>> {
        compositor.enter(
            stage_range(BuildStage::Init),
            format!(
                "Start building project branding_options:\n{}",
                options.branding_options.join("\n")
            ),
        );

        let platform = self.catalog.lookup(&options.platform)?;
        let arch = platform.architecture(&options.arch)?;
        let build_system = self.config.build_system(options.build_system);

        let root = self.resolve_project_root()?;
        prepare_build_dir(&options.build_dir).await?;
        let guard = BuildDirGuard::new(&options.build_dir, self.config.project.keep_failed_build_dir);
        let runner = CommandRunner::new(&options.build_dir);

        context.advance(BuildStage::Configure);
        compositor.enter(stage_range(BuildStage::Configure), "Generate project build");
        let mut argv = vec![
            self.config.toolchain.cmake.clone(),
            root.to_string_lossy().into_owned(),
            options.build_system.generator_arg().to_string(),
        ];
        argv.extend(self.config.project.cmake_args.iter().cloned());
        if platform.is_android() {
            let toolchain_file = root.join(&self.config.project.android_toolchain_file);
            argv.push(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain_file.display()));
        } else {
            argv.push(format!("-DCMAKE_PREFIX_PATH={}", arch.default_install_prefix.display()));
        }
        argv.extend(options.branding_options.iter().cloned());
        run_step(&runner, argv, Dialect::Configure, compositor).await?;

        context.advance(BuildStage::Compile);
        compositor.enter(stage_range(BuildStage::Compile), "Build project");
        let dialect = Dialect::for_build_system(build_system.kind);
        run_step(&runner, build_system.target("install"), dialect, compositor).await?;

        context.advance(BuildStage::LocateArtifact);
        compositor.enter(stage_range(BuildStage::LocateArtifact), "Trying to get package file name");
        let file_name = artifact::package_file_name(&options.build_dir).await?;

        context.advance(BuildStage::Package);
        let package_range = stage_range(BuildStage::Package);
        compositor.enter(package_range, "Start build package");
        let artifacts = if platform.is_android() {
            self.package_android(&runner, &build_system, &file_name, package_range, compositor)
                .await?
        } else {
            self.package_cpack(&runner, platform, options, &file_name, package_range, compositor)
                .await?
        };

        guard.disarm();
        Ok(artifacts)
    }

    async fn package_cpack(
        &self,
        runner: &CommandRunner,
        platform: &Platform,
        options: &BuildOptions,
        file_name: &str,
        range: ProgressRange,
        compositor: &mut RangeCompositor,
    ) -> Result<Vec<PathBuf>> {
        let package_types = if options.package_types.is_empty() {
            &platform.package_types
        } else {
            &options.package_types
        };

        let mut artifacts = Vec::with_capacity(package_types.len());
        for (package_type, step_range) in package_types.iter().zip(range.split(package_types.len()))
        {
            let path = artifact::artifact_path(runner.working_dir(), file_name, package_type)?;
            compositor.enter(step_range, format!("Build {package_type} package"));

            let argv = vec![self.config.toolchain.cpack.clone(), "-G".to_string(), package_type.clone()];
            run_step(runner, argv, Dialect::Passthrough, compositor).await?;
            artifacts.push(path);
        }

        Ok(artifacts)
    }

    async fn package_android(
        &self,
        runner: &CommandRunner,
        build_system: &BuildSystem,
        file_name: &str,
        range: ProgressRange,
        compositor: &mut RangeCompositor,
    ) -> Result<Vec<PathBuf>> {
        let steps = range.split(ANDROID_PACKAGE_TARGETS.len());
        for (target, step_range) in ANDROID_PACKAGE_TARGETS.iter().zip(steps) {
            compositor.enter(step_range, format!("Build target {target}"));
            run_step(runner, build_system.target(target), Dialect::Passthrough, compositor).await?;
        }

        Ok(vec![artifact::artifact_path(runner.working_dir(), file_name, "APK")?])
    }

    fn resolve_project_root(&self) -> Result<PathBuf> {
        let root = &self.config.project.root;
        let invalid = || BuildError::InvalidProjectRoot { path: root.clone() };

        let resolved = root.canonicalize().map_err(|_| invalid())?;
        if !resolved.is_dir() {
            return Err(invalid());
        }
        Ok(resolved)
    }
}

#[async_trait]
impl BuildPipeline for Orchestrator {
    async fn build(
        &self,
        options: &BuildOptions,
        status: UnboundedSender<StatusUpdate>,
    ) -> Result<Vec<PathBuf>> {
        info!(
            "Building {} for {} {} in {}",
            options.op_id,
            options.platform,
            options.arch,
            options.build_dir.display()
        );

        let mut context = BuildContext::new(options.op_id.clone());
        let mut compositor = RangeCompositor::new(status);

        match self.run_stages(options, &mut context, &mut compositor).await {
            Ok(artifacts) => {
                let names: Vec<String> = artifacts
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect();
                compositor.enter(
                    stage_range(BuildStage::Done),
                    format!("Building finished successfully file_names: {names:?}"),
                );
                context.complete(artifacts.clone());
                info!(
                    "Build {} finished in {:.1}s",
                    options.op_id,
                    context.record().duration_secs
                );
                Ok(artifacts)
            }
            Err(e) => {
                let stage = context.stage();
                context.abort(&e);
                error!("Build {} aborted during {}: {}", options.op_id, stage, e);
                Err(e)
            }
        }
    }
}

fn stage_range(stage: BuildStage) -> ProgressRange {
    stage.range().unwrap_or_default()
}

/// Remove any previous build directory and create a fresh one
async fn prepare_build_dir(build_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(build_dir).await {
        Ok(()) => debug!("Removed stale build directory {}", build_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(build_dir).await?;
    Ok(())
}

/// Run one command, forwarding its progress through the compositor
async fn run_step(
    runner: &CommandRunner,
    argv: Vec<String>,
    dialect: Dialect,
    compositor: &RangeCompositor,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = runner.run(&argv, Policy::new(dialect), tx);
    let forward = async {
        while let Some(update) = rx.recv().await {
            compositor.on_policy_update(update);
        }
    };

    let (result, ()) = tokio::join!(run, forward);
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_for_job() {
        let job = BuildJob::new("abc", "linux", "x86_64", "/tmp").with_package_types(["DEB"]);
        let options =
            BuildOptions::for_job(&job, Path::new("/srv/builds"), BuildSystemKind::Make).unwrap();

        assert_eq!(options.build_dir, PathBuf::from("/srv/builds/build_linux_x86_64_for_abc"));
        assert_eq!(options.package_types, vec!["DEB"]);
        assert_eq!(options.build_system, BuildSystemKind::Make);
        assert_eq!(options.op_id, "abc");

        let job = BuildJob::new("x/../../victim", "linux", "x86_64", "/tmp");
        let result = BuildOptions::for_job(&job, Path::new("/srv/builds"), BuildSystemKind::Make);
        assert!(matches!(
            result,
            Err(BuildError::Core(rbuild_core::Error::InvalidName { field: "op_id", .. }))
        ));
    }

    #[test]
    fn test_build_dir_guard() {
        let temp_dir = tempfile::TempDir::new().unwrap();

        let removed = temp_dir.path().join("removed");
        std::fs::create_dir(&removed).unwrap();
        drop(BuildDirGuard::new(&removed, false));
        assert!(!removed.exists());

        let kept = temp_dir.path().join("kept");
        std::fs::create_dir(&kept).unwrap();
        drop(BuildDirGuard::new(&kept, true));
        assert!(kept.exists());

        let disarmed = temp_dir.path().join("disarmed");
        std::fs::create_dir(&disarmed).unwrap();
        BuildDirGuard::new(&disarmed, false).disarm();
        assert!(disarmed.exists());
    }
}
