//! External command execution with line-by-line progress extraction

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{BuildError, Result};
use crate::progress::{Policy, PolicyUpdate, ProgressEvent};

/// Runs external commands inside a fixed working directory
///
/// The process-wide current directory is never touched; every child is
/// spawned with an explicit one.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    working_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into() }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run `argv` to completion, feeding stdout through `policy`
    ///
    /// Updates are sent on `updates` in output order. The sender is dropped
    /// when the command finishes, so a receiver loop ends on its own.
    pub async fn run(
        &self,
        argv: &[String],
        mut policy: Policy,
        updates: UnboundedSender<PolicyUpdate>,
    ) -> Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BuildError::launch_failed("", "empty command line"))?;

        // Spawn reports a missing cwd as NotFound, which would read as a missing program
        if !self.working_dir.is_dir() {
            return Err(BuildError::launch_failed(
                program.clone(),
                format!("working directory {} does not exist", self.working_dir.display()),
            ));
        }

        debug!("Running {:?} in {}", argv, self.working_dir.display());

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BuildError::CommandNotFound { program: program.clone() },
                _ => BuildError::launch_failed(program.clone(), e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::launch_failed(program.clone(), "stdout not captured"))?;
        let stderr = child.stderr.take();

        let stderr_program = program.clone();
        let stderr_handle = tokio::spawn(async move {
            let Some(stderr) = stderr else { return };
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                match read_line_lossy(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        warn!(target: "build_output", program = %stderr_program, "{}", line)
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stopped reading stderr of {}: {}", stderr_program, e);
                        break;
                    }
                }
            }
        });

        if let Some(update) = policy.process(ProgressEvent::status(argv.join(" "))) {
            let _ = updates.send(update);
        }

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!(target: "build_output", program = %program, "{}", line);

            if let Some(update) = policy.process(ProgressEvent::output(line)) {
                // Receiver may be gone; the command still runs to completion
                let _ = updates.send(update);
            }
        }

        let status = child.wait().await?;
        let _ = stderr_handle.await;

        if status.success() {
            Ok(0)
        } else {
            Err(BuildError::CommandFailed { argv: argv.to_vec(), exit_code: status.code() })
        }
    }
}

/// Read one line, replacing invalid UTF-8 instead of failing on it
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string()))
}
