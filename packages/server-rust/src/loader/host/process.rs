//! Process-per-call module host.
//!
//! `describe` and `invoke` each spawn the module executable with stdin and
//! stdout piped, exchange one JSON line in each direction and wait for exit.
//! The child is spawned with `kill_on_drop` and owned by the call's
//! isolation boundary, so a cancelled request kills it.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataservice_core::protocol::{DESCRIBE_COMMAND, INVOKE_COMMAND};
use dataservice_core::{
    ExecutionContext, InvokeReply, InvokeRequest, ModuleManifest, OperationOutput,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

use super::{reply_into_result, require_module_file, ModuleHost};
use crate::loader::boundary::{BoundaryPurpose, BoundaryTracker};
use crate::loader::error::{InvokeError, ModuleLoadError};
use crate::loader::metadata::ModuleCoordinates;
use crate::service::DispatchStage;

/// Runs every module call in a fresh child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessModuleHost {
    boundaries: BoundaryTracker,
}

impl ProcessModuleHost {
    /// Creates a host reporting to `boundaries`.
    #[must_use]
    pub fn new(boundaries: BoundaryTracker) -> Self {
        Self { boundaries }
    }
}

#[async_trait]
impl ModuleHost for ProcessModuleHost {
    async fn describe(&self, path: &Path) -> Result<ModuleManifest, ModuleLoadError> {
        require_module_file(path).await?;
        let mut boundary = self.boundaries.open(path, BoundaryPurpose::Describe);

        let child = spawn(path, &[DESCRIBE_COMMAND], false).await?;
        let exchange = exchange(boundary.attach(child), None)
            .await
            .map_err(|err| protocol_error(path, &format!("I/O failure: {err}")))?;

        if !exchange.status.success() {
            return Err(ModuleLoadError::Exited {
                path: path.to_path_buf(),
                status: exchange.status.to_string(),
                stderr: exchange.stderr.trim().to_string(),
            });
        }

        let line = exchange
            .reply_line()
            .ok_or_else(|| protocol_error(path, "no manifest on stdout"))?;
        serde_json::from_str(line)
            .map_err(|err| protocol_error(path, &format!("malformed manifest: {err}")))
    }

    async fn invoke(
        &self,
        coordinates: &ModuleCoordinates,
        ctx: &ExecutionContext,
    ) -> Result<OperationOutput, InvokeError> {
        let path = coordinates.path.as_path();
        require_module_file(path).await?;
        let mut boundary = self.boundaries.open(path, BoundaryPurpose::Invoke);

        let request = InvokeRequest {
            type_name: coordinates.type_name.clone(),
            context: ctx.clone(),
        };
        let line = serde_json::to_string(&request)
            .map_err(|err| crashed(coordinates, &err.to_string()))?;

        let child = spawn(path, &[INVOKE_COMMAND, &coordinates.type_name], true).await?;
        debug!(
            request_id = %ctx.request_id,
            stage = DispatchStage::Executing.as_str(),
            boundary = boundary.id(),
            type_name = %coordinates.type_name,
            "executing operation in module process"
        );
        let exchange = exchange(boundary.attach(child), Some(line))
            .await
            .map_err(|err| crashed(coordinates, &format!("I/O failure: {err}")))?;

        let Some(reply_line) = exchange.reply_line() else {
            return Err(crashed(coordinates, &exchange.failure_summary("no reply on stdout")));
        };
        match serde_json::from_str::<InvokeReply>(reply_line) {
            Ok(reply) => reply_into_result(reply, coordinates),
            Err(err) => Err(crashed(
                coordinates,
                &exchange.failure_summary(&format!("malformed reply: {err}")),
            )),
        }
    }

    fn boundaries(&self) -> &BoundaryTracker {
        &self.boundaries
    }
}

// ---------------------------------------------------------------------------
// Child process plumbing
// ---------------------------------------------------------------------------

/// Everything a module wrote before exiting.
struct Exchange {
    stdout: String,
    stderr: String,
    status: ExitStatus,
}

impl Exchange {
    /// First non-blank stdout line.
    fn reply_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|line| !line.is_empty())
    }

    fn failure_summary(&self, problem: &str) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{problem} (exit status {})", self.status)
        } else {
            format!("{problem} (exit status {}): {stderr}", self.status)
        }
    }
}

/// `ETXTBSY`: the executable is still open for writing, usually because a
/// new copy of the module is being deployed over it.
const TEXT_FILE_BUSY: i32 = 26;
const SPAWN_ATTEMPTS: u64 = 5;

async fn spawn(path: &Path, args: &[&str], with_stdin: bool) -> Result<Child, ModuleLoadError> {
    let mut command = Command::new(path);
    command
        .args(args)
        .stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(module = %path.display(), ?args, "spawning module process");

    let mut attempt = 1;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(err) if err.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                debug!(module = %path.display(), attempt, "module file busy, retrying spawn");
                tokio::time::sleep(Duration::from_millis(10 * attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(ModuleLoadError::Spawn {
                    path: path.to_path_buf(),
                    source: Arc::new(err),
                })
            }
        }
    }
}

/// Writes `input` (if any) as one line, then drains stdout and stderr
/// concurrently and waits for the child to exit.
async fn exchange(child: &mut Child, input: Option<String>) -> std::io::Result<Exchange> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let write = async move {
        let (Some(mut stdin), Some(line)) = (stdin, input) else {
            return Ok(());
        };
        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        }
        .await;
        match result {
            // The module may exit without reading its input.
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };
    let read_stdout = async move {
        let mut buf = String::new();
        if let Some(mut out) = stdout {
            out.read_to_string(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };
    let read_stderr = async move {
        let mut buf = String::new();
        if let Some(mut err) = stderr {
            err.read_to_string(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let (written, stdout, stderr) = tokio::join!(write, read_stdout, read_stderr);
    written?;
    let stdout = stdout?;
    let stderr = stderr?;
    let status = child.wait().await?;

    if !stderr.trim().is_empty() {
        debug!(stderr = %stderr.trim(), "module stderr");
    }

    Ok(Exchange {
        stdout,
        stderr,
        status,
    })
}

fn protocol_error(path: &Path, message: &str) -> ModuleLoadError {
    ModuleLoadError::Protocol {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn crashed(coordinates: &ModuleCoordinates, message: &str) -> InvokeError {
    InvokeError::Crashed {
        path: coordinates.path.clone(),
        type_name: coordinates.type_name.clone(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
