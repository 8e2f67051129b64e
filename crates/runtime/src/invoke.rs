//! Subprocess invocation with output capture and forced-termination timeouts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

/// Default deadline for a single CLI call; registration backends can be slow
/// but anything past this is treated as a hang.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One subprocess call: program, ordered arguments, working directory, deadline.
/// Ephemeral; build one per call.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
	pub program: PathBuf,
	pub args: Vec<String>,
	pub current_dir: Option<PathBuf>,
	pub timeout: Duration,
}

impl ProcessInvocation {
	/// Creates an invocation with the default timeout and no working directory.
	pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			current_dir: None,
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.current_dir = Some(dir.into());
		self
	}

	fn describe(&self) -> String {
		self.program.display().to_string()
	}
}

/// Captured result of a completed invocation. Output is lossy-decoded so
/// undecodable bytes never fail a capture.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
	pub exit_code: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl ProcessResult {
	/// Stdout and stderr joined for pattern classification.
	pub fn combined_output(&self) -> String {
		let mut combined = self.stdout.clone();
		if !self.stderr.is_empty() {
			if !combined.is_empty() && !combined.ends_with('\n') {
				combined.push('\n');
			}
			combined.push_str(&self.stderr);
		}
		combined
	}
}

/// Runs `invocation` to completion, capturing stdout and stderr.
///
/// On timeout the child's process group is killed and
/// [`RuntimeError::ProcessTimeout`] carries whatever output was captured
/// before termination. No retries happen here; retry policy belongs to the
/// orchestrators.
pub async fn run(invocation: ProcessInvocation) -> Result<ProcessResult> {
	let program = invocation.describe();
	debug!(target = "siglink.invoke", %program, args = ?invocation.args, "spawning");

	let mut cmd = Command::new(&invocation.program);
	cmd.args(&invocation.args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	// Own process group so a timeout can take down forked grandchildren
	// (a non-exec'ing wrapper script) that would otherwise hold the pipes open.
	#[cfg(unix)]
	cmd.process_group(0);
	if let Some(dir) = &invocation.current_dir {
		cmd.current_dir(dir);
	}

	let mut child = cmd.spawn().map_err(|source| RuntimeError::ProcessSpawn {
		program: program.clone(),
		source,
	})?;

	let stdout_task = capture(child.stdout.take());
	let stderr_task = capture(child.stderr.take());

	match tokio::time::timeout(invocation.timeout, child.wait()).await {
		Ok(status) => {
			let status = status?;
			let result = ProcessResult {
				exit_code: status.code(),
				stdout: read_back(stdout_task).await,
				stderr: read_back(stderr_task).await,
			};
			debug!(
				target = "siglink.invoke",
				%program,
				exit_code = ?result.exit_code,
				"completed"
			);
			Ok(result)
		}
		Err(_) => {
			warn!(target = "siglink.invoke", %program, timeout = ?invocation.timeout, "deadline expired; killing");
			terminate(&mut child).await;
			Err(RuntimeError::ProcessTimeout {
				program,
				timeout: invocation.timeout,
				stdout: read_back_within(stdout_task, CAPTURE_GRACE).await,
				stderr: read_back_within(stderr_task, CAPTURE_GRACE).await,
			})
		}
	}
}

fn capture(pipe: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>) -> tokio::task::JoinHandle<Vec<u8>> {
	tokio::spawn(async move {
		let mut buf = Vec::new();
		if let Some(mut pipe) = pipe {
			let _ = pipe.read_to_end(&mut buf).await;
		}
		buf
	})
}

async fn read_back(task: tokio::task::JoinHandle<Vec<u8>>) -> String {
	let bytes = task.await.unwrap_or_default();
	String::from_utf8_lossy(&bytes).into_owned()
}

/// Bound on how long a capture task may run after the child is killed. Only
/// a pipe writer that escaped the process group can still be open by then,
/// and partial output is not worth stalling the timeout error for.
const CAPTURE_GRACE: Duration = Duration::from_millis(500);

async fn read_back_within(task: tokio::task::JoinHandle<Vec<u8>>, grace: Duration) -> String {
	match tokio::time::timeout(grace, task).await {
		Ok(bytes) => String::from_utf8_lossy(&bytes.unwrap_or_default()).into_owned(),
		Err(_) => String::new(),
	}
}

/// Kills the child's whole process group, then reaps the child itself.
async fn terminate(child: &mut tokio::process::Child) {
	#[cfg(unix)]
	if let Some(pid) = child.id() {
		unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
	}
	let _ = child.kill().await;
}
