use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::utils::{truncate_output, MAX_STREAM_BYTES};

/// How long pipe readers may keep draining after the stage has exited
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageExit {
    Success,
    Failed(Option<i32>),
    TimedOut(Duration),
    LaunchFailed(String),
}

/// Exit classification plus the captured stdout and stderr of one process.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub exit: StageExit,
    pub output: String,
}

impl StageRun {
    fn launch_failed(message: String) -> Self {
        Self {
            exit: StageExit::LaunchFailed(message),
            output: String::new(),
        }
    }
}

/// Run `argv` until the process exits or `timeout` elapses. The stage is
/// judged by the exit of the process itself; whatever is left of its process
/// group afterwards is killed, so background children cannot hold the pipes
/// open. Output read before a timeout is kept.
pub async fn run_stage(argv: &[String], cwd: Option<&Path>, timeout: Duration) -> StageRun {
    let Some((program, args)) = argv.split_first() else {
        return StageRun::launch_failed("empty command".to_string());
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return StageRun::launch_failed(format!("{}: {}", program, e)),
    };
    let pid = child.id();
    let stdout = StreamCapture::start(child.stdout.take());
    let stderr = StreamCapture::start(child.stderr.take());

    let exit = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => StageExit::Success,
        Ok(Ok(status)) => StageExit::Failed(status.code()),
        Ok(Err(e)) => StageExit::LaunchFailed(format!("{}: {}", program, e)),
        Err(_) => StageExit::TimedOut(timeout),
    };

    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if matches!(exit, StageExit::TimedOut(_)) {
        // Reap the leader; the group kill has usually ended it already.
        if let Err(e) = child.kill().await {
            tracing::debug!("{} already exited: {}", program, e);
        }
    }

    let (out, err) = tokio::join!(stdout.finish(), stderr.finish());
    let mut output = out;
    output.push_str(&err);
    if let StageExit::TimedOut(after) = &exit {
        output.push_str(&format!("{} timed out after {}s\n", program, after.as_secs()));
    }
    StageRun { exit, output }
}

/// Reads one pipe in the background into a buffer that stays readable even
/// if the reader has to be abandoned.
struct StreamCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCapture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = stream.map(|mut stream| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut buf = buf.lock().unwrap_or_else(|e| e.into_inner());
                            buf.extend_from_slice(&chunk[..n]);
                            // Only the tail is ever kept, so cap memory here.
                            if buf.len() > 4 * MAX_STREAM_BYTES {
                                let excess = buf.len() - 2 * MAX_STREAM_BYTES;
                                buf.drain(..excess);
                            }
                        }
                    }
                }
            })
        });
        Self { buf, task }
    }

    async fn finish(self) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                tracing::debug!("Pipe still open after the stage ended, keeping what was read");
                task.abort();
            }
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(|e| e.into_inner()));
        truncate_output(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: killpg only sends a signal; the child leads its own group, so
    // the group id equals its pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!("killpg({}) failed: {}", pid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
