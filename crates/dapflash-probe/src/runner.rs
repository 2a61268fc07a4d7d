//! Running probe tools as child processes
//!
//! Output from stdout and stderr is collected by reader threads into one
//! channel. The child gets `flash_timeout` to finish; after that it is asked
//! to terminate, and killed if it is still alive `process_end_timeout` later.
//! Output is drained, and the reader threads joined, for at most
//! `queue_timeout` once the child is gone, so a run never takes longer than
//! the sum of the three. Readers still blocked after that (a grandchild kept
//! the pipes open) are detached.

use crate::error::{ProbeError, Result};
use dapflash_core::Settings;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(50);

/// What a finished tool left behind
#[derive(Debug)]
pub struct ToolOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Interleaved stdout and stderr
    pub output: Vec<u8>,
}

impl ToolOutput {
    /// Output as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).trim().to_string()
    }
}

/// Spawns tools with a hard timeout
#[derive(Debug, Clone)]
pub struct ToolRunner {
    flash_timeout: Duration,
    process_end_timeout: Duration,
    queue_timeout: Duration,
}

impl ToolRunner {
    /// Runner with the timeouts from `settings`
    pub fn new(settings: &Settings) -> Self {
        Self {
            flash_timeout: settings.flash_timeout,
            process_end_timeout: settings.process_end_timeout,
            queue_timeout: settings.queue_timeout,
        }
    }

    /// Upper bound on the wall time of one [`ToolRunner::run`]
    pub fn max_duration(&self) -> Duration {
        self.flash_timeout + self.process_end_timeout + self.queue_timeout
    }

    /// Run `program` to completion and require a zero exit status
    pub fn run_checked<I, S>(&self, program: &Path, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.run(program, args)?;
        if out.status.success() {
            return Ok(out);
        }
        Err(ProbeError::Failed {
            tool: tool_name(program),
            status: out.status.to_string(),
            output: out.text(),
        })
    }

    /// Run `program` and collect its exit status and output
    pub fn run<I, S>(&self, program: &Path, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = tool_name(program);
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!("Running {:?}", command);

        let mut child = command.spawn().map_err(|source| ProbeError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let status = self.wait(&tool, &mut child);
        let deadline = Instant::now() + self.queue_timeout;
        let output = self.drain(&rx, deadline);
        let detached = join_readers(readers, deadline);
        if detached > 0 {
            log::debug!("{}: {} output reader(s) still blocked, detaching", tool, detached);
        }
        let status = status?;
        log::debug!("{} exited with {}", tool, status);
        Ok(ToolOutput { status, output })
    }

    fn wait(&self, tool: &str, child: &mut Child) -> Result<ExitStatus> {
        let waited = |source| ProbeError::Wait {
            tool: tool.to_string(),
            source,
        };

        if let Some(status) = poll_until(child, self.flash_timeout).map_err(waited)? {
            return Ok(status);
        }

        log::warn!(
            "{} still running after {:.1} s, terminating",
            tool,
            self.flash_timeout.as_secs_f64()
        );
        terminate(child);
        if poll_until(child, self.process_end_timeout)
            .map_err(waited)?
            .is_none()
        {
            log::warn!("{} ignored terminate, killing", tool);
            if let Err(e) = child.kill() {
                log::debug!("Killing {} failed: {}", tool, e);
            }
            child.wait().map_err(waited)?;
        }

        Err(ProbeError::Timeout {
            tool: tool.to_string(),
            secs: self.flash_timeout.as_secs_f64(),
        })
    }

    fn drain(&self, rx: &Receiver<Vec<u8>>, deadline: Instant) -> Vec<u8> {
        let mut output = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(chunk) => output.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("Output still pending after {:?}, dropping", self.queue_timeout);
                    break;
                }
            }
        }
        output
    }
}

/// File name of a tool, for messages
pub(crate) fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .into_owned()
}

/// Whether `program` can be found, either as a path or on `PATH`
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(program).with_extension(std::env::consts::EXE_EXTENSION);
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R, tx: Sender<Vec<u8>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Join reader threads as they finish, until `deadline`
///
/// Returns how many were still running and got detached.
fn join_readers(mut readers: Vec<JoinHandle<()>>, deadline: Instant) -> usize {
    loop {
        let (finished, running): (Vec<_>, Vec<_>) =
            readers.into_iter().partition(|h| h.is_finished());
        for handle in finished {
            if handle.join().is_err() {
                log::debug!("Output reader panicked");
            }
        }
        if running.is_empty() || Instant::now() >= deadline {
            return running.len();
        }
        readers = running;
        thread::sleep(Duration::from_millis(5));
    }
}

fn poll_until(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        log::debug!("SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("Terminating {} failed: {}", child.id(), e);
    }
}
