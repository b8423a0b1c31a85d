//! Child process execution.
//!
//! [`ChildCommand`] spawns a program with an explicit argument vector,
//! streams its stdout/stderr line by line (echoed to the terminal in verbose
//! mode, logged at debug level otherwise) and waits with an optional
//! deadline. Every running child is recorded in a process-wide table so
//! [`processes`]`().cancel_all()` can terminate outstanding work.
//!
//! Termination sends SIGTERM first and escalates to SIGKILL after
//! [`TERMINATE_GRACE`].

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Time a child gets between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output of a finished child.
#[derive(Debug, Clone, Default)]
pub struct ChildOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the deadline expired.
    pub timed_out: bool,
}

impl ChildOutput {
    /// Whether the child exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// A command line plus its environment.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Option<Vec<(String, String)>>,
    extra_env: Vec<(String, String)>,
    timeout: Option<Duration>,
    echo: bool,
}

impl ChildCommand {
    /// Start building a command for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            extra_env: Vec::new(),
            timeout: None,
            echo: false,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the inherited environment entirely.
    pub fn env_clear_with(mut self, vars: Vec<(String, String)>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Add one variable on top of the environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Kill the child when it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Echo child output to the terminal instead of the debug log.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Program path.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Argument vector, program excluded.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Value of `key` in the environment the child will see.
    pub fn env_value(&self, key: &str) -> Option<String> {
        if let Some((_, v)) = self.extra_env.iter().rev().find(|(k, _)| k == key) {
            return Some(v.clone());
        }
        match &self.env {
            Some(vars) => vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
            None => std::env::var(key).ok(),
        }
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(vars) = &self.env {
            cmd.env_clear();
            cmd.envs(vars.iter().map(|(k, v)| (k, v)));
        }
        cmd.envs(self.extra_env.iter().map(|(k, v)| (k, v)));
        cmd
    }

    fn label(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Launch without waiting. Returns the child's pid.
    ///
    /// The child stays in the process table until a background thread has
    /// reaped it, so [`ProcessTable::cancel_all`] reaches it too.
    pub fn spawn_detached(&self) -> Result<u32> {
        let label = self.label();
        let mut cmd = self.build();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::task(label.clone(), format!("failed to spawn: {e}")))?;
        let pid = child.id();
        processes().insert(pid);
        thread::spawn(move || {
            match child.wait() {
                Ok(status) => tracing::debug!("Detached {} (pid {}) exited: {}", label, pid, status),
                Err(e) => tracing::warn!("Could not wait for detached {} (pid {}): {}", label, pid, e),
            }
            processes().remove(pid);
        });
        tracing::debug!("Launched detached pid {}", pid);
        Ok(pid)
    }

    /// Run to completion, streaming output.
    pub fn run(&self) -> Result<ChildOutput> {
        let label = self.label();
        tracing::debug!("Running {} {:?}", self.program.display(), self.args);

        let mut cmd = self.build();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::task(label.clone(), format!("failed to spawn: {e}")))?;
        let pid = child.id();
        processes().insert(pid);

        let stdout = child.stdout.take().map(|s| stream_lines(s, self.echo, false));
        let stderr = child.stderr.take().map(|s| stream_lines(s, self.echo, true));

        let waited = wait_with_deadline(&mut child, self.timeout);
        processes().remove(pid);
        let (status, timed_out) = waited?;

        let output = ChildOutput {
            exit_code: status.and_then(|s| s.code()),
            stdout: join_stream(stdout),
            stderr: join_stream(stderr),
            timed_out,
        };
        if timed_out {
            tracing::warn!("{} (pid {}) exceeded its timeout and was terminated", label, pid);
        }
        Ok(output)
    }
}

fn stream_lines<R: Read + Send + 'static>(reader: R, echo: bool, is_stderr: bool) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if echo {
                if is_stderr {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            } else {
                tracing::debug!("{}", line);
            }
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

fn join_stream(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<(Option<std::process::ExitStatus>, bool)> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let status = terminate_child(child)?;
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, wait up to [`TERMINATE_GRACE`], then SIGKILL.
fn terminate_child(child: &mut Child) -> Result<Option<std::process::ExitStatus>> {
    send_term(child.id());
    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        thread::sleep(POLL_INTERVAL);
    }
    child.kill()?;
    Ok(Some(child.wait()?))
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), signal).is_ok()
}

#[cfg(unix)]
fn send_term(pid: u32) -> bool {
    send_signal(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(unix)]
fn send_kill(pid: u32) -> bool {
    send_signal(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(not(unix))]
fn send_term(pid: u32) -> bool {
    tracing::warn!("Cannot signal pid {} on this platform", pid);
    false
}

#[cfg(not(unix))]
fn send_kill(pid: u32) -> bool {
    send_term(pid)
}

/// Pids of children currently being waited on.
#[derive(Debug, Default)]
pub struct ProcessTable {
    pids: Mutex<BTreeSet<u32>>,
}

impl ProcessTable {
    fn insert(&self, pid: u32) {
        self.pids.lock().insert(pid);
    }

    fn remove(&self, pid: u32) {
        self.pids.lock().remove(&pid);
    }

    /// Running children.
    pub fn live(&self) -> Vec<u32> {
        self.pids.lock().iter().copied().collect()
    }

    /// Terminate every running child. The waiting threads reap them; any
    /// child still registered after the grace period is killed.
    pub fn cancel_all(&self) -> usize {
        let pids = self.live();
        if pids.is_empty() {
            return 0;
        }
        tracing::info!("Terminating {} child process(es)", pids.len());
        for pid in &pids {
            send_term(*pid);
        }
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if pids.iter().all(|pid| !self.pids.lock().contains(pid)) {
                return pids.len();
            }
            thread::sleep(POLL_INTERVAL);
        }
        for pid in pids.iter().filter(|pid| self.pids.lock().contains(pid)) {
            tracing::warn!("Child {} ignored SIGTERM, sending SIGKILL", pid);
            send_kill(*pid);
        }
        pids.len()
    }
}

/// The process-wide child table.
pub fn processes() -> &'static ProcessTable {
    static TABLE: OnceLock<ProcessTable> = OnceLock::new();
    TABLE.get_or_init(ProcessTable::default)
}
