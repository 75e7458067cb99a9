//! Commands run on the storage server over a remote shell
//!
//! The storage filesystem keeps a checksum per file that is only reachable
//! from the storage host, so tools are invoked as
//! `<ssh> <user>@<host> '<tool> "<path>"'` and their stdout is returned.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ChecksumConfig;
use crate::error::{MigrationError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How often and how long a remote call is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Per-attempt limit; `None` waits for the command to finish
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up.
    /// The last error is returned.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Option<Duration>) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(self.timeout) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Remote shell bound to one storage host
#[derive(Debug, Clone)]
pub struct RemoteShell {
    program: String,
    destination: String,
    policy: RetryPolicy,
}

impl RemoteShell {
    pub fn new(program: &str, user: &str, host: &str, policy: RetryPolicy) -> Self {
        Self {
            program: program.to_string(),
            destination: format!("{}@{}", user, host),
            policy,
        }
    }

    pub fn from_config(config: &ChecksumConfig) -> Self {
        Self::new(
            &config.ssh_command,
            &config.storage_user,
            &config.storage_server,
            RetryPolicy {
                max_attempts: config.max_attempts,
                timeout: config.timeout(),
            },
        )
    }

    /// Remote command line for `tool` applied to `path`
    pub fn command_line(tool: &str, path: &Path) -> String {
        format!("{} \"{}\"", tool, path.display())
    }

    /// Run `tool` on `path` remotely and return its stdout
    pub fn run(&self, tool: &str, path: &Path) -> Result<String> {
        let remote = Self::command_line(tool, path);
        debug!("{} {} '{}'", self.program, self.destination, remote);
        self.policy.run(&remote, |timeout| self.run_once(&remote, timeout))
    }

    fn run_once(&self, remote: &str, timeout: Option<Duration>) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg(&self.destination)
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MigrationError::Checksum(format!("failed to execute '{}': {}", self.program, e))
            })?;

        if let Some(limit) = timeout {
            wait_with_deadline(&mut child, limit, remote)?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| MigrationError::Checksum(format!("failed to wait for '{}': {}", remote, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let msg = if !stderr.trim().is_empty() {
                stderr.trim().to_string()
            } else {
                format!("exited with code {}", output.status.code().unwrap_or(-1))
            };
            Err(MigrationError::Checksum(format!("'{}': {}", remote, msg)))
        }
    }
}

/// Poll until `child` exits; kill it once `limit` has passed
fn wait_with_deadline(child: &mut Child, limit: Duration, remote: &str) -> Result<()> {
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MigrationError::Checksum(format!(
                "'{}' timed out after {:?}",
                remote, limit
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
