//! MD5 digests for archived binary versions
//!
//! Only used when the database has no stored checksum for a version.

use std::path::Path;

use tracing::info;

use crate::config::{ChecksumConfig, ChecksumMode};
use crate::error::{MigrationError, Result};
use crate::remote::RemoteShell;

/// Source of MD5 digests for archived files
pub trait ChecksumSource {
    fn checksum(&self, path: &Path) -> Result<String>;
}

/// Whether `value` is the storage tool's "not computed yet" answer
pub fn is_sentinel(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b == b'0')
}

fn first_token(output: &str) -> Option<&str> {
    output.split_whitespace().next()
}

/// Asks the storage server, falling back to hashing there when the
/// filesystem has no checksum recorded.
pub struct RemoteChecksum {
    shell: RemoteShell,
    command: String,
    fallback_command: String,
}

impl RemoteChecksum {
    pub fn new(shell: RemoteShell, command: &str, fallback_command: &str) -> Self {
        Self {
            shell,
            command: command.to_string(),
            fallback_command: fallback_command.to_string(),
        }
    }

    pub fn from_config(config: &ChecksumConfig) -> Self {
        Self::new(
            RemoteShell::from_config(config),
            &config.command,
            &config.fallback_command,
        )
    }

    fn query(&self, tool: &str, path: &Path) -> Result<String> {
        let output = self.shell.run(tool, path)?;
        first_token(&output)
            .map(str::to_string)
            .ok_or_else(|| MigrationError::Checksum(format!("{} printed no checksum", tool)))
    }
}

impl ChecksumSource for RemoteChecksum {
    fn checksum(&self, path: &Path) -> Result<String> {
        let value = self.query(&self.command, path)?;
        if !is_sentinel(&value) {
            return Ok(value);
        }

        info!(
            "no filesystem checksum for {}, computing with {}",
            path.display(),
            self.fallback_command
        );
        let value = self.query(&self.fallback_command, path)?;
        if is_sentinel(&value) {
            return Err(MigrationError::Checksum(format!(
                "{} returned no checksum for {}",
                self.fallback_command,
                path.display()
            )));
        }
        Ok(value)
    }
}

/// Hashes the archived file on this machine
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalChecksum;

impl ChecksumSource for LocalChecksum {
    fn checksum(&self, path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;
        Ok(format!("{:x}", md5::compute(&data)))
    }
}

/// Build the checksum source selected by the config
pub fn checksum_source(config: &ChecksumConfig) -> Box<dyn ChecksumSource> {
    match config.mode {
        ChecksumMode::Remote => Box::new(RemoteChecksum::from_config(config)),
        ChecksumMode::Local => Box::new(LocalChecksum),
    }
}
