//! Command sinks: where the decision layer's output goes.
//!
//! The routing core only ever produces ordered lists of shell-level
//! command strings. A [`CommandSink`] consumes such a list; the daemon
//! wires in [`ShellSink`], tests and dry runs use [`PrintSink`] or
//! [`RecordingSink`].

use async_trait::async_trait;
use colored::Colorize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::Result;
use crate::routing::command::failure_suppressed;

/// Accepts the ordered command list produced by the routing core.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Apply the commands in order.
    async fn apply(&self, commands: &[String]) -> Result<()>;
}

/// Executes each command through `sh -c`.
///
/// The command text contains shell redirections (`echo ... > /proc/...`,
/// `&> /dev/null`), so a shell is required; this is the same execution
/// model as the routing tools the commands were written for.
///
/// A non-zero exit does not abort the sequence: defensive deletes are
/// expected to fail when nothing is there to delete, and a later command
/// never depends on a failed earlier one succeeding. Unexpected failures
/// are logged and execution continues.
#[derive(Debug, Default, Clone)]
pub struct ShellSink;

impl ShellSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandSink for ShellSink {
    async fn apply(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            debug!(command = %command, "executing");
            let status = Command::new("sh").arg("-c").arg(command).status().await?;
            if !status.success() && !failure_suppressed(command) {
                warn!(command = %command, %status, "routing command failed");
            }
        }
        Ok(())
    }
}

/// Prints commands instead of executing them (dry-run mode).
#[derive(Debug, Default, Clone)]
pub struct PrintSink;

#[async_trait]
impl CommandSink for PrintSink {
    async fn apply(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            println!("{}", command.cyan());
        }
        Ok(())
    }
}

/// Records everything it is handed; test double.
#[derive(Debug, Default)]
pub struct RecordingSink {
    commands: std::sync::Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything applied so far, in order.
    pub fn recorded(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn apply(&self, commands: &[String]) -> Result<()> {
        if let Ok(mut recorded) = self.commands.lock() {
            recorded.extend_from_slice(commands);
        }
        Ok(())
    }
}
