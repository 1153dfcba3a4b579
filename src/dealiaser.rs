//! Spawns the external `aliasv6` dealiaser and wires up its stdio.
//!
//! The dealiaser is an opaque collaborator: it reads one command per line on
//! stdin and emits one JSON result per line on stdout. This module only
//! builds its command line, launches it, and propagates its exit status.

use crate::config::DealiaserConfig;
use crate::error::{HarnessError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

pub struct Dealiaser {
    config: DealiaserConfig,
}

impl Dealiaser {
    pub fn new(config: DealiaserConfig) -> Self {
        Self { config }
    }

    /// Resolve the configured binary on PATH. A missing binary is fatal.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        which::which(&self.config.binary).map_err(|e| {
            HarnessError::Spawn(format!("cannot find {}: {e}", self.config.binary))
        })
    }

    /// Argument vector for
    /// `aliasv6 [--flush] -c <aliases> [-o <out>] [-m <meta>] [-l <log>]`.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.config.flush {
            args.push("--flush".to_string());
        }
        args.push("-c".to_string());
        args.push(self.config.aliases_file.display().to_string());
        if let Some(output) = &self.config.output_file {
            args.push("-o".to_string());
            args.push(output.display().to_string());
        }
        if let Some(meta) = &self.config.meta_file {
            args.push("-m".to_string());
            args.push(meta.display().to_string());
        }
        if let Some(log) = &self.config.log_file {
            args.push("-l".to_string());
            args.push(log.display().to_string());
        }
        args
    }

    /// Launch the dealiaser with piped stdin/stdout. The caller owns the
    /// pipes and is responsible for waiting on the child.
    pub fn spawn_piped(&self) -> Result<Child> {
        let binary = self.resolve_binary()?;
        let args = self.build_args();
        debug!("Spawning {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| HarnessError::Spawn(format!("{}: {e}", binary.display())))?;
        info!("Dealiaser started (pid {:?})", child.id());
        Ok(child)
    }

    /// Wait for the dealiaser to exit; a non-zero status is an error.
    pub async fn wait(mut child: Child) -> Result<()> {
        let status = child.wait().await?;
        if !status.success() {
            return Err(HarnessError::ExecutionFailed(format!(
                "dealiaser exited with {status}"
            )));
        }
        info!("Dealiaser exited cleanly");
        Ok(())
    }
}
