use serde::Serialize;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::utils::command::{execute_local_command_in_dir, tail, CapturedOutput};

const STDERR_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutput {
    pub command: String,
    pub output: CapturedOutput,
}

/// Produces the storefront bundle. Blocks until the build finishes.
pub trait Bundler {
    fn build(&self) -> Result<BuildOutput>;
}

/// Runs the configured build command through the shell.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    pub command: String,
    pub dir: PathBuf,
}

impl CommandBundler {
    pub fn new(command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            dir: dir.into(),
        }
    }
}

impl Bundler for CommandBundler {
    fn build(&self) -> Result<BuildOutput> {
        crate::log_status!("build", "Running '{}' in {}", self.command, self.dir.display());

        let output = execute_local_command_in_dir(&self.command, Some(&self.dir), None);
        if !output.success {
            return Err(Error::build_failed(
                &self.command,
                output.exit_code,
                tail(&output.error_text(), STDERR_TAIL_LINES),
            ));
        }

        Ok(BuildOutput {
            command: self.command.clone(),
            output: output.into(),
        })
    }
}
