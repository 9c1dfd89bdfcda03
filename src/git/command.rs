use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use log::{debug, trace};

#[cfg(test)]
use mockall::automock;

use super::GitError;

/// Captured result of a successful git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

/// Runs a git subcommand against a working directory.
///
/// Implementations return `GitError::CommandFailed` when the process exits
/// with a nonzero status. There are no retries and no timeouts at this level.
#[cfg_attr(test, automock)]
pub trait CommandRunner {
    fn run(&self, directory: &Path, args: &[OsString]) -> Result<CommandOutput, GitError>;
}

pub type SharedRunner = Arc<dyn CommandRunner + Send + Sync>;

/// Spawns the git executable as a child process.
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
}

impl Default for Git {
    fn default() -> Self {
        Git {
            program: PathBuf::from("git"),
        }
    }
}

impl Git {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Git {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn shared(self) -> SharedRunner {
        Arc::new(self)
    }
}

impl CommandRunner for Git {
    fn run(&self, directory: &Path, args: &[OsString]) -> Result<CommandOutput, GitError> {
        let program = self.program.to_string_lossy().to_string();
        let rendered = render_args(args);
        debug!(
            "Running {} {} in {}",
            program,
            rendered.join(" "),
            directory.display()
        );

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(directory)
            .output()
            .map_err(|source| GitError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            debug!(
                "{} {} exited with {:?}: {}",
                program,
                rendered.join(" "),
                output.status.code(),
                stderr
            );
            return Err(GitError::CommandFailed {
                program,
                args: rendered,
                code: output.status.code(),
                stderr,
            });
        }

        trace!("stdout: {}", stdout);

        Ok(CommandOutput {
            stdout,
            stderr,
            code: output.status.code().unwrap_or_default(),
        })
    }
}

pub(crate) fn render_args(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect()
}
