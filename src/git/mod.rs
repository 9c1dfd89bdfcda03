pub mod cache;
pub mod command;
pub mod repository;
pub mod worktree;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} {} failed ({}): {stderr}", args.join(" "), describe_code(*code))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Reference {reference} not found")]
    RefNotFound { reference: String },
    #[error("{} is not a git repository", path.display())]
    NotARepository { path: PathBuf },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl GitError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GitError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
