use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy of a [post]collect run.
///
/// Only [`CollectError::Config`] is fatal; it is raised while building the
/// source tree, before any external command runs. Everything else is scoped
/// to one command invocation, one file or one source, and is accumulated
/// into the run summary rather than aborting the run.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Malformed source tree. Reported by the fail-fast validation pass.
    #[error("invalid sources configuration: {0}")]
    Config(String),

    /// Syntactically broken command template (unbalanced brace or quote).
    #[error("malformed command template `{template}`: {reason}")]
    Template { template: String, reason: String },

    /// A template references a variable absent from the built environment.
    /// Detected before any process is launched.
    #[error("undefined variable {{{name}}} in command `{template}`")]
    UndefinedVariable { name: String, template: String },

    /// A template expanded to zero arguments. Distinct from an absent
    /// template, which simply means "no command".
    #[error("command `{template}` expanded to an empty argument vector")]
    EmptyCommand { template: String },

    /// The executable could not be started at all (not found, not
    /// executable). Distinct from a process that ran and exited non-zero.
    #[error("cannot launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran to completion with a non-zero exit code.
    /// Code is -1 when the child was killed by a signal.
    #[error("`{command}` exited with code {code}")]
    Exit { command: String, code: i32 },

    /// The per-command timeout expired; the child was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Promoting or relocating a file would overwrite an existing one.
    /// The file is left where it is.
    #[error("refusing to overwrite existing file {}", .target.display())]
    Collision { target: PathBuf },

    /// Filesystem operation failed (workspace creation, promotion rename,
    /// directory scan).
    #[error("filesystem error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
