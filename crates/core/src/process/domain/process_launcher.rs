use thiserror::Error;

use crate::process::domain::command_spec::CommandSpec;
use crate::process::domain::process_handle::{ExitCallback, ProcessHandle};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start exit watcher for `{command}`: {source}")]
    Watcher {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts external processes and watches them for exit.
///
/// This is the seam that keeps supervision logic independent of which
/// executable is being run (and lets tests run without any processes).
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        spec: &CommandSpec,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}
