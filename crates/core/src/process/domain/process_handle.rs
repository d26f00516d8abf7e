use std::fmt;

/// Why a supervised process stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The process ended on its own, with its exit code if it had one.
    Exited(Option<i32>),
    /// The process was stopped through [`ProcessHandle::terminate`].
    Terminated,
    /// Its status could no longer be observed; treated as dead.
    WaitFailed(String),
}

impl ExitReason {
    /// Whether the exit happened without anyone asking for it.
    pub fn is_spontaneous(&self) -> bool {
        !matches!(self, ExitReason::Terminated)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Exited(Some(code)) => write!(f, "exited with code {code}"),
            ExitReason::Exited(None) => write!(f, "killed by signal"),
            ExitReason::Terminated => write!(f, "terminated"),
            ExitReason::WaitFailed(e) => write!(f, "lost track of process: {e}"),
        }
    }
}

/// Invoked exactly once, from a background thread, when the process stops.
pub type ExitCallback = Box<dyn FnOnce(ExitReason) + Send>;

/// Supervising wrapper around one running external process.
///
/// A handle is single-use: once the process has exited it stays exited,
/// and restarting means launching a new handle.
pub trait ProcessHandle: Send {
    /// OS process id, while one is known.
    fn pid(&self) -> Option<u32>;

    fn has_exited(&self) -> bool;

    /// Requests termination. Terminating an exited process is a no-op.
    fn terminate(&mut self) -> std::io::Result<()>;
}
