use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::process::domain::command_spec::CommandSpec;
use crate::process::domain::process_handle::{ExitCallback, ExitReason, ProcessHandle};
use crate::process::domain::process_launcher::{LaunchError, ProcessLauncher};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches real OS processes, each with a dedicated watcher thread.
///
/// The watcher polls `try_wait` so the child can still be killed from
/// another thread; a terminate request wakes it early.
pub struct ChildProcessLauncher {
    poll_interval: Duration,
}

impl ChildProcessLauncher {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ChildProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for ChildProcessLauncher {
    fn launch(
        &self,
        spec: &CommandSpec,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                command: spec.to_string(),
                source: e,
            })?;

        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        let exited = Arc::new(AtomicBool::new(false));
        let terminate_requested = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);

        let watcher = Watcher {
            child: child.clone(),
            exited: exited.clone(),
            terminate_requested: terminate_requested.clone(),
            wake_rx,
            poll_interval: self.poll_interval,
        };
        let spawned = thread::Builder::new()
            .name(format!("watch-{pid}"))
            .spawn(move || watcher.run(on_exit));

        if let Err(e) = spawned {
            let mut child = lock(&child);
            let _ = child.kill();
            let _ = child.wait();
            return Err(LaunchError::Watcher {
                command: spec.to_string(),
                source: e,
            });
        }

        log::debug!("Started pid {pid}: {spec}");
        Ok(Box::new(ChildProcessHandle {
            pid,
            child,
            exited,
            terminate_requested,
            wake_tx,
        }))
    }
}

/// Handle to a process started by [`ChildProcessLauncher`].
///
/// Dropping the handle terminates the process.
pub struct ChildProcessHandle {
    pid: u32,
    child: Arc<Mutex<Child>>,
    exited: Arc<AtomicBool>,
    terminate_requested: Arc<AtomicBool>,
    wake_tx: Sender<()>,
}

impl ProcessHandle for ChildProcessHandle {
    fn pid(&self) -> Option<u32> {
        if self.has_exited() {
            None
        } else {
            Some(self.pid)
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        if self.has_exited() || self.terminate_requested.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = lock(&self.child).kill();
        let _ = self.wake_tx.try_send(());
        result
    }
}

impl Drop for ChildProcessHandle {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            log::warn!("Failed to terminate pid {}: {e}", self.pid);
        }
    }
}

struct Watcher {
    child: Arc<Mutex<Child>>,
    exited: Arc<AtomicBool>,
    terminate_requested: Arc<AtomicBool>,
    wake_rx: Receiver<()>,
    poll_interval: Duration,
}

impl Watcher {
    fn run(self, on_exit: ExitCallback) {
        let reason = loop {
            let status = lock(&self.child).try_wait();
            match status {
                Ok(Some(status)) => {
                    if self.terminate_requested.load(Ordering::Acquire) {
                        break ExitReason::Terminated;
                    }
                    break ExitReason::Exited(status.code());
                }
                Ok(None) => {}
                Err(e) => break ExitReason::WaitFailed(e.to_string()),
            }
            match self.wake_rx.recv_timeout(self.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                // Handle dropped after killing the child; keep polling until it is reaped.
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll_interval),
            }
        };
        self.exited.store(true, Ordering::Release);
        on_exit(reason);
    }
}

fn lock(child: &Mutex<Child>) -> std::sync::MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}
