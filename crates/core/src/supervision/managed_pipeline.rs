use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::process::domain::process_handle::ProcessHandle;
use crate::shared::camera::Camera;
use crate::supervision::cancellation::CancellationToken;

/// The two external processes a camera pipeline consists of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessRole {
    Restream,
    Sampler,
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Restream => write!(f, "re-stream"),
            ProcessRole::Sampler => write!(f, "frame sampler"),
        }
    }
}

/// A running detection thread and the token that stops it.
pub struct DetectionWorker {
    token: CancellationToken,
    thread: JoinHandle<()>,
}

impl DetectionWorker {
    pub fn new(token: CancellationToken, thread: JoinHandle<()>) -> Self {
        Self { token, thread }
    }

    /// False once cancelled, or once the thread has ended for any reason
    /// (including a panic).
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.thread.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Everything running on behalf of one camera.
///
/// `generation` distinguishes successive incarnations of the same camera,
/// so an exit notice from an old incarnation can't remove a new one.
pub struct ManagedPipeline {
    camera: Camera,
    generation: u64,
    sample_path: PathBuf,
    restream: Box<dyn ProcessHandle>,
    sampler: Box<dyn ProcessHandle>,
    detection: DetectionWorker,
}

impl ManagedPipeline {
    pub fn new(
        camera: Camera,
        generation: u64,
        sample_path: PathBuf,
        restream: Box<dyn ProcessHandle>,
        sampler: Box<dyn ProcessHandle>,
        detection: DetectionWorker,
    ) -> Self {
        Self {
            camera,
            generation,
            sample_path,
            restream,
            sampler,
            detection,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sample_path(&self) -> &Path {
        &self.sample_path
    }

    /// Both processes and the detection thread still running.
    pub fn is_alive(&self) -> bool {
        !self.restream.has_exited() && !self.sampler.has_exited() && self.detection.is_running()
    }

    /// Cancels detection, requests termination of both processes and
    /// deletes the sample frame.
    ///
    /// Does not wait for the processes to go away. Failures are logged and
    /// not retried.
    pub fn teardown(mut self) {
        self.detection.cancel();
        let id = self.camera.id.clone();
        for (role, handle) in [
            (ProcessRole::Restream, &mut self.restream),
            (ProcessRole::Sampler, &mut self.sampler),
        ] {
            if let Err(e) = handle.terminate() {
                log::warn!("Failed to terminate {role} process for camera {id}: {e}");
            }
        }
        match fs::remove_file(&self.sample_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove sample frame {} for camera {id}: {e}",
                self.sample_path.display()
            ),
        }
    }
}

impl fmt::Debug for ManagedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedPipeline")
            .field("camera_id", &self.camera.id)
            .field("generation", &self.generation)
            .field("restream_pid", &self.restream.pid())
            .field("sampler_pid", &self.sampler.pid())
            .field("alive", &self.is_alive())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{idle_worker, FakeHandle};
    use super::*;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn pipeline(
        restream: FakeHandle,
        sampler: FakeHandle,
        token: &CancellationToken,
        sample_path: PathBuf,
    ) -> ManagedPipeline {
        ManagedPipeline::new(
            Camera::new("cam-1", "rtsp://a"),
            1,
            sample_path,
            Box::new(restream),
            Box::new(sampler),
            idle_worker(token),
        )
    }

    #[test]
    fn test_teardown_cancels_and_terminates_both() {
        let restream = FakeHandle::new();
        let sampler = FakeHandle::new();
        let (r_terms, s_terms) = (restream.terminations.clone(), sampler.terminations.clone());
        let token = CancellationToken::new();
        let pipeline = pipeline(restream, sampler, &token, PathBuf::from("absent.jpg"));
        assert!(pipeline.is_alive());

        pipeline.teardown();

        assert!(token.is_cancelled());
        assert_eq!(r_terms.load(Ordering::SeqCst), 1);
        assert_eq!(s_terms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_continues_after_terminate_failure() {
        let mut restream = FakeHandle::new();
        restream.fail_terminate = true;
        let sampler = FakeHandle::new();
        let s_terms = sampler.terminations.clone();
        let token = CancellationToken::new();
        let pipeline = pipeline(restream, sampler, &token, PathBuf::from("absent.jpg"));

        pipeline.teardown();

        assert_eq!(s_terms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_removes_sample_frame() {
        let tmp = TempDir::new().unwrap();
        let sample = tmp.path().join("cam-1.jpg");
        fs::write(&sample, b"old frame").unwrap();
        let token = CancellationToken::new();
        let pipeline = pipeline(FakeHandle::new(), FakeHandle::new(), &token, sample.clone());

        pipeline.teardown();

        assert!(!sample.exists());
    }

    #[test]
    fn test_exited_process_means_not_alive() {
        let sampler = FakeHandle::new();
        let exited = sampler.exited.clone();
        let token = CancellationToken::new();
        let pipeline = pipeline(FakeHandle::new(), sampler, &token, PathBuf::from("absent.jpg"));

        exited.store(true, Ordering::SeqCst);

        assert!(!pipeline.is_alive());
    }

    #[test]
    fn test_ended_detection_thread_means_not_alive() {
        let thread: JoinHandle<()> = thread::spawn(|| panic!("classifier blew up"));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let pipeline = ManagedPipeline::new(
            Camera::new("cam-1", "rtsp://a"),
            1,
            PathBuf::from("absent.jpg"),
            Box::new(FakeHandle::new()),
            Box::new(FakeHandle::new()),
            DetectionWorker::new(CancellationToken::new(), thread),
        );

        assert!(!pipeline.is_alive());
    }
}
