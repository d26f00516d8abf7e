use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::domain::camera_source::CameraSource;
use crate::registry::domain::registry_error::RegistryError;
use crate::shared::camera::Camera;
use crate::supervision::cancellation::CancellationToken;
use crate::supervision::pipeline_supervisor::PipelineSupervisor;

/// What one reconciliation pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.failed.is_empty()
    }
}

/// Keeps the set of running pipelines equal to the registry's camera list.
///
/// Only presence of a camera identifier is compared. A camera whose source
/// address changes keeps its existing pipeline until it drops out of the
/// list and comes back.
pub struct Reconciler {
    source: Arc<dyn CameraSource>,
    supervisor: Arc<PipelineSupervisor>,
    poll_interval: Duration,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn CameraSource>,
        supervisor: Arc<PipelineSupervisor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            supervisor,
            poll_interval,
        }
    }

    pub fn supervisor(&self) -> &Arc<PipelineSupervisor> {
        &self.supervisor
    }

    /// Fetches the camera list and converges on it.
    ///
    /// A failed fetch changes nothing.
    pub fn reconcile_once(&self) -> Result<ReconcileReport, RegistryError> {
        let cameras = self.source.fetch_cameras()?;
        Ok(self.apply(&cameras))
    }

    /// Starts a pipeline for every listed camera without one and stops every
    /// pipeline whose camera is no longer listed.
    ///
    /// Pipelines found dead are torn down first, so a listed camera gets a
    /// fresh one in the same pass.
    pub fn apply(&self, cameras: &[Camera]) -> ReconcileReport {
        let mut report = ReconcileReport {
            stopped: self.supervisor.reap_dead(),
            ..ReconcileReport::default()
        };
        let running = self.supervisor.running_ids();

        let mut desired = HashSet::with_capacity(cameras.len());
        for camera in cameras {
            if !desired.insert(camera.id.as_str()) {
                log::debug!("Ignoring duplicate registry entry for camera {}", camera.id);
                continue;
            }
            if running.contains(&camera.id) {
                continue;
            }
            match self.supervisor.start(camera) {
                Ok(()) => report.started.push(camera.id.clone()),
                Err(e) => {
                    log::warn!("{e}");
                    report.failed.push(camera.id.clone());
                }
            }
        }

        for id in running.iter().filter(|id| !desired.contains(id.as_str())) {
            if self.supervisor.stop(id) {
                report.stopped.push(id.clone());
            }
        }

        report
    }

    /// Reconciles once per poll interval until `shutdown` is cancelled.
    pub fn run(&self, shutdown: &CancellationToken) {
        log::info!(
            "Reconciling every {:.1}s",
            self.poll_interval.as_secs_f64()
        );
        while !shutdown.is_cancelled() {
            match self.reconcile_once() {
                Ok(report) if report.is_empty() => {
                    log::debug!(
                        "Camera set unchanged ({} running)",
                        self.supervisor.registry().len()
                    );
                }
                Ok(report) => {
                    log::info!(
                        "Reconciled: {} started, {} stopped, {} failed, {} running",
                        report.started.len(),
                        report.stopped.len(),
                        report.failed.len(),
                        self.supervisor.registry().len()
                    );
                }
                Err(e) => log::warn!("Skipping reconciliation: {e}"),
            }
            if shutdown.wait_timeout(self.poll_interval) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::thread;

    use super::*;
    use crate::supervision::pipeline_supervisor::test_support::{
        crashing_detection_supervisor, supervisor, wait_until_dead, FakeLauncher,
    };

    /// Camera source that replays scripted responses, repeating the last.
    struct ScriptedSource {
        responses: Mutex<Vec<Result<Vec<Camera>, RegistryError>>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<Camera>, RegistryError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    impl CameraSource for ScriptedSource {
        fn fetch_cameras(&self) -> Result<Vec<Camera>, RegistryError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                return responses.remove(0);
            }
            match &responses[0] {
                Ok(cameras) => Ok(cameras.clone()),
                Err(_) => Err(malformed()),
            }
        }
    }

    fn malformed() -> RegistryError {
        RegistryError::Decode {
            url: "http://registry/cameras".to_string(),
            source: serde_json::from_str::<Vec<Camera>>("[").unwrap_err(),
        }
    }

    fn cameras(ids: &[&str]) -> Vec<Camera> {
        ids.iter()
            .map(|id| Camera::new(*id, format!("rtsp://src/{id}")))
            .collect()
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn reconciler(
        launcher: Arc<FakeLauncher>,
        responses: Vec<Result<Vec<Camera>, RegistryError>>,
    ) -> Reconciler {
        Reconciler::new(
            Arc::new(ScriptedSource::new(responses)),
            Arc::new(supervisor(launcher)),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_first_pass_starts_every_camera() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(launcher.clone(), vec![Ok(cameras(&["a", "b"]))]);

        let report = reconciler.reconcile_once().unwrap();

        assert_eq!(report.started, vec!["a", "b"]);
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["a", "b"]));
        assert_eq!(launcher.launch_count(), 4);
    }

    #[test]
    fn test_unchanged_set_is_idempotent() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(launcher.clone(), vec![Ok(cameras(&["a", "b"]))]);
        reconciler.reconcile_once().unwrap();

        let report = reconciler.reconcile_once().unwrap();

        assert!(report.is_empty());
        assert_eq!(launcher.launch_count(), 4);
        assert!(!launcher.is_terminated(0));
    }

    #[test]
    fn test_removed_camera_is_stopped_and_others_untouched() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(
            launcher.clone(),
            vec![Ok(cameras(&["a", "b"])), Ok(cameras(&["b"]))],
        );
        reconciler.reconcile_once().unwrap();

        let report = reconciler.reconcile_once().unwrap();

        assert_eq!(report.stopped, vec!["a"]);
        assert!(report.started.is_empty());
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["b"]));
        let a_restream = launcher.find("rtsp://localhost:8554/a").unwrap();
        let b_restream = launcher.find("rtsp://localhost:8554/b").unwrap();
        assert!(launcher.is_terminated(a_restream));
        assert!(!launcher.is_terminated(b_restream));
        assert_eq!(launcher.launch_count(), 4);
    }

    #[test]
    fn test_converges_to_desired_set() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(launcher, vec![Ok(Vec::new())]);
        reconciler.apply(&cameras(&["a", "b", "c"]));

        reconciler.apply(&cameras(&["c", "d"]));

        assert_eq!(reconciler.supervisor().running_ids(), ids(&["c", "d"]));
    }

    #[test]
    fn test_malformed_registry_response_changes_nothing() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(
            launcher.clone(),
            vec![Ok(cameras(&["a"])), Err(malformed())],
        );
        reconciler.reconcile_once().unwrap();

        let result = reconciler.reconcile_once();

        assert!(matches!(result, Err(RegistryError::Decode { .. })));
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["a"]));
        assert!(!launcher.is_terminated(0));
    }

    #[test]
    fn test_duplicate_ids_start_one_pipeline() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(launcher.clone(), vec![Ok(Vec::new())]);
        let mut list = cameras(&["a"]);
        list.push(Camera::new("a", "rtsp://src/other"));

        let report = reconciler.apply(&list);

        assert_eq!(report.started, vec!["a"]);
        assert_eq!(launcher.launch_count(), 2);
        assert!(launcher.find("rtsp://src/other").is_none());
    }

    #[test]
    fn test_failed_start_is_retried_next_pass() {
        let launcher = Arc::new(FakeLauncher::failing_on("-update"));
        let reconciler = reconciler(launcher.clone(), vec![Ok(cameras(&["a"]))]);

        let first = reconciler.reconcile_once().unwrap();
        assert_eq!(first.failed, vec!["a"]);
        assert!(reconciler.supervisor().running_ids().is_empty());

        *launcher.fail_when_arg.lock().unwrap() = None;
        let second = reconciler.reconcile_once().unwrap();

        assert_eq!(second.started, vec!["a"]);
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["a"]));
    }

    #[test]
    fn test_crashed_pipeline_is_restarted_on_next_pass() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = reconciler(launcher.clone(), vec![Ok(cameras(&["a", "b"]))]);
        reconciler.reconcile_once().unwrap();

        launcher.crash(launcher.find("frames/a.jpg").unwrap());
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["b"]));

        let report = reconciler.reconcile_once().unwrap();

        assert_eq!(report.started, vec!["a"]);
        assert_eq!(reconciler.supervisor().running_ids(), ids(&["a", "b"]));
        assert_eq!(launcher.launch_count(), 6);
    }

    #[test]
    fn test_pipeline_with_dead_detection_is_replaced_next_pass() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = Reconciler::new(
            Arc::new(ScriptedSource::new(vec![Ok(cameras(&["a"]))])),
            Arc::new(crashing_detection_supervisor(launcher.clone())),
            Duration::from_millis(10),
        );
        reconciler.reconcile_once().unwrap();
        assert!(wait_until_dead(
            reconciler.supervisor(),
            "a",
            Duration::from_secs(5)
        ));

        let report = reconciler.reconcile_once().unwrap();

        assert_eq!(report.stopped, vec!["a"]);
        assert_eq!(report.started, vec!["a"]);
        assert_eq!(launcher.launch_count(), 4);
        assert!(launcher.is_terminated(0));
        assert!(launcher.is_terminated(1));
    }

    #[test]
    fn test_concurrent_crashes_and_passes_keep_one_pipeline_per_camera() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = Arc::new(reconciler(
            launcher.clone(),
            vec![Ok(cameras(&["a", "b", "c"]))],
        ));
        reconciler.reconcile_once().unwrap();

        let crasher = {
            let launcher = launcher.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let count = launcher.launch_count();
                    for index in 0..count {
                        launcher.crash(index);
                    }
                }
            })
        };
        for _ in 0..20 {
            reconciler.reconcile_once().unwrap();
        }
        crasher.join().unwrap();
        reconciler.reconcile_once().unwrap();

        let registry = reconciler.supervisor().registry();
        assert!(registry.len() <= 3);
        for id in ["a", "b", "c"] {
            let live = launcher
                .launched
                .lock()
                .unwrap()
                .iter()
                .filter(|l| {
                    l.spec.to_string().contains(&format!("frames/{id}.jpg"))
                        && !l.exited.load(std::sync::atomic::Ordering::SeqCst)
                })
                .count();
            assert!(live <= 1, "camera {id} has {live} live samplers");
        }
    }

    #[test]
    fn test_run_stops_when_cancelled() {
        let launcher = Arc::new(FakeLauncher::default());
        let reconciler = Arc::new(reconciler(launcher, vec![Ok(cameras(&["a"]))]));
        let shutdown = CancellationToken::new();

        let handle = {
            let reconciler = reconciler.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || reconciler.run(&shutdown))
        };
        thread::sleep(Duration::from_millis(50));
        shutdown.cancel();
        handle.join().unwrap();

        assert_eq!(reconciler.supervisor().running_ids(), ids(&["a"]));
    }
}
