use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::select;

use crate::detection::domain::detection_clusterer::cluster_detections;
use crate::detection::domain::face_classifier::{CascadeParams, FaceClassifier};
use crate::frames::domain::frame_store::FrameStore;
use crate::registry::alert_dispatcher::AlertDispatcher;
use crate::shared::constants::{CLUSTER_IOU_THRESHOLD, DETECTION_INTERVAL};
use crate::shared::detection::DetectionResult;
use crate::supervision::cancellation::CancellationToken;

/// Fixed parameters shared by every camera's detection task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionSettings {
    pub cascade: CascadeParams,
    pub iou_threshold: f64,
    pub interval: Duration,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            cascade: CascadeParams::default(),
            iou_threshold: CLUSTER_IOU_THRESHOLD,
            interval: DETECTION_INTERVAL,
        }
    }
}

/// Periodic sample → classify → alert job for one camera.
///
/// Ticks are independent: nothing carries over from one tick to the next,
/// so a face that stays in view raises an alert on every tick.
pub struct DetectionTask {
    camera_id: String,
    frame_store: Arc<dyn FrameStore>,
    classifier: Arc<dyn FaceClassifier>,
    dispatcher: AlertDispatcher,
    settings: DetectionSettings,
}

impl DetectionTask {
    pub fn new(
        camera_id: impl Into<String>,
        frame_store: Arc<dyn FrameStore>,
        classifier: Arc<dyn FaceClassifier>,
        dispatcher: AlertDispatcher,
        settings: DetectionSettings,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            frame_store,
            classifier,
            dispatcher,
            settings,
        }
    }

    /// Runs one detection pass and dispatches an alert if faces were found.
    ///
    /// An unreadable or undecodable sample frame skips the pass; the
    /// sampler rewrites the file constantly, so this is routine.
    pub fn tick(&self) -> Option<DetectionResult> {
        let frame = match self.frame_store.latest_frame(&self.camera_id) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Skipping detection tick for {}: {e}", self.camera_id);
                return None;
            }
        };

        let raw = self.classifier.run_cascade(&frame, &self.settings.cascade);
        let faces = cluster_detections(&raw, self.settings.iou_threshold);
        if faces.is_empty() {
            return None;
        }

        let result = DetectionResult::new(self.camera_id.clone(), faces.len());
        self.dispatcher.dispatch(&result);
        Some(result)
    }

    /// Starts the task on its own thread.
    ///
    /// Cancellation is checked at every tick boundary; a tick already in
    /// progress always runs to completion.
    pub fn spawn(self, token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("detect-{}", self.camera_id))
            .spawn(move || self.run(&token))
    }

    fn run(&self, token: &CancellationToken) {
        let ticker = crossbeam_channel::tick(self.settings.interval);
        loop {
            select! {
                recv(ticker) -> _ => {}
                recv(token.signal()) -> _ => {}
            }
            if token.is_cancelled() {
                break;
            }
            self.tick();
        }
        log::debug!("Detection task for {} stopped", self.camera_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::domain::frame_store::FrameError;
    use crate::registry::domain::alert_sink::{Alert, AlertSink};
    use crate::registry::domain::registry_error::RegistryError;
    use crate::shared::detection::Detection;
    use crate::shared::gray_frame::GrayFrame;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    // --- Stubs ---

    struct StubFrameStore {
        frame: Option<(u32, u32)>,
    }

    impl FrameStore for StubFrameStore {
        fn sample_location(&self, camera_id: &str) -> PathBuf {
            PathBuf::from(format!("/tmp/{camera_id}.jpg"))
        }

        fn latest_frame(&self, camera_id: &str) -> Result<GrayFrame, FrameError> {
            match self.frame {
                Some((w, h)) => Ok(GrayFrame::new(vec![0u8; (w * h) as usize], w, h)),
                None => Err(FrameError::Read {
                    path: self.sample_location(camera_id),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }

    struct StubClassifier {
        detections: Vec<Detection>,
        calls: AtomicUsize,
        seen_dims: Mutex<Vec<(u32, u32)>>,
    }

    impl StubClassifier {
        fn new(detections: Vec<Detection>) -> Arc<Self> {
            Arc::new(Self {
                detections,
                calls: AtomicUsize::new(0),
                seen_dims: Mutex::new(Vec::new()),
            })
        }
    }

    impl FaceClassifier for StubClassifier {
        fn run_cascade(&self, frame: &GrayFrame, _params: &CascadeParams) -> Vec<Detection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_dims
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            self.detections.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Alert>>,
    }

    impl AlertSink for RecordingSink {
        fn send_alert(&self, alert: &Alert) -> Result<(), RegistryError> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn task(
        frame: Option<(u32, u32)>,
        classifier: Arc<StubClassifier>,
        sink: Arc<RecordingSink>,
        interval: Duration,
    ) -> DetectionTask {
        DetectionTask::new(
            "cam-1",
            Arc::new(StubFrameStore { frame }),
            classifier,
            AlertDispatcher::new(sink),
            DetectionSettings {
                interval,
                ..DetectionSettings::default()
            },
        )
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    // --- Single ticks ---

    #[test]
    fn test_no_faces_emits_no_alert() {
        let sink = Arc::new(RecordingSink::default());
        let t = task(Some((640, 480)), StubClassifier::new(vec![]), sink.clone(), DETECTION_INTERVAL);

        assert!(t.tick().is_none());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_two_separate_faces_emit_one_alert_with_count_two() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![
            Detection::new(120, 100, 80, 4.0),
            Detection::new(120, 400, 80, 3.0),
        ]);
        let t = task(Some((640, 480)), classifier, sink.clone(), DETECTION_INTERVAL);

        let result = t.tick().unwrap();

        assert_eq!(result.face_count, 2);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].camera_id, "cam-1");
        assert_eq!(sent[0].message, "Detected 2 face(s)");
    }

    #[test]
    fn test_overlapping_hits_count_as_one_face() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![
            Detection::new(120, 100, 80, 4.0),
            Detection::new(124, 104, 80, 2.0),
        ]);
        let t = task(Some((640, 480)), classifier, sink.clone(), DETECTION_INTERVAL);

        assert_eq!(t.tick().unwrap().face_count, 1);
        assert_eq!(sink.sent.lock().unwrap()[0].message, "Detected 1 face(s)");
    }

    #[test]
    fn test_unreadable_frame_skips_classification() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![Detection::new(120, 100, 80, 4.0)]);
        let t = task(None, classifier.clone(), sink.clone(), DETECTION_INTERVAL);

        assert!(t.tick().is_none());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_classifier_sees_actual_frame_dimensions() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![]);
        let t = task(Some((1280, 720)), classifier.clone(), sink, DETECTION_INTERVAL);

        t.tick();

        assert_eq!(*classifier.seen_dims.lock().unwrap(), vec![(1280, 720)]);
    }

    // --- Background loop ---

    #[test]
    fn test_repeated_ticks_alert_every_time() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![Detection::new(120, 100, 80, 4.0)]);
        let t = task(Some((320, 240)), classifier, sink.clone(), Duration::from_millis(10));
        let token = CancellationToken::new();

        let handle = t.spawn(token.clone()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || sink.sent.lock().unwrap().len() >= 3));

        token.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_cancel_stops_further_ticks() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![]);
        let t = task(Some((320, 240)), classifier.clone(), sink, Duration::from_millis(10));
        let token = CancellationToken::new();

        let handle = t.spawn(token.clone()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            classifier.calls.load(Ordering::SeqCst) > 0
        }));
        token.cancel();
        handle.join().unwrap();

        let calls = classifier.calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_cancelled_before_first_tick_never_classifies() {
        let sink = Arc::new(RecordingSink::default());
        let classifier = StubClassifier::new(vec![]);
        let t = task(Some((320, 240)), classifier.clone(), sink, Duration::from_secs(60));
        let token = CancellationToken::new();
        token.cancel();

        t.spawn(token).unwrap().join().unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }
}
