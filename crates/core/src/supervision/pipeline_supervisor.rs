use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::face_classifier::FaceClassifier;
use crate::frames::domain::frame_store::FrameStore;
use crate::process::domain::command_spec::CommandSpec;
use crate::process::domain::process_handle::{ExitCallback, ExitReason, ProcessHandle};
use crate::process::domain::process_launcher::{LaunchError, ProcessLauncher};
use crate::registry::alert_dispatcher::AlertDispatcher;
use crate::shared::camera::Camera;
use crate::supervision::cancellation::CancellationToken;
use crate::supervision::detection_task::{DetectionSettings, DetectionTask};
use crate::supervision::managed_pipeline::{DetectionWorker, ManagedPipeline, ProcessRole};
use crate::supervision::pipeline_commands::PipelineCommands;
use crate::supervision::pipeline_registry::PipelineRegistry;

#[derive(Error, Debug)]
pub enum StartError {
    #[error("camera {0} already has a running pipeline")]
    AlreadyRunning(String),
    #[error("failed to launch {role} process for camera {camera_id}: {source}")]
    Launch {
        camera_id: String,
        role: ProcessRole,
        #[source]
        source: LaunchError,
    },
    #[error("failed to start detection task for camera {camera_id}: {source}")]
    DetectionTask {
        camera_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts and stops per-camera pipelines as a unit.
///
/// A pipeline is two transcoder processes plus a detection task. If either
/// process exits on its own the whole pipeline is torn down and forgotten;
/// bringing it back is left to the next reconciliation pass.
pub struct PipelineSupervisor {
    registry: Arc<PipelineRegistry>,
    launcher: Arc<dyn ProcessLauncher>,
    commands: PipelineCommands,
    frame_store: Arc<dyn FrameStore>,
    classifier: Arc<dyn FaceClassifier>,
    dispatcher: AlertDispatcher,
    detection: DetectionSettings,
    next_generation: AtomicU64,
}

impl PipelineSupervisor {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        commands: PipelineCommands,
        frame_store: Arc<dyn FrameStore>,
        classifier: Arc<dyn FaceClassifier>,
        dispatcher: AlertDispatcher,
        detection: DetectionSettings,
    ) -> Self {
        Self {
            registry: Arc::new(PipelineRegistry::new()),
            launcher,
            commands,
            frame_store,
            classifier,
            dispatcher,
            detection,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    pub fn running_ids(&self) -> BTreeSet<String> {
        self.registry.ids()
    }

    /// Brings up the re-stream, the sampler and the detection task for
    /// `camera`, then registers the pipeline.
    ///
    /// On any failure everything already started is torn down again and
    /// nothing is registered.
    pub fn start(&self, camera: &Camera) -> Result<(), StartError> {
        if self.registry.contains(&camera.id) {
            return Err(StartError::AlreadyRunning(camera.id.clone()));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut restream = self.launch(
            camera,
            generation,
            ProcessRole::Restream,
            &self.commands.restream(camera),
        )?;

        let sample_path = self.frame_store.sample_location(&camera.id);
        let mut sampler = match self.launch(
            camera,
            generation,
            ProcessRole::Sampler,
            &self.commands.sampler(camera, &sample_path),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                abandon(&camera.id, &mut [(ProcessRole::Restream, &mut restream)]);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let task = DetectionTask::new(
            camera.id.clone(),
            self.frame_store.clone(),
            self.classifier.clone(),
            self.dispatcher.clone(),
            self.detection,
        );
        let thread = match task.spawn(token.clone()) {
            Ok(thread) => thread,
            Err(e) => {
                abandon(
                    &camera.id,
                    &mut [
                        (ProcessRole::Restream, &mut restream),
                        (ProcessRole::Sampler, &mut sampler),
                    ],
                );
                return Err(StartError::DetectionTask {
                    camera_id: camera.id.clone(),
                    source: e,
                });
            }
        };

        let pipeline = ManagedPipeline::new(
            camera.clone(),
            generation,
            sample_path,
            restream,
            sampler,
            DetectionWorker::new(token, thread),
        );
        if let Err(rejected) = self.registry.insert(pipeline) {
            rejected.teardown();
            return Err(StartError::AlreadyRunning(camera.id.clone()));
        }

        // An exit notice that fired before registration found nothing to remove.
        if self.registry.is_alive(&camera.id) == Some(false) {
            if let Some(dead) = self.registry.remove_generation(&camera.id, generation) {
                log::warn!(
                    "Pipeline for camera {} died during startup",
                    camera.display_name()
                );
                dead.teardown();
            }
            return Ok(());
        }

        log::info!(
            "Started pipeline for camera {} ({})",
            camera.display_name(),
            camera.id
        );
        Ok(())
    }

    /// Tears down the camera's pipeline, if it has one.
    ///
    /// The pipeline leaves the registry before its processes are asked to
    /// terminate, so a concurrent exit notice can't tear it down twice.
    pub fn stop(&self, camera_id: &str) -> bool {
        match self.registry.remove(camera_id) {
            Some(pipeline) => {
                log::info!(
                    "Stopping pipeline for camera {} ({camera_id})",
                    pipeline.camera().display_name()
                );
                pipeline.teardown();
                true
            }
            None => false,
        }
    }

    /// Tears down pipelines that died without an exit notice removing them,
    /// such as one whose detection thread panicked. Returns their ids.
    pub fn reap_dead(&self) -> Vec<String> {
        self.registry
            .remove_dead()
            .into_iter()
            .map(|pipeline| {
                let id = pipeline.camera_id().to_string();
                log::warn!("Pipeline for camera {id} is no longer alive; tearing it down");
                pipeline.teardown();
                id
            })
            .collect()
    }

    /// Tears down every pipeline; returns how many there were.
    pub fn stop_all(&self) -> usize {
        let pipelines = self.registry.drain();
        let count = pipelines.len();
        for pipeline in pipelines {
            log::info!("Stopping pipeline for camera {}", pipeline.camera_id());
            pipeline.teardown();
        }
        count
    }

    fn launch(
        &self,
        camera: &Camera,
        generation: u64,
        role: ProcessRole,
        spec: &CommandSpec,
    ) -> Result<Box<dyn ProcessHandle>, StartError> {
        log::debug!("Launching {role} for camera {}: {spec}", camera.id);
        let on_exit = exit_watcher(self.registry.clone(), camera.id.clone(), generation, role);
        self.launcher
            .launch(spec, on_exit)
            .map_err(|e| StartError::Launch {
                camera_id: camera.id.clone(),
                role,
                source: e,
            })
    }
}

/// Exit callback that tears down the owning pipeline on a crash.
fn exit_watcher(
    registry: Arc<PipelineRegistry>,
    camera_id: String,
    generation: u64,
    role: ProcessRole,
) -> ExitCallback {
    Box::new(move |reason: ExitReason| {
        if !reason.is_spontaneous() {
            return;
        }
        if let Some(pipeline) = registry.remove_generation(&camera_id, generation) {
            log::warn!(
                "{role} process for camera {camera_id} {reason}; tearing down its pipeline"
            );
            pipeline.teardown();
        }
    })
}

fn abandon(camera_id: &str, handles: &mut [(ProcessRole, &mut Box<dyn ProcessHandle>)]) {
    for (role, handle) in handles.iter_mut() {
        if let Err(e) = handle.terminate() {
            log::warn!("Failed to terminate {role} process for camera {camera_id}: {e}");
        }
    }
}
