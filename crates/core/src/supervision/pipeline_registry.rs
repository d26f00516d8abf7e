use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::supervision::managed_pipeline::ManagedPipeline;

/// The set of running pipelines, keyed by camera identifier.
///
/// The only shared mutable state in the supervisor. Every operation takes
/// the single internal lock, so insertions and removals never interleave.
/// Pipelines are handed out by value on removal and torn down by the
/// caller outside the lock.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: Mutex<HashMap<String, ManagedPipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline unless its camera already has one, in which case
    /// the pipeline is handed back untouched.
    pub fn insert(&self, pipeline: ManagedPipeline) -> Result<(), ManagedPipeline> {
        let mut pipelines = self.lock();
        if pipelines.contains_key(pipeline.camera_id()) {
            return Err(pipeline);
        }
        pipelines.insert(pipeline.camera_id().to_string(), pipeline);
        Ok(())
    }

    pub fn remove(&self, camera_id: &str) -> Option<ManagedPipeline> {
        self.lock().remove(camera_id)
    }

    /// Removes the pipeline only if it is still the given incarnation.
    pub fn remove_generation(&self, camera_id: &str, generation: u64) -> Option<ManagedPipeline> {
        let mut pipelines = self.lock();
        match pipelines.get(camera_id) {
            Some(p) if p.generation() == generation => pipelines.remove(camera_id),
            _ => None,
        }
    }

    pub fn contains(&self, camera_id: &str) -> bool {
        self.lock().contains_key(camera_id)
    }

    /// Liveness of the camera's pipeline, if it has one.
    pub fn is_alive(&self, camera_id: &str) -> Option<bool> {
        self.lock().get(camera_id).map(ManagedPipeline::is_alive)
    }

    /// Sorted snapshot of the managed camera identifiers.
    pub fn ids(&self) -> BTreeSet<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns every pipeline that is no longer alive.
    pub fn remove_dead(&self) -> Vec<ManagedPipeline> {
        let mut pipelines = self.lock();
        let dead: Vec<String> = pipelines
            .iter()
            .filter(|(_, p)| !p.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        dead.iter().filter_map(|id| pipelines.remove(id)).collect()
    }

    /// Removes and returns every pipeline.
    pub fn drain(&self) -> Vec<ManagedPipeline> {
        self.lock().drain().map(|(_, p)| p).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ManagedPipeline>> {
        self.pipelines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
