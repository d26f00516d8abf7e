pub mod cancellation;
pub mod detection_task;
pub mod managed_pipeline;
pub mod pipeline_commands;
pub mod pipeline_registry;
pub mod pipeline_supervisor;
pub mod reconciler;
