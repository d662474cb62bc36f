use screenloop_vision::VisionError;
use thiserror::Error;

/// Faults that end a run. Unmet conditions and configuration mistakes are
/// not errors; they surface as a failed step.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Perception failed: {0}")]
    Perception(#[from] VisionError),

    #[error("Actuator failed: {0:#}")]
    Actuator(#[from] anyhow::Error),
}
