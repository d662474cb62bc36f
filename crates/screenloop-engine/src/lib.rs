pub mod actuator;
mod config;
mod control;
mod error;
pub mod executor;
pub mod motion;

pub use actuator::{Actuator, EnigoActuator};
pub use config::{EngineConfig, FailurePolicy, MotionConfig};
pub use control::RunControl;
pub use error::ExecutorError;
pub use executor::{ExecutorEvent, ExecutorState, RunHandle, RunOutcome, WorkflowExecutor};
