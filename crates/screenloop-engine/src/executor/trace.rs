use super::{ExecutorEvent, ExecutorState, RunOutcome, WorkflowExecutor};
use crate::error::ExecutorError;
use screenloop_core::Step;
use tracing::{debug, error, info, warn};

impl WorkflowExecutor {
    pub(crate) fn emit(&self, event: ExecutorEvent) {
        // A dropped receiver only means nobody is watching.
        if self.event_tx.send(event).is_err() {
            debug!("Executor event dropped, receiver closed");
        }
    }

    pub(crate) fn log(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.emit(ExecutorEvent::Log(msg));
    }

    pub(crate) fn log_warning(&self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.emit(ExecutorEvent::Log(format!("Warning: {}", msg)));
    }

    pub(crate) fn emit_error(&self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("{}", msg);
        self.emit(ExecutorEvent::Error(msg));
    }

    pub(crate) fn emit_progress(&self, index: usize, step: &Step) {
        self.emit(ExecutorEvent::Progress {
            index,
            step_id: step.id,
            name: step.name.clone(),
        });
    }

    /// Maps a traversal result to an outcome and sends the closing events.
    pub(crate) fn finish(&self, result: Result<bool, ExecutorError>) -> RunOutcome {
        let outcome = match result {
            Err(e) => {
                self.emit_error(format!("Run aborted: {}", e));
                RunOutcome::Faulted
            }
            Ok(_) if self.control.is_stopped() => RunOutcome::Stopped,
            Ok(true) => RunOutcome::Succeeded,
            Ok(false) => RunOutcome::Failed,
        };

        self.log(match outcome {
            RunOutcome::Succeeded => "Workflow completed".to_string(),
            RunOutcome::Failed => "Workflow finished with a failed step".to_string(),
            RunOutcome::Stopped => "Workflow stopped".to_string(),
            RunOutcome::Faulted => "Workflow aborted".to_string(),
        });
        self.emit(ExecutorEvent::StateChanged(ExecutorState::Idle));
        self.emit(ExecutorEvent::Finished(outcome));
        outcome
    }
}
