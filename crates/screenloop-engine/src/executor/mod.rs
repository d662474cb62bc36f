mod action;
mod condition;
mod run_loop;
mod trace;


use crate::actuator::{Actuator, EnigoActuator};
use crate::config::EngineConfig;
use crate::control::RunControl;
use screenloop_core::assets::{AssetResolver, AssetRoot};
use screenloop_core::variables::VariableStore;
use screenloop_core::{Step, Workflow};
use screenloop_vision::{
    DisplayScale, MatchBox, ScreenSource, TextRecognizer, VisitedMatches, XcapScreen,
};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Succeeded,
    /// The top-level list reported failure.
    Failed,
    Stopped,
    /// A capture or actuator fault ended the run early.
    Faulted,
}

/// Events sent from the executor to whoever presents the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutorEvent {
    Log(String),
    StateChanged(ExecutorState),
    /// `index` counts every step entered during the run, starting at 1.
    Progress {
        index: usize,
        step_id: Uuid,
        name: String,
    },
    /// Answer with `RunControl::provide_input`.
    InputRequested {
        prompt: String,
        variable: String,
    },
    Error(String),
    Finished(RunOutcome),
}

/// The most recent match, with the scale of the frame it came from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LastMatch {
    pub bounds: MatchBox,
    pub scale: DisplayScale,
}

/// Traversal state for one run. Created fresh by `run` and `run_step`.
pub(crate) struct RunState {
    pub step_counter: usize,
    pub last_match: Option<LastMatch>,
    pub variables: VariableStore,
    pub visited: VisitedMatches,
}

impl RunState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            step_counter: 0,
            last_match: None,
            variables: VariableStore::new(),
            visited: VisitedMatches::new(config.visited_capacity),
        }
    }
}

pub struct WorkflowExecutor {
    workflow: Workflow,
    config: EngineConfig,
    screen: Box<dyn ScreenSource>,
    text: Option<Box<dyn TextRecognizer>>,
    actuator: Box<dyn Actuator>,
    assets: Box<dyn AssetResolver>,
    control: Arc<RunControl>,
    event_tx: UnboundedSender<ExecutorEvent>,
}

impl WorkflowExecutor {
    /// Uses the primary monitor, the real pointer, no OCR, and resolves
    /// templates against the working directory.
    pub fn new(
        workflow: Workflow,
        config: EngineConfig,
        event_tx: UnboundedSender<ExecutorEvent>,
    ) -> Self {
        Self {
            workflow,
            config,
            screen: Box::new(XcapScreen::new()),
            text: None,
            actuator: Box::new(EnigoActuator),
            assets: Box::new(AssetRoot::default()),
            control: Arc::new(RunControl::new()),
            event_tx,
        }
    }

    pub fn with_screen(mut self, screen: impl ScreenSource + 'static) -> Self {
        self.screen = Box::new(screen);
        self
    }

    pub fn with_actuator(mut self, actuator: impl Actuator + 'static) -> Self {
        self.actuator = Box::new(actuator);
        self
    }

    pub fn with_text_recognizer(mut self, recognizer: impl TextRecognizer + 'static) -> Self {
        self.text = Some(Box::new(recognizer));
        self
    }

    pub fn with_assets(mut self, assets: impl AssetResolver + 'static) -> Self {
        self.assets = Box::new(assets);
        self
    }

    pub fn control(&self) -> Arc<RunControl> {
        self.control.clone()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Runs the whole workflow on the calling thread. `Finished` is always
    /// the last event sent.
    pub fn run(&self) -> RunOutcome {
        self.emit(ExecutorEvent::StateChanged(ExecutorState::Running));
        self.log(format!(
            "Starting workflow '{}' ({} steps)",
            self.workflow.name,
            self.workflow.step_count()
        ));

        let mut state = RunState::new(&self.config);
        let result = self.execute_steps(&self.workflow.steps, &mut state);
        self.finish(result)
    }

    /// Test-runs one step: its condition and, when met, its action.
    /// Children are not entered and no state carries over to later runs.
    pub fn run_step(&self, step: &Step) -> RunOutcome {
        self.emit(ExecutorEvent::StateChanged(ExecutorState::Running));
        self.log(format!("Testing step '{}'", step.name));

        let mut state = RunState::new(&self.config);
        let result = self.execute_single(step, &mut state);
        self.finish(result)
    }

    /// Moves the executor onto a dedicated worker thread.
    pub fn spawn(self) -> std::io::Result<RunHandle> {
        let control = self.control.clone();
        let thread = thread::Builder::new()
            .name("screenloop-run".to_string())
            .spawn(move || {
                match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        self.emit_error("Run aborted by a panic");
                        self.emit(ExecutorEvent::StateChanged(ExecutorState::Idle));
                        self.emit(ExecutorEvent::Finished(RunOutcome::Faulted));
                        RunOutcome::Faulted
                    }
                }
            })?;
        Ok(RunHandle { control, thread })
    }
}

/// Owner's side of a spawned run.
pub struct RunHandle {
    control: Arc<RunControl>,
    thread: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn provide_input(&self, value: impl Into<String>) {
        self.control.provide_input(value);
    }

    pub fn control(&self) -> Arc<RunControl> {
        self.control.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> RunOutcome {
        self.thread.join().unwrap_or(RunOutcome::Faulted)
    }
}
