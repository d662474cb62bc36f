use super::{ExecutorEvent, RunState, WorkflowExecutor};
use crate::config::FailurePolicy;
use crate::error::ExecutorError;
use screenloop_core::variables::VariableValue;
use screenloop_core::{Action, LoopMode, LoopParams, RetryParams, Step, StepKind};
use std::time::{Duration, Instant};

type StepResult = Result<bool, ExecutorError>;

impl WorkflowExecutor {
    /// Runs a sibling list under the configured failure policy.
    pub(crate) fn execute_steps(&self, steps: &[Step], state: &mut RunState) -> StepResult {
        self.execute_list(steps, state, self.config.failure_policy)
    }

    fn execute_list(
        &self,
        steps: &[Step],
        state: &mut RunState,
        policy: FailurePolicy,
    ) -> StepResult {
        let mut all_succeeded = true;
        let mut cursor = 0;

        while cursor < steps.len() {
            if self.control.is_stopped() {
                return Ok(false);
            }

            let step = &steps[cursor];
            let succeeded = self.execute_step(step, state)?;

            if !succeeded {
                if self.control.is_stopped() {
                    return Ok(false);
                }
                all_succeeded = false;
                match policy {
                    FailurePolicy::Stop => {
                        self.log(format!("Stopping at failed step '{}'", step.name));
                        return Ok(false);
                    }
                    FailurePolicy::Continue => {
                        self.log(format!("Continuing past failed step '{}'", step.name));
                    }
                }
            }

            if step.delay_ms > 0 && !self.control.sleep(Duration::from_millis(step.delay_ms)) {
                return Ok(false);
            }

            cursor = match (&step.kind, &step.action) {
                (StepKind::Sequence, Action::Goto { step_index }) if succeeded => {
                    if *step_index >= 1 && *step_index <= steps.len() {
                        self.log(format!("Jumping to step {}", step_index));
                        step_index - 1
                    } else {
                        self.log_warning(format!(
                            "Goto target {} is outside this list of {} steps, ignoring",
                            step_index,
                            steps.len()
                        ));
                        cursor + 1
                    }
                }
                _ => cursor + 1,
            };
        }

        Ok(all_succeeded)
    }

    pub(crate) fn execute_step(&self, step: &Step, state: &mut RunState) -> StepResult {
        state.step_counter += 1;
        self.emit_progress(state.step_counter, step);
        self.log(format!(
            "Step {}: {} ({})",
            state.step_counter,
            step.name,
            step.kind.display_name()
        ));

        let succeeded = match &step.kind {
            StepKind::Sequence => self.run_sequence(step, state)?,
            StepKind::Branch => self.run_branch(step, state)?,
            StepKind::Loop(params) => self.run_loop(step, params, state)?,
            StepKind::RetryUntilSuccess(params) => self.run_retry(step, params, state)?,
            StepKind::InputPause => self.run_input_pause(step, state)?,
        };

        self.log(format!(
            "Step '{}' {}",
            step.name,
            if succeeded { "succeeded" } else { "failed" }
        ));
        Ok(succeeded)
    }

    /// Condition, then action, for any kind. Children are never entered.
    pub(crate) fn execute_single(&self, step: &Step, state: &mut RunState) -> StepResult {
        state.step_counter += 1;
        self.emit_progress(state.step_counter, step);

        if matches!(step.kind, StepKind::InputPause) {
            return self.run_input_pause(step, state);
        }
        if !self.evaluate_condition(&step.condition, state)? {
            self.log(format!("Condition not met for '{}'", step.name));
            return Ok(false);
        }
        self.execute_action(step, state)
    }

    fn run_sequence(&self, step: &Step, state: &mut RunState) -> StepResult {
        if !self.evaluate_condition(&step.condition, state)? {
            self.log(format!("Condition not met for '{}'", step.name));
            return Ok(false);
        }
        self.execute_action(step, state)
    }

    /// A branch that is not taken still succeeds.
    fn run_branch(&self, step: &Step, state: &mut RunState) -> StepResult {
        if !self.evaluate_condition(&step.condition, state)? {
            self.log(format!("Branch '{}' not taken", step.name));
            return Ok(true);
        }
        self.execute_steps(&step.children, state)
    }

    fn run_loop(&self, step: &Step, params: &LoopParams, state: &mut RunState) -> StepResult {
        let Some((condition_step, body)) = step.children.split_first() else {
            self.log_warning(format!("Loop '{}' has no condition step", step.name));
            return Ok(false);
        };

        let cap = self.iteration_cap(step, params, state);
        let mut iterations: u32 = 0;

        loop {
            if self.control.is_stopped() {
                return Ok(false);
            }
            if iterations >= cap {
                self.log(format!(
                    "Loop '{}' reached its limit of {} iterations",
                    step.name, cap
                ));
                return Ok(true);
            }

            let found = self.execute_step(condition_step, state)?;
            if self.control.is_stopped() {
                return Ok(false);
            }

            let run_body = match params.mode {
                LoopMode::RunWhileFound => found,
                LoopMode::RunUntilFound => !found,
            };
            if !run_body {
                self.log(format!(
                    "Loop '{}' done after {} iterations",
                    step.name, iterations
                ));
                return Ok(true);
            }

            if body.is_empty() {
                let idle = Duration::from_millis(self.config.loop_idle_ms);
                if !self.control.sleep(idle) {
                    return Ok(false);
                }
            } else if !self.execute_steps(body, state)? {
                if !self.control.is_stopped() {
                    self.log(format!("Loop '{}' body failed, leaving loop", step.name));
                }
                return Ok(false);
            }

            iterations += 1;
        }
    }

    /// The variable override wins when it holds an integer.
    fn iteration_cap(&self, step: &Step, params: &LoopParams, state: &RunState) -> u32 {
        let Some(name) = params.iterations_variable.as_deref() else {
            return params.max_iterations;
        };
        match state.variables.get_integer(name) {
            Some(n) => {
                let cap = n.clamp(0, u32::MAX as i64) as u32;
                self.log(format!(
                    "Loop '{}' limited to {} iterations by '{}'",
                    step.name, cap, name
                ));
                cap
            }
            None => {
                self.log(format!(
                    "Variable '{}' holds no integer, loop '{}' uses its limit of {}",
                    name, step.name, params.max_iterations
                ));
                params.max_iterations
            }
        }
    }

    fn run_retry(&self, step: &Step, params: &RetryParams, state: &mut RunState) -> StepResult {
        let started = Instant::now();
        let timeout = Duration::from_millis(params.timeout_ms);
        let interval = Duration::from_millis(params.interval_ms);
        let mut attempt = 0u32;

        loop {
            if self.control.is_stopped() {
                return Ok(false);
            }
            attempt += 1;

            // Every child must pass within one attempt, whatever the policy.
            if self.execute_list(&step.children, state, FailurePolicy::Stop)? {
                self.log(format!(
                    "'{}' succeeded on attempt {}",
                    step.name, attempt
                ));
                return Ok(true);
            }
            if self.control.is_stopped() {
                return Ok(false);
            }
            if started.elapsed() >= timeout {
                self.log(format!(
                    "'{}' timed out after {} attempts ({} ms)",
                    step.name, attempt, params.timeout_ms
                ));
                return Ok(false);
            }
            if !self.control.sleep(interval) {
                return Ok(false);
            }
        }
    }

    fn run_input_pause(&self, step: &Step, state: &mut RunState) -> StepResult {
        let Action::InputPause(params) = &step.action else {
            self.log_warning(format!("Input pause '{}' has nothing to ask", step.name));
            return Ok(false);
        };

        self.emit(ExecutorEvent::InputRequested {
            prompt: params.prompt.clone(),
            variable: params.variable.clone(),
        });
        self.log(format!("Waiting for input: {}", params.prompt));

        let Some(raw) = self.control.await_input() else {
            self.log("Input cancelled");
            return Ok(false);
        };

        let value = VariableValue::from_input(&raw);
        self.log(format!("Set '{}' = {}", params.variable, value));
        state.variables.set(params.variable.clone(), value);
        Ok(true)
    }
}
