use super::{RunState, WorkflowExecutor};
use crate::error::ExecutorError;
use crate::motion::human_path;
use screenloop_core::{Action, Point, Step};
use std::thread;
use std::time::Duration;

impl WorkflowExecutor {
    pub(crate) fn execute_action(
        &self,
        step: &Step,
        state: &mut RunState,
    ) -> Result<bool, ExecutorError> {
        match &step.action {
            Action::None => {}
            Action::Move(point) => {
                let target = self.move_target(step, *point, state);
                self.log(format!("Moving to ({}, {})", target.x, target.y));
                self.move_pointer(target)?;
            }
            Action::Click(params) => {
                if let Some(target) = params.target.filter(|t| !t.is_origin()) {
                    self.move_pointer(target)?;
                }
                self.actuator.click()?;
                self.log("Clicked");
            }
            // The enclosing list performs the jump.
            Action::Goto { .. } => {}
            Action::TypeText { text } => {
                self.actuator.type_text(text)?;
                self.log(format!("Typed {} characters", text.chars().count()));
            }
            Action::InputPause(_) => {
                self.log_warning(format!(
                    "'{}' carries an input pause but is not an input-pause step",
                    step.name
                ));
            }
        }
        Ok(true)
    }

    /// Offset from the last match's centre for perceptual conditions,
    /// otherwise an absolute logical point.
    fn move_target(&self, step: &Step, point: Point, state: &RunState) -> Point {
        if !step.condition.is_perceptual() {
            return point;
        }
        match state.last_match {
            Some(last) => {
                let center = last.scale.point_to_logical(last.bounds.center());
                Point::new(center.x + point.x, center.y + point.y)
            }
            None => {
                self.log_warning(format!(
                    "No match recorded for '{}', moving to ({}, {}) as given",
                    step.name, point.x, point.y
                ));
                point
            }
        }
    }

    fn move_pointer(&self, target: Point) -> Result<(), ExecutorError> {
        let motion = &self.config.motion;
        if !motion.human_like {
            self.actuator.move_to(target)?;
            return Ok(());
        }

        let from = self.actuator.position()?;
        let path = human_path(from, target, motion.duration_ms, &mut rand::thread_rng());
        let pause = Duration::from_millis(motion.duration_ms) / path.len().max(1) as u32;
        for point in path {
            self.actuator.move_to(point)?;
            thread::sleep(pause);
        }
        Ok(())
    }
}
