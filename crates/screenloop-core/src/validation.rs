use crate::{Action, Condition, MatchMode, Step, StepKind, Workflow};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Step '{0}' is not a container but has children")]
    UnexpectedChildren(String),

    #[error("Loop '{0}' needs a condition step as its first child")]
    LoopWithoutCondition(String),

    #[error("Loop '{0}' has a maximum of zero iterations")]
    ZeroIterationCap(String),

    #[error("Retry '{0}' has a zero retry interval")]
    ZeroRetryInterval(String),

    #[error("Input pause '{0}' has no input-pause action")]
    MissingInputPauseAction(String),

    #[error("Step '{0}' carries an input-pause action but is not an input pause")]
    MisplacedInputPauseAction(String),

    #[error("Input pause '{0}' has no destination variable")]
    EmptyVariableName(String),

    #[error("Step '{name}' has confidence {confidence}, expected a value in (0, 1]")]
    ConfidenceOutOfRange { name: String, confidence: f32 },

    #[error("Step '{0}' has an empty template path")]
    EmptyTemplate(String),

    #[error("Step '{0}' clicks matches in turn but has a zero dedup radius")]
    ZeroDedupRadius(String),

    #[error("Step '{0}' has an empty text target")]
    EmptyTextTarget(String),

    #[error("Step '{0}' has an empty search region")]
    EmptyRegion(String),

    #[error("Step '{name}' jumps to step {target}, but its list has {len} steps")]
    GotoOutOfRange {
        name: String,
        target: usize,
        len: usize,
    },
}

/// Checks the structural rules the interpreter relies on. Runs before a
/// workflow is handed to the executor.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    validate_steps(&workflow.steps)
}

fn validate_steps(steps: &[Step]) -> Result<(), ValidationError> {
    for step in steps {
        validate_step(step, steps.len())?;
        validate_steps(&step.children)?;
    }
    Ok(())
}

fn validate_step(step: &Step, siblings: usize) -> Result<(), ValidationError> {
    if !step.kind.is_container() && !step.children.is_empty() {
        return Err(ValidationError::UnexpectedChildren(step.name.clone()));
    }

    match &step.kind {
        StepKind::Loop(params) => {
            if step.children.is_empty() {
                return Err(ValidationError::LoopWithoutCondition(step.name.clone()));
            }
            // A variable override may still replace a zero cap at run time.
            if params.max_iterations == 0 && params.iterations_variable.is_none() {
                return Err(ValidationError::ZeroIterationCap(step.name.clone()));
            }
        }
        StepKind::RetryUntilSuccess(params) if params.interval_ms == 0 => {
            return Err(ValidationError::ZeroRetryInterval(step.name.clone()));
        }
        StepKind::InputPause => match &step.action {
            Action::InputPause(params) if params.variable.trim().is_empty() => {
                return Err(ValidationError::EmptyVariableName(step.name.clone()));
            }
            Action::InputPause(_) => {}
            _ => return Err(ValidationError::MissingInputPauseAction(step.name.clone())),
        },
        _ => {}
    }

    if !matches!(step.kind, StepKind::InputPause) && matches!(step.action, Action::InputPause(_)) {
        return Err(ValidationError::MisplacedInputPauseAction(step.name.clone()));
    }

    if let Action::Goto { step_index } = step.action {
        if step_index == 0 || step_index > siblings {
            return Err(ValidationError::GotoOutOfRange {
                name: step.name.clone(),
                target: step_index,
                len: siblings,
            });
        }
    }

    validate_condition(step)
}

fn validate_condition(step: &Step) -> Result<(), ValidationError> {
    let region = match &step.condition {
        Condition::Time(_) => None,
        Condition::Image(image) => {
            if image.template.trim().is_empty() {
                return Err(ValidationError::EmptyTemplate(step.name.clone()));
            }
            if !(image.confidence > 0.0 && image.confidence <= 1.0) {
                return Err(ValidationError::ConfidenceOutOfRange {
                    name: step.name.clone(),
                    confidence: image.confidence,
                });
            }
            if image.match_mode == MatchMode::Sequential && image.dedup_radius_px == 0 {
                return Err(ValidationError::ZeroDedupRadius(step.name.clone()));
            }
            image.region
        }
        Condition::Color(color) => color.region,
        Condition::Text(text) => {
            if text.target.is_empty() {
                return Err(ValidationError::EmptyTextTarget(step.name.clone()));
            }
            text.region
        }
    };

    match region {
        Some(r) if r.is_empty() => Err(ValidationError::EmptyRegion(step.name.clone())),
        _ => Ok(()),
    }
}
