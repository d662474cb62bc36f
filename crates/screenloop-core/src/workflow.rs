use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<Step>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "New Workflow".to_string(),
            steps: vec![],
        }
    }
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_steps(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::new(name)
        }
    }

    /// Depth-first search for a step anywhere in the tree.
    pub fn find_step(&self, id: Uuid) -> Option<&Step> {
        fn walk(steps: &[Step], id: Uuid) -> Option<&Step> {
            for step in steps {
                if step.id == id {
                    return Some(step);
                }
                if let Some(found) = walk(&step.children, id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.steps, id)
    }

    /// Total number of steps in the tree, containers included.
    pub fn step_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps.iter().map(|s| 1 + count(&s.children)).sum()
        }
        count(&self.steps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub name: String,
    pub kind: StepKind,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub children: Vec<Step>,
    /// Pause after the step finishes, before its next sibling starts.
    #[serde(default)]
    pub delay_ms: u64,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            condition: Condition::default(),
            action: Action::None,
            children: vec![],
            delay_ms: 0,
        }
    }

    /// A plain condition + action step.
    pub fn sequence(name: impl Into<String>, condition: Condition, action: Action) -> Self {
        Self {
            condition,
            action,
            ..Self::new(name, StepKind::Sequence)
        }
    }

    pub fn branch(name: impl Into<String>, condition: Condition, children: Vec<Step>) -> Self {
        Self {
            condition,
            children,
            ..Self::new(name, StepKind::Branch)
        }
    }

    /// `condition_step` decides each iteration; `body` runs when the mode says so.
    pub fn looping(
        name: impl Into<String>,
        params: LoopParams,
        condition_step: Step,
        body: Vec<Step>,
    ) -> Self {
        let mut children = Vec::with_capacity(body.len() + 1);
        children.push(condition_step);
        children.extend(body);
        Self {
            children,
            ..Self::new(name, StepKind::Loop(params))
        }
    }

    pub fn retry(name: impl Into<String>, params: RetryParams, children: Vec<Step>) -> Self {
        Self {
            children,
            ..Self::new(name, StepKind::RetryUntilSuccess(params))
        }
    }

    pub fn input_pause(
        name: impl Into<String>,
        prompt: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::InputPause(InputPauseParams {
                prompt: prompt.into(),
                variable: variable.into(),
            }),
            ..Self::new(name, StepKind::InputPause)
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

// =============================================================================
// Step kinds
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepKind {
    Sequence,
    Branch,
    Loop(LoopParams),
    RetryUntilSuccess(RetryParams),
    InputPause,
}

impl StepKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            StepKind::Sequence => "Sequence",
            StepKind::Branch => "Branch",
            StepKind::Loop(_) => "Loop",
            StepKind::RetryUntilSuccess(_) => "Retry Until Success",
            StepKind::InputPause => "Input Pause",
        }
    }

    /// Only containers may own children.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            StepKind::Branch | StepKind::Loop(_) | StepKind::RetryUntilSuccess(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Run the body while the condition step succeeds.
    #[default]
    RunWhileFound,
    /// Run the body while the condition step fails.
    RunUntilFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopParams {
    #[serde(default)]
    pub mode: LoopMode,
    pub max_iterations: u32,
    /// When set and holding an integer at run time, replaces `max_iterations`.
    #[serde(default)]
    pub iterations_variable: Option<String>,
}

impl Default for LoopParams {
    fn default() -> Self {
        Self {
            mode: LoopMode::RunWhileFound,
            max_iterations: 100,
            iterations_variable: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryParams {
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            interval_ms: 500,
        }
    }
}

// =============================================================================
// Conditions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    Time(TimeCondition),
    Image(ImageCondition),
    Color(ColorCondition),
    Text(TextCondition),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Time(TimeCondition { wait_ms: 0 })
    }
}

impl Condition {
    pub fn wait_ms(wait_ms: u64) -> Self {
        Condition::Time(TimeCondition { wait_ms })
    }

    pub fn image(template: impl Into<String>) -> Self {
        Condition::Image(ImageCondition {
            template: template.into(),
            ..Default::default()
        })
    }

    pub fn color(target: impl Into<String>, tolerance: u8) -> Self {
        Condition::Color(ColorCondition {
            target: target.into(),
            tolerance,
            region: None,
            match_index: 0,
        })
    }

    pub fn text(target: impl Into<String>) -> Self {
        Condition::Text(TextCondition {
            target: target.into(),
            region: None,
        })
    }

    /// Whether evaluating this condition can produce a match region.
    pub fn is_perceptual(&self) -> bool {
        !matches!(self, Condition::Time(_))
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Condition::Time(_) => "Time",
            Condition::Image(_) => "Image",
            Condition::Color(_) => "Color",
            Condition::Text(_) => "Text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCondition {
    pub wait_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[default]
    Single,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCondition {
    /// Template path, relative to the workflow's asset root unless absolute.
    pub template: String,
    pub confidence: f32,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub match_mode: MatchMode,
    pub dedup_radius_px: u32,
}

impl Default for ImageCondition {
    fn default() -> Self {
        Self {
            template: String::new(),
            confidence: 0.8,
            region: None,
            match_mode: MatchMode::Single,
            dedup_radius_px: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorCondition {
    /// `#RRGGBB` or `RRGGBB`.
    pub target: String,
    #[serde(default)]
    pub tolerance: u8,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub match_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCondition {
    pub target: String,
    #[serde(default)]
    pub region: Option<Region>,
}

// =============================================================================
// Actions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[default]
    None,
    /// Absolute logical target, or an offset from the last match's centre
    /// when the owning step's condition is perceptual.
    Move(Point),
    Click(ClickParams),
    /// 1-based index into the sibling list that holds the step.
    Goto { step_index: usize },
    InputPause(InputPauseParams),
    TypeText { text: String },
}

impl Action {
    pub fn display_name(&self) -> &'static str {
        match self {
            Action::None => "None",
            Action::Move(_) => "Move",
            Action::Click(_) => "Click",
            Action::Goto { .. } => "Goto",
            Action::InputPause(_) => "Input Pause",
            Action::TypeText { .. } => "Type Text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClickParams {
    /// Moved to first when set and not (0, 0).
    #[serde(default)]
    pub target: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPauseParams {
    pub prompt: String,
    pub variable: String,
}

// =============================================================================
// Geometry shared with the editor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

/// Screen rectangle in logical points, as drawn by the region picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_workflow_json() {
        let json = r##"{
            "id": "6f1c1e0a-9a53-4f0e-8a3e-1d6f1b1f2a10",
            "name": "Collect rewards",
            "steps": [
                {
                    "id": "8b0f5c0e-1c59-4a4e-9a36-0c6b8d7f9e01",
                    "name": "Wait for lobby",
                    "kind": { "type": "RetryUntilSuccess", "timeout_ms": 5000, "interval_ms": 250 },
                    "children": [
                        {
                            "id": "0c8e6d8a-5d0b-4f7c-a0b3-4d1f6c9e7a22",
                            "name": "Find lobby",
                            "kind": { "type": "Sequence" },
                            "condition": {
                                "type": "Image",
                                "template": "lobby.png",
                                "confidence": 0.9,
                                "dedup_radius_px": 12
                            },
                            "action": { "type": "Move", "x": 4, "y": -2 }
                        }
                    ]
                },
                {
                    "id": "2a4b6c8d-0e1f-4a3b-9c5d-7e9f1a3b5c7d",
                    "name": "Ask count",
                    "kind": { "type": "InputPause" },
                    "action": { "type": "InputPause", "prompt": "How many?", "variable": "count" },
                    "delay_ms": 50
                }
            ]
        }"##;

        let workflow: Workflow = serde_json::from_str(json).unwrap();
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.step_count(), 3);

        let retry = &workflow.steps[0];
        assert_eq!(
            retry.kind,
            StepKind::RetryUntilSuccess(RetryParams {
                timeout_ms: 5000,
                interval_ms: 250
            })
        );
        // Containers default to an instant time condition.
        assert_eq!(retry.condition, Condition::wait_ms(0));

        let find = &retry.children[0];
        match &find.condition {
            Condition::Image(image) => {
                assert_eq!(image.template, "lobby.png");
                assert_eq!(image.match_mode, MatchMode::Single);
                assert!(image.region.is_none());
            }
            other => panic!("expected image condition, got {:?}", other),
        }
        assert_eq!(find.action, Action::Move(Point::new(4, -2)));

        let pause = &workflow.steps[1];
        assert_eq!(pause.delay_ms, 50);
        assert!(matches!(pause.action, Action::InputPause(ref p) if p.variable == "count"));
    }

    #[test]
    fn find_step_descends_into_children() {
        let inner = Step::sequence("inner", Condition::wait_ms(0), Action::None);
        let inner_id = inner.id;
        let workflow = Workflow::with_steps(
            "w",
            vec![Step::branch("outer", Condition::image("a.png"), vec![inner])],
        );

        assert_eq!(workflow.find_step(inner_id).map(|s| s.name.as_str()), Some("inner"));
        assert!(workflow.find_step(Uuid::new_v4()).is_none());
    }

    #[test]
    fn looping_puts_condition_step_first() {
        let cond = Step::sequence("look", Condition::image("x.png"), Action::None);
        let body = Step::sequence("click", Condition::wait_ms(0), Action::Click(ClickParams::default()));
        let step = Step::looping("loop", LoopParams::default(), cond, vec![body]);

        assert_eq!(step.children.len(), 2);
        assert_eq!(step.children[0].name, "look");
        assert!(step.kind.is_container());
    }
}
