use screenloop_vision::MatchSettings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a sibling list does once one of its steps fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abandon the rest of the list and report failure upward.
    #[default]
    Stop,
    /// Keep going; the list still reports failure when it finishes.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(FailurePolicy::Stop),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "unknown failure policy '{}', expected 'stop' or 'continue'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Follow a curved, eased path instead of jumping.
    pub human_like: bool,
    pub duration_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            human_like: false,
            duration_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub failure_policy: FailurePolicy,
    /// Pause per iteration of a loop whose body is empty.
    pub loop_idle_ms: u64,
    /// Bound on remembered centres in sequential image mode.
    pub visited_capacity: usize,
    pub vision: MatchSettings,
    pub motion: MotionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Stop,
            loop_idle_ms: 100,
            visited_capacity: 64,
            vision: MatchSettings::default(),
            motion: MotionConfig::default(),
        }
    }
}
