use super::{LastMatch, RunState, WorkflowExecutor};
use crate::error::ExecutorError;
use screenloop_core::{ColorCondition, Condition, ImageCondition, MatchMode, TextCondition};
use screenloop_vision::color::find_color;
use screenloop_vision::geometry::dedup;
use screenloop_vision::template::{find_template, load_template};
use screenloop_vision::text::find_text;
use screenloop_vision::{ScreenFrame, VisionError, VisionResult};
use std::time::Duration;

impl WorkflowExecutor {
    /// `Ok(false)` for an unmet condition or a configuration mistake;
    /// `Err` only for faults that should end the run.
    pub(crate) fn evaluate_condition(
        &self,
        condition: &Condition,
        state: &mut RunState,
    ) -> Result<bool, ExecutorError> {
        match condition {
            Condition::Time(time) => {
                if time.wait_ms == 0 {
                    return Ok(true);
                }
                Ok(self.control.sleep(Duration::from_millis(time.wait_ms)))
            }
            Condition::Image(image) => self.evaluate_image(image, state),
            Condition::Color(color) => self.evaluate_color(color, state),
            Condition::Text(text) => Ok(self.evaluate_text(text, state)),
        }
    }

    fn evaluate_image(
        &self,
        image: &ImageCondition,
        state: &mut RunState,
    ) -> Result<bool, ExecutorError> {
        let path = self.assets.resolve(&image.template);
        let Some(template) = self.configured("Image condition", load_template(&path))? else {
            return Ok(false);
        };
        let frame = self.screen.capture()?;
        let Some(hits) = self.configured(
            "Image condition",
            find_template(
                &frame,
                &template,
                image.confidence,
                image.region,
                &self.config.vision,
            ),
        )?
        else {
            return Ok(false);
        };

        if hits.is_empty() {
            self.log(format!("'{}' not found", image.template));
            return Ok(false);
        }

        let chosen = match image.match_mode {
            MatchMode::Single => hits[0],
            MatchMode::Sequential => {
                let radius = image.dedup_radius_px as f64;
                let distinct = dedup(hits, radius);
                match state.visited.first_unvisited(&distinct, radius) {
                    Some(m) => {
                        state.visited.push(m.center());
                        m
                    }
                    None => {
                        self.log(format!(
                            "All {} matches of '{}' already visited",
                            distinct.len(),
                            image.template
                        ));
                        return Ok(false);
                    }
                }
            }
        };

        self.log(format!(
            "Found '{}' at ({}, {})",
            image.template, chosen.left, chosen.top
        ));
        state.last_match = Some(LastMatch {
            bounds: chosen,
            scale: frame.scale,
        });
        Ok(true)
    }

    fn evaluate_color(
        &self,
        color: &ColorCondition,
        state: &mut RunState,
    ) -> Result<bool, ExecutorError> {
        let frame = self.screen.capture()?;
        let Some(hits) = self.configured(
            "Color condition",
            find_color(
                &frame,
                &color.target,
                color.tolerance,
                color.region,
                &self.config.vision,
            ),
        )?
        else {
            return Ok(false);
        };

        let Some(chosen) = hits.get(color.match_index).copied() else {
            if hits.is_empty() {
                self.log(format!("Colour {} not found", color.target));
            } else {
                self.log(format!(
                    "Colour {}: match {} requested, only {} found",
                    color.target,
                    color.match_index,
                    hits.len()
                ));
            }
            return Ok(false);
        };

        self.log(format!(
            "Found colour {} at ({}, {})",
            color.target, chosen.left, chosen.top
        ));
        state.last_match = Some(LastMatch {
            bounds: chosen,
            scale: frame.scale,
        });
        Ok(true)
    }

    /// Never faults: a missing backend, a capture error, or an OCR error
    /// all just fail the condition.
    fn evaluate_text(&self, text: &TextCondition, state: &mut RunState) -> bool {
        let Some(recognizer) = self.text.as_deref() else {
            self.log(format!("Text condition failed: {}", VisionError::TextUnavailable));
            return false;
        };

        let result = self.screen.capture().and_then(|frame: ScreenFrame| {
            find_text(&frame, recognizer, &text.target, text.region)
                .map(|hits| (hits, frame.scale))
        });

        match result {
            Ok((hits, scale)) => match hits.first() {
                Some(chosen) => {
                    self.log(format!(
                        "Found text '{}' at ({}, {})",
                        text.target, chosen.left, chosen.top
                    ));
                    state.last_match = Some(LastMatch {
                        bounds: *chosen,
                        scale,
                    });
                    true
                }
                None => {
                    self.log(format!("Text '{}' not found", text.target));
                    false
                }
            },
            Err(e) => {
                self.log(format!("Text condition failed: {}", e));
                false
            }
        }
    }

    /// Configuration errors become `None` (condition fails); faults pass on.
    fn configured<T>(&self, what: &str, result: VisionResult<T>) -> Result<Option<T>, ExecutorError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_configuration() => {
                self.log(format!("{} failed: {}", what, e));
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
