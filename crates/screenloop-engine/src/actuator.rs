use anyhow::{Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use screenloop_core::Point;

/// Pointer and keyboard side effects. Coordinates are logical points.
pub trait Actuator: Send {
    fn move_to(&self, target: Point) -> Result<()>;
    /// Left click wherever the pointer currently is.
    fn click(&self) -> Result<()>;
    fn type_text(&self, text: &str) -> Result<()>;
    fn position(&self) -> Result<Point>;
}

/// Drives the real pointer through `enigo`. A fresh connection is opened for
/// every call so the actuator stays `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoActuator;

impl EnigoActuator {
    fn connect() -> Result<Enigo> {
        Enigo::new(&Settings::default()).context("Failed to connect to the input system")
    }
}

impl Actuator for EnigoActuator {
    fn move_to(&self, target: Point) -> Result<()> {
        Self::connect()?
            .move_mouse(target.x, target.y, Coordinate::Abs)
            .with_context(|| format!("Failed to move pointer to ({}, {})", target.x, target.y))
    }

    fn click(&self) -> Result<()> {
        Self::connect()?
            .button(Button::Left, Direction::Click)
            .context("Failed to click")
    }

    fn type_text(&self, text: &str) -> Result<()> {
        Self::connect()?.text(text).context("Failed to type text")
    }

    fn position(&self) -> Result<Point> {
        let (x, y) = Self::connect()?
            .location()
            .context("Failed to read pointer position")?;
        Ok(Point::new(x, y))
    }
}
