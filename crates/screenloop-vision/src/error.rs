use screenloop_core::Region;
use std::path::PathBuf;
use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Template '{}' could not be read: {source}", path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("'{0}' is not a #RRGGBB colour")]
    InvalidColor(String),

    #[error("Search region {region:?} lies outside the {width}x{height} capture")]
    RegionOutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },

    #[error("Text recognition is not available")]
    TextUnavailable,

    #[error("Text recognition failed: {0}")]
    TextRecognition(String),

    #[error("Screen capture failed: {0}")]
    Capture(String),
}

impl VisionError {
    /// Configuration errors make a condition fail; anything else is a
    /// runtime fault that should end the run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VisionError::TemplateUnreadable { .. }
                | VisionError::InvalidColor(_)
                | VisionError::RegionOutOfBounds { .. }
                | VisionError::TextUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_failure_is_a_fault() {
        assert!(!VisionError::Capture("no display".into()).is_configuration());
        assert!(VisionError::InvalidColor("#zz".into()).is_configuration());
        assert!(VisionError::TextUnavailable.is_configuration());
    }
}
