use crate::capture::ScreenFrame;
use crate::error::{VisionError, VisionResult};
use crate::geometry::{MatchBox, sort_visual};
use image::RgbaImage;
use screenloop_core::Region;

/// One OCR hit, boxed relative to the image it was recognised in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub bounds: MatchBox,
    pub text: String,
}

/// Pluggable OCR backend.
pub trait TextRecognizer: Send {
    fn recognize(&self, image: &RgbaImage) -> VisionResult<Vec<RecognizedText>>;
}

/// Stands in when no OCR engine is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTextRecognizer;

impl TextRecognizer for NoTextRecognizer {
    fn recognize(&self, _image: &RgbaImage) -> VisionResult<Vec<RecognizedText>> {
        Err(VisionError::TextUnavailable)
    }
}

/// Boxes of recognised lines containing `target`, in full-screen physical
/// pixels and visual order.
pub fn find_text(
    frame: &ScreenFrame,
    recognizer: &dyn TextRecognizer,
    target: &str,
    region: Option<Region>,
) -> VisionResult<Vec<MatchBox>> {
    let area = frame.search_area(region)?;
    let mut boxes: Vec<MatchBox> = recognizer
        .recognize(&area.image)?
        .into_iter()
        .filter(|hit| hit.text.contains(target))
        .map(|hit| hit.bounds.translated(area.origin_x, area.origin_y))
        .collect();
    sort_visual(&mut boxes);
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::DisplayScale;

    struct Canned(Vec<RecognizedText>);

    impl TextRecognizer for Canned {
        fn recognize(&self, _image: &RgbaImage) -> VisionResult<Vec<RecognizedText>> {
            Ok(self.0.clone())
        }
    }

    fn frame() -> ScreenFrame {
        ScreenFrame::new(RgbaImage::new(100, 100), DisplayScale::new(1.0))
    }

    #[test]
    fn keeps_lines_containing_target() {
        let ocr = Canned(vec![
            RecognizedText {
                bounds: MatchBox::new(0, 30, 40, 10),
                text: "Claim reward".into(),
            },
            RecognizedText {
                bounds: MatchBox::new(0, 10, 40, 10),
                text: "Settings".into(),
            },
            RecognizedText {
                bounds: MatchBox::new(0, 5, 40, 10),
                text: "reward ready".into(),
            },
        ]);
        let boxes = find_text(&frame(), &ocr, "reward", Some(Region::new(10, 20, 50, 50))).unwrap();
        assert_eq!(
            boxes,
            vec![MatchBox::new(10, 25, 40, 10), MatchBox::new(10, 50, 40, 10)]
        );
    }

    #[test]
    fn missing_backend_reports_unavailable() {
        let err = find_text(&frame(), &NoTextRecognizer, "x", None).unwrap_err();
        assert!(matches!(err, VisionError::TextUnavailable));
    }
}
