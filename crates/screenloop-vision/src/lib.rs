//! Screen perception: capture, template/colour/text matching, and the
//! logical/physical pixel bookkeeping between them.

pub mod capture;
pub mod color;
mod error;
pub mod geometry;
pub mod scaling;
mod settings;
pub mod template;
pub mod text;

pub use capture::{ScreenFrame, ScreenSource, XcapScreen};
pub use error::{VisionError, VisionResult};
pub use geometry::{MatchBox, VisitedMatches};
pub use scaling::DisplayScale;
pub use settings::MatchSettings;
pub use text::{NoTextRecognizer, RecognizedText, TextRecognizer};
