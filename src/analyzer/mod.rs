pub mod openrouter;
pub mod types;

use crate::classify::Sector;
use crate::value::Record;
use std::path::Path;

pub use openrouter::OpenRouterAnalyzer;
pub use types::{AnalyzerStats, GenericExtraction};

/// The vision-analyzer collaborator. An implementation is an oracle: given
/// an image (or pair) and the declared schema it either produces a
/// structured result or it does not. `None` is the only failure signal the
/// repair driver sees; transport and parse problems stay inside the
/// implementation, which logs them and counts them in its stats.
pub trait Analyzer {
    /// Paired service-mode extraction against the 14-field service schema.
    fn extract_service(&self, image1: &Path, image2: &Path, sector: Sector) -> Option<Record>;

    /// Classify-and-extract for a single image; the result declares its
    /// own content type.
    fn analyze_generic(&self, image: &Path, image_name: &str) -> Option<GenericExtraction>;

    /// Voice-only extraction against the voice_call schema.
    fn analyze_voice(&self, image: &Path, image_name: &str) -> Option<GenericExtraction>;

    /// Careful-evaluation counterparts, invoked only as second attempts.
    fn evaluate_service(&self, image1: &Path, image2: &Path, sector: Sector) -> Option<Record>;
    fn evaluate_generic(&self, image: &Path, image_name: &str) -> Option<GenericExtraction>;
    fn evaluate_voice(&self, image: &Path, image_name: &str) -> Option<GenericExtraction>;

    fn stats(&self) -> AnalyzerStats;
}
