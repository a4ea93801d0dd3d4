use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label the recognition stage reads from.
pub const ACCOUNT_LABEL: &str = "account";

/// One detected field on the cheque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Base64 PNG of the cropped region, `None` when the crop could not be encoded.
    pub cropped_image: Option<String>,
}

/// Success payload of an extraction job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Regions keyed by label. Labels are unique; the last detection for a label wins.
    pub detected_objects: BTreeMap<String, DetectedRegion>,
    /// Base64 PNG of the whole-image visualization.
    pub labeled_image: Option<String>,
    pub recognized_text: Option<String>,
}

impl ExtractionResult {
    pub fn region(&self, label: &str) -> Option<&DetectedRegion> {
        self.detected_objects.get(label)
    }
}
