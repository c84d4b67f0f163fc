use crate::schema::ImageKind;
use crate::value::{Record, Value};
use serde::Serialize;

/// A single-image extraction result: the analyzer's declared content type
/// plus the schema-shaped data fields.
#[derive(Debug, Clone)]
pub struct GenericExtraction {
    pub image_type: String,
    pub data: Record,
}

impl GenericExtraction {
    /// Parse the analyzer's reply. A reply without a string `image_type`
    /// is unusable; a missing `data` object degrades to an empty record.
    pub fn from_json(v: &serde_json::Value) -> Option<GenericExtraction> {
        let image_type = v.get("image_type")?.as_str()?.to_string();
        let data = v
            .get("data")
            .and_then(Value::record_from_json)
            .unwrap_or_default();
        Some(GenericExtraction { image_type, data })
    }

    pub fn kind(&self) -> Option<ImageKind> {
        ImageKind::parse(&self.image_type)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AnalyzerStats {
    pub total_calls: u64,
    pub errors: u64,
}

impl AnalyzerStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            (self.total_calls - self.errors) as f64 / self.total_calls as f64 * 100.0
        }
    }
}
