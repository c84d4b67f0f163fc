//! Declared extraction schemas, shared verbatim between the prompts sent
//! to the vision analyzer and the completeness auditor. Divergence between
//! the two would make repair passes chase fields the analyzer was never
//! asked for, so both sides are generated from these tables.

use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
}

impl FieldKind {
    pub fn type_name(self) -> &'static str {
        match self {
            FieldKind::Number => "number",
            FieldKind::Text => "string",
        }
    }
}

pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn num(name: &'static str) -> SchemaField {
    SchemaField {
        name,
        kind: FieldKind::Number,
    }
}

const fn text(name: &'static str) -> SchemaField {
    SchemaField {
        name,
        kind: FieldKind::Text,
    }
}

/// Service-mode screenshot pair schema: 14 numeric physical-layer fields.
pub const SERVICE_SCHEMA: &[SchemaField] = &[
    num("nr_arfcn"),
    num("nr_band"),
    num("nr_pci"),
    num("nr_bw"),
    num("nr5g_rsrp"),
    num("nr5g_rsrq"),
    num("nr5g_sinr"),
    num("lte_band"),
    num("lte_earfcn"),
    num("lte_pci"),
    num("lte_bw"),
    num("lte_rsrp"),
    num("lte_rsrq"),
    num("lte_sinr"),
];

pub const SPEED_TEST_SCHEMA: &[SchemaField] = &[
    num("download_mbps"),
    num("upload_mbps"),
    num("ping_ms"),
    num("jitter_ms"),
];

pub const VIDEO_TEST_SCHEMA: &[SchemaField] = &[
    text("max_resolution"),
    num("load_time_ms"),
    num("buffering_percentage"),
];

pub const VOICE_CALL_SCHEMA: &[SchemaField] = &[
    text("phone_number"),
    num("call_duration_seconds"),
    text("call_status"),
    text("time"),
];

/// Content type the analyzer declares for a single (non-paired) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    SpeedTest,
    VideoTest,
    VoiceCall,
}

impl ImageKind {
    pub fn parse(s: &str) -> Option<ImageKind> {
        match s {
            "speed_test" => Some(ImageKind::SpeedTest),
            "video_test" => Some(ImageKind::VideoTest),
            "voice_call" => Some(ImageKind::VoiceCall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::SpeedTest => "speed_test",
            ImageKind::VideoTest => "video_test",
            ImageKind::VoiceCall => "voice_call",
        }
    }

    pub fn schema(self) -> &'static [SchemaField] {
        match self {
            ImageKind::SpeedTest => SPEED_TEST_SCHEMA,
            ImageKind::VideoTest => VIDEO_TEST_SCHEMA,
            ImageKind::VoiceCall => VOICE_CALL_SCHEMA,
        }
    }
}

pub fn schema_keys(schema: &'static [SchemaField]) -> Vec<&'static str> {
    schema.iter().map(|f| f.name).collect()
}

fn fields_json(schema: &[SchemaField]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for field in schema {
        map.insert(field.name.to_string(), json!(field.kind.type_name()));
    }
    serde_json::Value::Object(map)
}

/// Flat field->type object for the paired service prompt.
pub fn service_schema_json() -> serde_json::Value {
    fields_json(SERVICE_SCHEMA)
}

fn tagged_schema_json(kind: ImageKind) -> serde_json::Value {
    json!({
        "image_type": kind.as_str(),
        "data": fields_json(kind.schema()),
    })
}

/// All three single-image schemas, keyed by content type, for the
/// classify-and-extract prompt.
pub fn generic_schemas_json() -> serde_json::Value {
    json!({
        "speed_test": tagged_schema_json(ImageKind::SpeedTest),
        "video_test": tagged_schema_json(ImageKind::VideoTest),
        "voice_call": tagged_schema_json(ImageKind::VoiceCall),
    })
}

/// The voice_call schema alone, for the voice-only prompt.
pub fn voice_schema_json() -> serde_json::Value {
    tagged_schema_json(ImageKind::VoiceCall)
}
