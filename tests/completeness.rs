use signal_fill::schema::{self, ImageKind};
use signal_fill::value::{Record, Value, missing_fields};

#[test]
fn empty_record_misses_every_service_field() {
    let keys = schema::schema_keys(schema::SERVICE_SCHEMA);
    let missing = missing_fields(&Record::new(), &keys);
    assert_eq!(missing.len(), 14);
    assert_eq!(missing[0], "nr_arfcn");
}

#[test]
fn null_fields_count_as_missing() {
    let keys = schema::schema_keys(schema::SPEED_TEST_SCHEMA);
    let mut rec = Record::new();
    rec.insert("download_mbps".into(), Value::Number(100.0));
    rec.insert("upload_mbps".into(), Value::Null);
    let missing = missing_fields(&rec, &keys);
    assert!(missing.contains(&"upload_mbps"));
    assert!(!missing.contains(&"download_mbps"));
}

#[test]
fn extra_fields_do_not_affect_completeness() {
    let keys = schema::schema_keys(schema::VIDEO_TEST_SCHEMA);
    let mut rec = Record::new();
    rec.insert("max_resolution".into(), Value::Text("1080p".into()));
    rec.insert("load_time_ms".into(), Value::Number(420.0));
    rec.insert("buffering_percentage".into(), Value::Number(0.0));
    rec.insert("unrelated".into(), Value::Null);
    assert!(missing_fields(&rec, &keys).is_empty());
}

#[test]
fn image_kind_maps_to_schema() {
    assert_eq!(ImageKind::parse("speed_test"), Some(ImageKind::SpeedTest));
    assert_eq!(ImageKind::parse("video_test"), Some(ImageKind::VideoTest));
    assert_eq!(ImageKind::parse("voice_call"), Some(ImageKind::VoiceCall));
    assert_eq!(ImageKind::parse("something_else"), None);
    assert_eq!(
        schema::schema_keys(ImageKind::VoiceCall.schema()),
        vec!["phone_number", "call_duration_seconds", "call_status", "time"]
    );
}
