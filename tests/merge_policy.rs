use signal_fill::value::{Record, Value, merge_fields};

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn fills_missing_and_null_fields() {
    let mut target = record(&[
        ("nr_pci", Value::Number(101.0)),
        ("nr_band", Value::Null),
    ]);
    let new = record(&[
        ("nr_band", Value::Text("n78".into())),
        ("lte_pci", Value::Number(42.0)),
    ]);
    merge_fields(&mut target, &new);

    assert_eq!(target.get("nr_band"), Some(&Value::Text("n78".into())));
    assert_eq!(target.get("lte_pci"), Some(&Value::Number(42.0)));
    assert_eq!(target.get("nr_pci"), Some(&Value::Number(101.0)));
}

#[test]
fn never_overwrites_existing_values() {
    let mut target = record(&[("nr_pci", Value::Number(101.0))]);
    let new = record(&[("nr_pci", Value::Number(999.0))]);
    merge_fields(&mut target, &new);
    assert_eq!(target.get("nr_pci"), Some(&Value::Number(101.0)));
}

#[test]
fn incoming_nulls_are_ignored() {
    let mut target = record(&[("nr_pci", Value::Number(101.0))]);
    let new = record(&[
        ("nr_pci", Value::Null),
        ("nr_band", Value::Null),
    ]);
    merge_fields(&mut target, &new);
    assert_eq!(target.get("nr_pci"), Some(&Value::Number(101.0)));
    assert!(!target.contains_key("nr_band"));
}

#[test]
fn merge_is_idempotent() {
    let new = record(&[
        ("download_mbps", Value::Number(250.5)),
        ("ping_ms", Value::Number(12.0)),
    ]);
    let mut once = Record::new();
    merge_fields(&mut once, &new);
    let mut twice = once.clone();
    merge_fields(&mut twice, &new);
    assert_eq!(once, twice);
}

#[test]
fn booleans_from_json_become_null() {
    let json = serde_json::json!({"ok": true, "download_mbps": 88.0});
    let rec = Value::record_from_json(&json).unwrap();
    assert_eq!(rec.get("ok"), Some(&Value::Null));

    let mut target = Record::new();
    merge_fields(&mut target, &rec);
    assert!(!target.contains_key("ok"));
    assert_eq!(target.get("download_mbps"), Some(&Value::Number(88.0)));
}
