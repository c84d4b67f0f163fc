use signal_fill::coerce::{CellValue, NULL_SENTINEL, coerce};
use signal_fill::value::{Record, Value};

#[test]
fn unresolved_becomes_sentinel() {
    assert_eq!(coerce(None), CellValue::Text(NULL_SENTINEL.into()));
    assert_eq!(
        coerce(Some(&Value::Null)),
        CellValue::Text(NULL_SENTINEL.into())
    );
}

#[test]
fn numbers_pass_through() {
    assert_eq!(coerce(Some(&Value::Number(-97.5))), CellValue::Number(-97.5));
}

#[test]
fn numeric_strings_convert() {
    assert_eq!(
        coerce(Some(&Value::Text("1,234".into()))),
        CellValue::Number(1234.0)
    );
    assert_eq!(
        coerce(Some(&Value::Text(" -13.25 ".into()))),
        CellValue::Number(-13.25)
    );
    assert_eq!(
        coerce(Some(&Value::Text("+42".into()))),
        CellValue::Number(42.0)
    );
}

#[test]
fn non_numeric_strings_stay_verbatim() {
    assert_eq!(
        coerce(Some(&Value::Text("1080p".into()))),
        CellValue::Text("1080p".into())
    );
    assert_eq!(
        coerce(Some(&Value::Text("12.3.4".into()))),
        CellValue::Text("12.3.4".into())
    );
}

#[test]
fn compound_values_serialize() {
    let mut rec = Record::new();
    rec.insert("a".into(), Value::Number(1.0));
    rec.insert("b".into(), Value::Number(2.5));
    let CellValue::Text(json) = coerce(Some(&Value::Map(rec))) else {
        panic!("expected text");
    };
    // Integral numbers keep their integer form in the JSON text.
    assert_eq!(json, r#"{"a":1,"b":2.5}"#);
}

#[test]
fn integral_numbers_display_without_fraction() {
    assert_eq!(CellValue::Number(42.0).to_string(), "42");
    assert_eq!(CellValue::Number(-7.0).to_string(), "-7");
    assert_eq!(CellValue::Number(3.5).to_string(), "3.5");
}
