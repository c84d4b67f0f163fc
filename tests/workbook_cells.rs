use signal_fill::coerce::CellValue;
use signal_fill::workbook::{scan_marked_cells, write_values};
use std::io::{Read, Write};
use std::path::PathBuf;
use zip::write::SimpleFileOptions;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="3">
    <font/>
    <font><b/><color rgb="FFFF0000"/></font>
    <font><b val="0"/><color rgb="FFFF0000"/></font>
  </fonts>
  <cellXfs count="3">
    <xf fontId="0"/>
    <xf fontId="1"/>
    <xf fontId="2"/>
  </cellXfs>
</styleSheet>"#;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
  <si><t>plain label</t></si>
  <si><t>alpha_service[&quot;nr_band&quot;]</t></si>
  <si><t>"beta_service['nr_pci']"</t></si>
</sst>"#;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" s="1" t="s"><v>0</v></c>
      <c r="B1" s="1" t="s"><v>1</v></c>
      <c r="C1" s="1" t="s"><v>2</v></c>
      <c r="D1" s="2" t="s"><v>1</v></c>
      <c r="E1" s="1"><v>3.5</v></c>
      <c r="Z1" s="1" t="s"><v>1</v></c>
    </row>
  </sheetData>
</worksheet>"#;

fn temp_xlsx(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("signal-fill-{}-{tag}.xlsx", std::process::id()))
}

fn build_workbook(path: &PathBuf) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in [
        ("xl/styles.xml", STYLES),
        ("xl/sharedStrings.xml", SHARED_STRINGS),
        ("xl/worksheets/sheet1.xml", SHEET),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn scan_finds_only_bold_red_string_cells_in_range() {
    let path = temp_xlsx("scan");
    build_workbook(&path);

    let marked = scan_marked_cells(&path, 16).unwrap();
    let refs: Vec<&str> = marked.iter().map(|m| m.cell_ref.as_str()).collect();

    // A1 is marked but resolves later; plain labels still count as
    // expressions at scan time. D1 is red but not bold, E1 is numeric,
    // Z1 is outside the scan range.
    assert_eq!(refs, vec!["A1", "B1", "C1"]);
    assert_eq!(marked[1].expression, r#"alpha_service["nr_band"]"#);
    // One layer of surrounding quotes is stripped.
    assert_eq!(marked[2].expression, "beta_service['nr_pci']");

    std::fs::remove_file(&path).ok();
}

#[test]
fn write_back_replaces_cells_and_preserves_the_rest() {
    let src = temp_xlsx("write-src");
    let dest = temp_xlsx("write-dest");
    build_workbook(&src);

    let writes = vec![
        ("B1".to_string(), CellValue::Number(78.0)),
        ("C1".to_string(), CellValue::Text("NULL".into())),
    ];
    write_values(&src, &dest, &writes).unwrap();

    let file = std::fs::File::open(&dest).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut sheet)
        .unwrap();

    assert!(sheet.contains(r#"<c r="B1" s="1"><v>78</v></c>"#));
    assert!(sheet.contains(r#"<c r="C1" s="1" t="inlineStr"><is><t>NULL</t></is></c>"#));
    // Untouched cells keep their original form.
    assert!(sheet.contains(r#"<c r="A1" s="1" t="s"><v>0</v></c>"#));
    assert!(sheet.contains(r#"<c r="E1" s="1"><v>3.5</v></c>"#));

    // The other archive members ride along unchanged.
    let mut styles = String::new();
    archive
        .by_name("xl/styles.xml")
        .unwrap()
        .read_to_string(&mut styles)
        .unwrap();
    assert_eq!(styles, STYLES);

    std::fs::remove_file(&src).ok();
    std::fs::remove_file(&dest).ok();
}
