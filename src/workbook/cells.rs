//! Marked-cell scanning and value write-back.
//!
//! A "marked" cell carries a resolvable expression rather than literal
//! content; the marker is visual formatting: bold font with the strict
//! red color value (rgb ending `FF0000`).

use super::{SHARED_STRINGS_PATH, SHEET_PATH, STYLES_PATH, cell_ref_col, read_zip_text};
use crate::coerce::CellValue;
use anyhow::{Context, Result};
use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

/// One marked cell: its A1-style reference and the expression it holds.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarkedCell {
    pub cell_ref: String,
    pub expression: String,
}

#[derive(Debug, Default, Clone)]
struct FontSpec {
    bold: bool,
    rgb: Option<String>,
}

fn font_is_strict_red(font: &FontSpec) -> bool {
    if !font.bold {
        return false;
    }
    let Some(rgb) = &font.rgb else {
        return false;
    };
    let up = rgb.to_ascii_uppercase();
    up.len() >= 6 && up[up.len() - 6..] == *"FF0000"
}

/// Strip one layer of surrounding quotes, as template authors sometimes
/// quote the whole expression.
fn normalize_expr(raw: &str) -> String {
    let s = raw.trim();
    let stripped = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')));
    stripped.unwrap_or(s).trim().to_string()
}

/// Scan the first worksheet for bold strict-red string cells within the
/// first `max_col` columns and collect their expressions.
pub fn scan_marked_cells(xlsx: &Path, max_col: u32) -> Result<Vec<MarkedCell>> {
    let file = File::open(xlsx).with_context(|| format!("opening {}", xlsx.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading {}", xlsx.display()))?;

    let styles_xml = read_zip_text(&mut archive, STYLES_PATH)?;
    let (fonts, xf_fonts) = parse_styles(&styles_xml);
    let shared = match read_zip_text(&mut archive, SHARED_STRINGS_PATH) {
        Ok(xml) => parse_shared_strings(&xml),
        Err(_) => Vec::new(),
    };
    let sheet_xml = read_zip_text(&mut archive, SHEET_PATH)?;

    let mut marked = Vec::new();
    for cell in parse_sheet_cells(&sheet_xml) {
        let Some(text) = cell.string_value(&shared) else {
            continue;
        };
        let Some(col) = cell_ref_col(&cell.cell_ref) else {
            continue;
        };
        if col >= max_col {
            continue;
        }
        let marked_font = cell
            .style
            .and_then(|s| xf_fonts.get(s).copied())
            .and_then(|font_id| fonts.get(font_id))
            .map(font_is_strict_red)
            .unwrap_or(false);
        if !marked_font {
            continue;
        }
        let expression = normalize_expr(&text);
        if !expression.is_empty() {
            marked.push(MarkedCell {
                cell_ref: cell.cell_ref,
                expression,
            });
        }
    }

    info!("found {} marked expression cells", marked.len());
    Ok(marked)
}

/// Write resolved values into their cells, repacking the archive into
/// `dest`. Style indices are preserved; numbers become `<v>` values,
/// strings become inline strings.
pub fn write_values(src: &Path, dest: &Path, writes: &[(String, CellValue)]) -> Result<()> {
    let file = File::open(src).with_context(|| format!("opening {}", src.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading {}", src.display()))?;

    let sheet_xml = read_zip_text(&mut archive, SHEET_PATH)?;
    let write_map: HashMap<&str, &CellValue> = writes
        .iter()
        .map(|(cell_ref, value)| (cell_ref.as_str(), value))
        .collect();
    let rewritten = rewrite_sheet(&sheet_xml, &write_map)?;

    let dest_file =
        File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
    let mut writer = zip::ZipWriter::new(dest_file);
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .with_context(|| "reading archive entry")?;
        if entry.name() == SHEET_PATH {
            continue;
        }
        writer
            .raw_copy_file(entry)
            .with_context(|| "copying archive entry")?;
    }
    writer
        .start_file(SHEET_PATH, SimpleFileOptions::default())
        .with_context(|| "writing worksheet")?;
    writer.write_all(&rewritten)?;
    writer.finish().with_context(|| "finishing archive")?;

    info!("workbook saved: {}", dest.display());
    Ok(())
}

#[derive(Debug, Default)]
struct SheetCell {
    cell_ref: String,
    style: Option<usize>,
    cell_type: Option<String>,
    value: Option<String>,
    inline: String,
}

impl SheetCell {
    /// The cell's string content, if it is a string cell.
    fn string_value(&self, shared: &[String]) -> Option<String> {
        match self.cell_type.as_deref() {
            Some("s") => {
                let idx: usize = self.value.as_deref()?.trim().parse().ok()?;
                shared.get(idx).cloned()
            }
            Some("inlineStr") => Some(self.inline.clone()),
            Some("str") => self.value.clone(),
            _ => None,
        }
    }
}

fn cell_from_start<B>(e: &BytesStart<'_>, reader: &XmlReader<B>) -> SheetCell {
    let mut cell = SheetCell::default();
    for attr in e.attributes().filter_map(std::result::Result::ok) {
        let Ok(value) = attr.decode_and_unescape_value(reader) else {
            continue;
        };
        match attr.key.as_ref() {
            b"r" => cell.cell_ref = value.to_string(),
            b"s" => cell.style = value.trim().parse().ok(),
            b"t" => cell.cell_type = Some(value.to_string()),
            _ => {}
        }
    }
    cell
}

fn parse_sheet_cells(xml: &str) -> Vec<SheetCell> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut cells = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<SheetCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"c" => current = Some(cell_from_start(&e, &reader)),
                b"v" if current.is_some() => in_value = true,
                b"t" if current.is_some() => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                // An empty <c/> holds no content; nothing to collect.
                if e.name().as_ref() != b"c" {
                    continue;
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(cell), Ok(text)) = (current.as_mut(), e.unescape()) {
                    if in_value {
                        cell.value = Some(text.to_string());
                    } else if in_inline_text {
                        cell.inline.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"c" => {
                    if let Some(cell) = current.take() {
                        cells.push(cell);
                    }
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    cells
}

/// Shared strings in index order; rich-text runs are concatenated.
fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_text = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    if let Ok(text) = e.unescape() {
                        current.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    strings
}

/// Fonts plus the cellXfs xf-index -> font-index table from styles.xml.
fn parse_styles(xml: &str) -> (Vec<FontSpec>, Vec<usize>) {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut fonts: Vec<FontSpec> = Vec::new();
    let mut xf_fonts: Vec<usize> = Vec::new();
    let mut buf = Vec::new();
    let mut in_fonts = false;
    let mut in_font = false;
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) => match e.name().as_ref() {
                b"fonts" => in_fonts = true,
                b"font" if in_fonts => {
                    in_font = true;
                    fonts.push(FontSpec::default());
                }
                b"b" if in_font => {
                    let disabled = e
                        .attributes()
                        .filter_map(std::result::Result::ok)
                        .any(|a| {
                            a.key.as_ref() == b"val"
                                && matches!(a.value.as_ref(), b"0" | b"false")
                        });
                    if let Some(font) = fonts.last_mut() {
                        font.bold = !disabled;
                    }
                }
                b"color" if in_font => {
                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        if attr.key.as_ref() == b"rgb" {
                            if let Ok(value) = attr.decode_and_unescape_value(&reader) {
                                if let Some(font) = fonts.last_mut() {
                                    font.rgb = Some(value.to_string());
                                }
                            }
                        }
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let font_id = e
                        .attributes()
                        .filter_map(std::result::Result::ok)
                        .find(|a| a.key.as_ref() == b"fontId")
                        .and_then(|a| a.decode_and_unescape_value(&reader).ok())
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0);
                    xf_fonts.push(font_id);
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"fonts" => in_fonts = false,
                b"font" => in_font = false,
                b"cellXfs" => in_cell_xfs = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (fonts, xf_fonts)
}

fn write_replacement_cell(
    writer: &mut XmlWriter<Vec<u8>>,
    cell_ref: &str,
    style: Option<&str>,
    value: &CellValue,
) -> Result<()> {
    let mut cell = BytesStart::new("c");
    cell.push_attribute(("r", cell_ref));
    if let Some(s) = style {
        cell.push_attribute(("s", s));
    }
    match value {
        CellValue::Number(_) => {
            writer.write_event(Event::Start(cell))?;
            writer.write_event(Event::Start(BytesStart::new("v")))?;
            writer.write_event(Event::Text(BytesText::new(&value.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new("v")))?;
        }
        CellValue::Text(text) => {
            cell.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(cell))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            writer.write_event(Event::Start(BytesStart::new("t")))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

/// Pass the worksheet XML through, replacing targeted `<c>` elements with
/// freshly built ones carrying the resolved values.
fn rewrite_sheet(xml: &str, writes: &HashMap<&str, &CellValue>) -> Result<Vec<u8>> {
    let mut reader = XmlReader::from_str(xml);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf = Vec::new();
    let mut skipping_cell = false;

    loop {
        let event = reader.read_event_into(&mut buf);
        match event {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"c" => {
                let cell = cell_from_start(e, &reader);
                if let Some(value) = writes.get(cell.cell_ref.as_str()) {
                    let style = cell.style.map(|s| s.to_string());
                    write_replacement_cell(&mut writer, &cell.cell_ref, style.as_deref(), value)?;
                    skipping_cell = true;
                } else {
                    writer.write_event(Event::Start(e.to_owned()))?;
                }
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"c" => {
                let cell = cell_from_start(e, &reader);
                if let Some(value) = writes.get(cell.cell_ref.as_str()) {
                    let style = cell.style.map(|s| s.to_string());
                    write_replacement_cell(&mut writer, &cell.cell_ref, style.as_deref(), value)?;
                } else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"c" => {
                if skipping_cell {
                    skipping_cell = false;
                } else {
                    writer.write_event(Event::End(e.to_owned()))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(event) => {
                if !skipping_cell {
                    writer.write_event(event.into_owned())?;
                }
            }
            Err(err) => return Err(anyhow::anyhow!("worksheet XML parse error: {err}")),
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}
