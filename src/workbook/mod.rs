//! Raw OOXML workbook access: embedded-image extraction with positional
//! metadata, marked-expression cell scanning, and value write-back.
//!
//! Only the first worksheet is consulted (`sheet1.xml` / `drawing1.xml`),
//! matching the template convention the rest of the pipeline assumes.

pub mod cells;
pub mod images;

pub use cells::{MarkedCell, scan_marked_cells, write_values};
pub use images::{EmbeddedImage, extract_images, list_embedded_images};

use anyhow::{Context, Result};
use std::io::{Read, Seek};

pub(crate) const SHEET_PATH: &str = "xl/worksheets/sheet1.xml";
pub(crate) const STYLES_PATH: &str = "xl/styles.xml";
pub(crate) const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

pub(crate) fn read_zip_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .with_context(|| format!("archive entry not found: {path}"))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("reading archive entry: {path}"))?;
    Ok(content)
}

pub(crate) fn read_zip_bytes<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .with_context(|| format!("archive entry not found: {path}"))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("reading archive entry: {path}"))?;
    Ok(bytes)
}

/// Zero-based column index of a cell reference: "A1" -> 0, "AB3" -> 27.
pub(crate) fn cell_ref_col(cell_ref: &str) -> Option<u32> {
    let letters: String = cell_ref
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(col - 1)
}
