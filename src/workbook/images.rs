//! Embedded-image extraction. Pictures live in `xl/media/`, referenced
//! from `xl/drawings/drawing1.xml` via the drawing relationships file; the
//! drawing anchor carries the (row, col) cell position the classifier
//! partitions on.

use super::{read_zip_bytes, read_zip_text};
use crate::classify::{ImageSet, ImageUnit};
use crate::config::Layout;
use anyhow::{Context, Result};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const DRAWING_PATH: &str = "xl/drawings/drawing1.xml";
const DRAWING_RELS_PATH: &str = "xl/drawings/_rels/drawing1.xml.rels";

/// One embedded picture with its anchor position. Row is 1-based (as
/// worksheet rows are displayed), column 0-based (as anchors store it).
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    pub row: u32,
    pub col: u32,
}

/// All pictures of the first worksheet, ordered by (row, col).
pub fn list_embedded_images(xlsx: &Path) -> Result<Vec<EmbeddedImage>> {
    let file = File::open(xlsx).with_context(|| format!("opening {}", xlsx.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading {}", xlsx.display()))?;

    let Ok(drawing_xml) = read_zip_text(&mut archive, DRAWING_PATH) else {
        return Ok(Vec::new());
    };
    let pictures = parse_drawing_pictures(&drawing_xml);
    if pictures.is_empty() {
        return Ok(Vec::new());
    }

    let rels_xml = read_zip_text(&mut archive, DRAWING_RELS_PATH)
        .with_context(|| "drawing relationships missing")?;
    let relationships = parse_relationships(&rels_xml);

    let mut images = Vec::new();
    for (rel_id, from_col, from_row) in pictures {
        let Some(target) = relationships.get(&rel_id) else {
            warn!("picture relationship {rel_id} has no target");
            continue;
        };
        // Targets are relative, e.g. "../media/image1.png".
        let media_path = target.strip_prefix("../media/").map_or_else(
            || format!("xl/{target}"),
            |suffix| format!("xl/media/{suffix}"),
        );
        match read_zip_bytes(&mut archive, &media_path) {
            Ok(bytes) => images.push(EmbeddedImage {
                bytes,
                row: from_row + 1,
                col: from_col,
            }),
            Err(err) => warn!("failed to read {media_path}: {err:#}"),
        }
    }

    images.sort_by_key(|img| (img.row, img.col));
    Ok(images)
}

/// Extract, classify and save every embedded image under `out_dir` using
/// the `{sector}_image_{n}.png` naming convention.
pub fn extract_images(xlsx: &Path, layout: &Layout, out_dir: &Path) -> Result<ImageSet> {
    let images = list_embedded_images(xlsx)?;
    info!("found {} embedded images", images.len());

    let anchors: Vec<(u32, u32)> = images.iter().map(|i| (i.row, i.col)).collect();
    let labels = ImageSet::classify(layout, &anchors);

    let mut set = ImageSet::default();
    for (image, (name, sector, role)) in images.iter().zip(labels) {
        let path = out_dir.join(format!("{name}.png"));
        std::fs::write(&path, &image.bytes)
            .with_context(|| format!("saving {}", path.display()))?;
        debug!("saved {name} at row {} col {}", image.row, image.col);
        set.push(ImageUnit {
            name,
            sector,
            role,
            row: image.row,
            col: image.col,
            path,
        });
    }
    Ok(set)
}

/// Parse the drawing XML for pictures: (relationship id, from_col, from_row).
fn parse_drawing_pictures(xml: &str) -> Vec<(String, u32, u32)> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut pictures = Vec::new();
    let mut buf = Vec::new();

    let mut in_pic = false;
    let mut in_from = false;
    let mut in_from_col = false;
    let mut in_from_row = false;
    let mut current_rel_id: Option<String> = None;
    let mut from_col: u32 = 0;
    let mut from_row: u32 = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) => match e.name().as_ref() {
                b"xdr:pic" | b"pic" => in_pic = true,
                b"a:blip" | b"blip" if in_pic => {
                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        if matches!(attr.key.as_ref(), b"r:embed" | b"embed") {
                            if let Ok(value) = attr.decode_and_unescape_value(&reader) {
                                current_rel_id = Some(value.to_string());
                            }
                        }
                    }
                }
                b"xdr:from" | b"from" => in_from = true,
                b"xdr:col" | b"col" if in_from => in_from_col = true,
                b"xdr:row" | b"row" if in_from => in_from_row = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    let text = text.trim();
                    if in_from_col {
                        from_col = text.parse().unwrap_or(0);
                    } else if in_from_row {
                        from_row = text.parse().unwrap_or(0);
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"xdr:pic" | b"pic" => {
                    if let Some(rel_id) = current_rel_id.take() {
                        pictures.push((rel_id, from_col, from_row));
                    }
                    in_pic = false;
                    from_col = 0;
                    from_row = 0;
                }
                b"xdr:from" | b"from" => in_from = false,
                b"xdr:col" | b"col" if in_from => in_from_col = false,
                b"xdr:row" | b"row" if in_from => in_from_row = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    pictures
}

/// Relationship id -> target path.
fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);

    let mut relationships = HashMap::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e) | Event::Start(e)) => {
                if e.name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        match attr.key.as_ref() {
                            b"Id" => {
                                if let Ok(value) = attr.decode_and_unescape_value(&reader) {
                                    id = Some(value.to_string());
                                }
                            }
                            b"Target" => {
                                if let Ok(value) = attr.decode_and_unescape_value(&reader) {
                                    target = Some(value.to_string());
                                }
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(target)) = (id, target) {
                        relationships.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    relationships
}
