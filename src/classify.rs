//! Positional sector classification. Assignment is purely positional:
//! an image's anchor column decides its sector, independent of content.

use crate::config::Layout;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Alpha,
    Beta,
    Gamma,
    Voicetest,
    Unknown,
}

impl Sector {
    /// The three sectors that carry a paired service screenshot.
    pub const SERVICE_SECTORS: [Sector; 3] = [Sector::Alpha, Sector::Beta, Sector::Gamma];

    pub fn as_str(self) -> &'static str {
        match self {
            Sector::Alpha => "alpha",
            Sector::Beta => "beta",
            Sector::Gamma => "gamma",
            Sector::Voicetest => "voicetest",
            Sector::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn sector_for_col(layout: &Layout, col: u32) -> Sector {
    let within = |range: [u32; 2]| col >= range[0] && col < range[1];
    if within(layout.alpha_cols) {
        Sector::Alpha
    } else if within(layout.beta_cols) {
        Sector::Beta
    } else if within(layout.gamma_cols) {
        Sector::Gamma
    } else if within(layout.voicetest_cols) {
        Sector::Voicetest
    } else {
        Sector::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageRole {
    PairedSlot1,
    PairedSlot2,
    Single,
}

/// One classified input image. Created once during classification, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ImageUnit {
    pub name: String,
    pub sector: Sector,
    pub role: ImageRole,
    pub row: u32,
    pub col: u32,
    #[serde(skip)]
    pub path: PathBuf,
}

/// All classified images of one run, in (row, col) order.
#[derive(Debug, Default)]
pub struct ImageSet {
    units: Vec<ImageUnit>,
}

impl ImageSet {
    /// Classify an ordered (row, col) list of anchors into sector buckets,
    /// numbering images per sector from 1. The first two images of a
    /// service sector become the paired service screenshots; everything
    /// else is a single image. The returned names follow the
    /// `{sector}_image_{n}` convention the repair routines rely on.
    pub fn classify(layout: &Layout, anchors: &[(u32, u32)]) -> Vec<(String, Sector, ImageRole)> {
        let mut ordered: Vec<(u32, u32)> = anchors.to_vec();
        ordered.sort();

        let mut counters: std::collections::BTreeMap<Sector, u32> = Default::default();
        let mut out = Vec::with_capacity(ordered.len());
        for (_, col) in ordered {
            let sector = sector_for_col(layout, col);
            let n = counters.entry(sector).or_insert(0);
            *n += 1;
            let role = match (sector, *n) {
                (Sector::Alpha | Sector::Beta | Sector::Gamma, 1) => ImageRole::PairedSlot1,
                (Sector::Alpha | Sector::Beta | Sector::Gamma, 2) => ImageRole::PairedSlot2,
                _ => ImageRole::Single,
            };
            out.push((format!("{sector}_image_{n}"), sector, role));
        }
        out
    }

    pub fn push(&mut self, unit: ImageUnit) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn sector_units(&self, sector: Sector) -> impl Iterator<Item = &ImageUnit> {
        self.units.iter().filter(move |u| u.sector == sector)
    }

    /// The designated paired service images of a sector, when both exist.
    pub fn service_pair(&self, sector: Sector) -> Option<(&ImageUnit, &ImageUnit)> {
        let first = self
            .sector_units(sector)
            .find(|u| u.role == ImageRole::PairedSlot1)?;
        let second = self
            .sector_units(sector)
            .find(|u| u.role == ImageRole::PairedSlot2)?;
        Some((first, second))
    }

    pub fn single_units(&self, sector: Sector) -> impl Iterator<Item = &ImageUnit> {
        self.sector_units(sector)
            .filter(|u| u.role == ImageRole::Single)
    }

    /// Lookup by image identifier (file stem), used by the single-image
    /// repair routine when the output-folder naming rule misses.
    pub fn find_by_name(&self, name: &str) -> Option<&ImageUnit> {
        self.units.iter().find(|u| u.name == name)
    }
}
