//! End-of-run report assembly. The report is the machine-readable record
//! of what a run saw, extracted, and wrote back; it lands as
//! `report.json` next to the filled workbook.

use crate::analyzer::AnalyzerStats;
use crate::classify::{ImageSet, Sector};
use crate::schema;
use crate::store::DataStore;
use crate::value::missing_fields;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub job_id: String,
    pub input_file: String,
    pub input_sha256: String,
    pub started_at: String,
    pub finished_at: String,
    pub images_extracted: usize,
    pub sectors: BTreeMap<String, SectorReport>,
    pub voice_entries: usize,
    pub expressions: ExpressionReport,
    pub analyzer: AnalyzerStats,
}

/// Completeness summary for one service sector.
#[derive(Debug, Serialize)]
pub struct SectorReport {
    pub images: usize,
    pub service_missing: Vec<&'static str>,
    pub speed_entries: usize,
    pub video_entries: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ExpressionReport {
    pub marked_cells: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl RunReport {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        job_id: &str,
        input_file: &str,
        input_sha256: &str,
        started_at: &str,
        finished_at: &str,
        images: &ImageSet,
        store: &DataStore,
        expressions: ExpressionReport,
        analyzer: AnalyzerStats,
    ) -> Self {
        let service_keys = schema::schema_keys(schema::SERVICE_SCHEMA);

        let mut sectors = BTreeMap::new();
        for sector in Sector::SERVICE_SECTORS {
            let missing = store
                .service_slot(sector)
                .map(|slot| missing_fields(slot, &service_keys))
                .unwrap_or_default();
            sectors.insert(
                sector.to_string(),
                SectorReport {
                    images: images.sector_units(sector).count(),
                    service_missing: missing,
                    speed_entries: store.speedtest_map(sector).map_or(0, BTreeMap::len),
                    video_entries: store.video_map(sector).map_or(0, BTreeMap::len),
                },
            );
        }

        Self {
            job_id: job_id.to_string(),
            input_file: input_file.to_string(),
            input_sha256: input_sha256.to_string(),
            started_at: started_at.to_string(),
            finished_at: finished_at.to_string(),
            images_extracted: images.len(),
            sectors,
            voice_entries: store.voice_test.len(),
            expressions,
            analyzer,
        }
    }
}
