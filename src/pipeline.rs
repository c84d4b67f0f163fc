//! The multi-pass extraction-repair pipeline.
//!
//! Phases run strictly in order for the whole run: primary pass,
//! opportunistic re-evaluation pass, completeness pass, aggregation.
//! Analyzer failures never abort a run; a unit that yields nothing simply
//! stays partial. The null-coalescing merge makes every repair pass
//! idempotent: a value set once is never overwritten.

use crate::{
    analyzer::Analyzer,
    classify::{ImageSet, ImageUnit, Sector},
    config::Config,
    schema::{self, ImageKind},
    store::{CategoryMap, DataStore},
    value::{Record, merge_fields, missing_fields},
};
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-run retry deduplication state, threaded through the repair passes.
/// Both sets bound the analyzer call count: a sector pair is re-evaluated
/// at most once, and a single image is re-analyzed at most once, no matter
/// how many completeness checks flag it.
#[derive(Debug, Default)]
pub struct RepairContext {
    retried_sectors: HashSet<Sector>,
    retried_images: HashSet<PathBuf>,
}

impl RepairContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sector_retried(&self, sector: Sector) -> bool {
        self.retried_sectors.contains(&sector)
    }

    pub fn mark_sector(&mut self, sector: Sector) {
        self.retried_sectors.insert(sector);
    }

    pub fn image_retried(&self, path: &Path) -> bool {
        self.retried_images.contains(path)
    }

    pub fn mark_image(&mut self, path: &Path) {
        self.retried_images.insert(path.to_path_buf());
    }
}

pub struct Pipeline<A: Analyzer> {
    cfg: Config,
    analyzer: A,
}

impl<A: Analyzer> Pipeline<A> {
    pub fn new(cfg: &Config, analyzer: A) -> Self {
        Self {
            cfg: cfg.clone(),
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Run all acquisition phases against a freshly constructed store.
    pub fn run(&self, images: &ImageSet, images_dir: &Path, store: &mut DataStore) -> Result<()> {
        info!(
            "analyzing {} images for job {:?}",
            images.len(),
            self.cfg.global.job_name
        );
        info!("starting primary pass");
        self.primary_pass(images, store);

        info!("starting re-evaluation pass");
        let mut ctx = RepairContext::new();
        self.reevaluation_pass(images, store, &mut ctx);

        info!("starting completeness pass");
        self.completeness_pass(images, images_dir, store, &mut ctx);

        store.compute_averages();
        Ok(())
    }

    /// First extraction attempt for every unit.
    fn primary_pass(&self, images: &ImageSet, store: &mut DataStore) {
        for sector in Sector::SERVICE_SECTORS {
            info!("processing sector {sector}");
            match images.service_pair(sector) {
                Some((img1, img2)) => {
                    let fields = self.analyzer.extract_service(&img1.path, &img2.path, sector);
                    if let (Some(fields), Some(slot)) = (fields, store.service_slot_mut(sector)) {
                        merge_fields(slot, &fields);
                    }
                }
                None => warn!("missing service image pair for {sector}"),
            }

            let singles: Vec<&ImageUnit> = images.single_units(sector).collect();
            for unit in singles {
                let Some(result) = self.analyzer.analyze_generic(&unit.path, &unit.name) else {
                    continue;
                };
                self.merge_generic_result(store, sector, &unit.name, &result.image_type, &result.data);
            }
        }

        let voice_units: Vec<&ImageUnit> = images.sector_units(Sector::Voicetest).collect();
        if !voice_units.is_empty() {
            info!("processing sector voicetest");
            for unit in voice_units {
                let Some(result) = self.analyzer.analyze_voice(&unit.path, &unit.name) else {
                    continue;
                };
                if result.kind() == Some(ImageKind::VoiceCall) {
                    DataStore::merge_category_entry(&mut store.voice_test, &unit.name, &result.data);
                }
            }
        }
    }

    fn merge_generic_result(
        &self,
        store: &mut DataStore,
        sector: Sector,
        name: &str,
        image_type: &str,
        data: &Record,
    ) {
        match ImageKind::parse(image_type) {
            Some(ImageKind::SpeedTest) => {
                if let Some(map) = store.speedtest_map_mut(sector) {
                    DataStore::merge_category_entry(map, name, data);
                }
            }
            Some(ImageKind::VideoTest) => {
                if let Some(map) = store.video_map_mut(sector) {
                    DataStore::merge_category_entry(map, name, data);
                }
            }
            Some(ImageKind::VoiceCall) => {
                DataStore::merge_category_entry(&mut store.voice_test, name, data);
            }
            None => warn!("analyzer declared unknown content type {image_type:?} for {name}"),
        }
    }

    /// Opportunistic careful re-evaluation of service pairs whose slot is
    /// still missing schema fields after the primary pass. Each sector gets
    /// at most one re-evaluation per run.
    fn reevaluation_pass(&self, images: &ImageSet, store: &mut DataStore, ctx: &mut RepairContext) {
        let service_keys = schema::schema_keys(schema::SERVICE_SCHEMA);
        for sector in Sector::SERVICE_SECTORS {
            let Some(slot) = store.service_slot(sector) else {
                continue;
            };
            if missing_fields(slot, &service_keys).is_empty() {
                continue;
            }
            let Some((img1, img2)) = images.service_pair(sector) else {
                continue;
            };
            if ctx.sector_retried(sector) {
                continue;
            }
            info!("re-evaluating service data for {sector}");
            let result = self.analyzer.evaluate_service(&img1.path, &img2.path, sector);
            ctx.mark_sector(sector);
            if let (Some(fields), Some(slot)) = (result, store.service_slot_mut(sector)) {
                merge_fields(slot, &fields);
            }
        }
    }

    /// Completeness audit: recompute missing fields against the declared
    /// schemas and route every still-incomplete unit through one more
    /// bounded repair attempt.
    fn completeness_pass(
        &self,
        images: &ImageSet,
        images_dir: &Path,
        store: &mut DataStore,
        ctx: &mut RepairContext,
    ) {
        let service_keys = schema::schema_keys(schema::SERVICE_SCHEMA);

        for sector in Sector::SERVICE_SECTORS {
            info!("verifying {sector} completeness");
            self.repair_service_slot(images, store, ctx, sector, &service_keys);

            // The two paired service images are audited above, not here.
            let names: Vec<String> = images
                .single_units(sector)
                .map(|u| u.name.clone())
                .collect();
            for name in names {
                let in_speed = store
                    .speedtest_map(sector)
                    .map(|m| m.contains_key(&name))
                    .unwrap_or(false);
                let in_video = store
                    .video_map(sector)
                    .map(|m| m.contains_key(&name))
                    .unwrap_or(false);

                if !in_speed && !in_video {
                    info!("processing never-extracted image {name}");
                    let mut map = store
                        .speedtest_map_mut(sector)
                        .map(std::mem::take)
                        .unwrap_or_default();
                    self.repair_single_image(&name, images, images_dir, &mut map, ctx);
                    if let Some(slot) = store.speedtest_map_mut(sector) {
                        *slot = map;
                    }
                    continue;
                }
                if in_speed {
                    self.repair_category_entry(
                        images,
                        images_dir,
                        ctx,
                        &name,
                        ImageKind::SpeedTest,
                        sector,
                        store,
                    );
                }
                if in_video {
                    self.repair_category_entry(
                        images,
                        images_dir,
                        ctx,
                        &name,
                        ImageKind::VideoTest,
                        sector,
                        store,
                    );
                }
            }
        }

        info!("verifying voicetest completeness");
        let voice_keys = schema::schema_keys(schema::VOICE_CALL_SCHEMA);
        let names: Vec<String> = images
            .sector_units(Sector::Voicetest)
            .map(|u| u.name.clone())
            .collect();
        for name in names {
            let needs_repair = match store.voice_test.get(&name) {
                None => {
                    info!("processing never-extracted voice image {name}");
                    true
                }
                Some(entry) => {
                    let missing = missing_fields(entry, &voice_keys);
                    if !missing.is_empty() {
                        info!("{name} missing {missing:?}");
                    }
                    !missing.is_empty()
                }
            };
            if needs_repair {
                let mut map = std::mem::take(&mut store.voice_test);
                self.repair_single_image(&name, images, images_dir, &mut map, ctx);
                store.voice_test = map;
            }
        }
    }

    /// Service-slot half of the completeness pass: one more paired
    /// extraction, then the careful mode if fields are still missing.
    fn repair_service_slot(
        &self,
        images: &ImageSet,
        store: &mut DataStore,
        ctx: &mut RepairContext,
        sector: Sector,
        service_keys: &[&'static str],
    ) {
        let Some(slot) = store.service_slot(sector) else {
            return;
        };
        let missing = missing_fields(slot, service_keys);
        if missing.is_empty() || ctx.sector_retried(sector) {
            return;
        }
        let Some((img1, img2)) = images.service_pair(sector) else {
            return;
        };
        info!("re-processing service data for {sector}; missing {missing:?}");
        let result = self.analyzer.extract_service(&img1.path, &img2.path, sector);
        ctx.mark_sector(sector);
        let Some(fields) = result else {
            return;
        };
        let (img1, img2) = (img1.path.clone(), img2.path.clone());
        let Some(slot) = store.service_slot_mut(sector) else {
            return;
        };
        merge_fields(slot, &fields);
        let still_missing = !missing_fields(slot, service_keys).is_empty();
        if still_missing {
            let fields = self.analyzer.evaluate_service(&img1, &img2, sector);
            if let (Some(fields), Some(slot)) = (fields, store.service_slot_mut(sector)) {
                merge_fields(slot, &fields);
            }
        }
    }

    /// Category-map half of the completeness pass for one existing entry.
    #[allow(clippy::too_many_arguments)]
    fn repair_category_entry(
        &self,
        images: &ImageSet,
        images_dir: &Path,
        ctx: &mut RepairContext,
        name: &str,
        kind: ImageKind,
        sector: Sector,
        store: &mut DataStore,
    ) {
        let keys = schema::schema_keys(kind.schema());
        let take_map = |store: &mut DataStore| match kind {
            ImageKind::SpeedTest => store
                .speedtest_map_mut(sector)
                .map(std::mem::take)
                .unwrap_or_default(),
            ImageKind::VideoTest => store
                .video_map_mut(sector)
                .map(std::mem::take)
                .unwrap_or_default(),
            ImageKind::VoiceCall => std::mem::take(&mut store.voice_test),
        };
        let put_map = |store: &mut DataStore, map: CategoryMap| match kind {
            ImageKind::SpeedTest => {
                if let Some(slot) = store.speedtest_map_mut(sector) {
                    *slot = map;
                }
            }
            ImageKind::VideoTest => {
                if let Some(slot) = store.video_map_mut(sector) {
                    *slot = map;
                }
            }
            ImageKind::VoiceCall => store.voice_test = map,
        };

        let mut map = take_map(store);
        if let Some(entry) = map.get(name) {
            let missing = missing_fields(entry, &keys);
            if !missing.is_empty() {
                info!("{name} missing {missing:?}");
                self.repair_single_image(name, images, images_dir, &mut map, ctx);
            }
        }
        put_map(store, map);
    }

    /// Shared single-image repair routine, deduplicated by resolved path.
    /// The path is marked retried whatever the outcome, so an image the
    /// analyzer cannot resolve is attempted at most once per run. Returns
    /// whether any fields were merged.
    fn repair_single_image(
        &self,
        name: &str,
        images: &ImageSet,
        images_dir: &Path,
        target: &mut CategoryMap,
        ctx: &mut RepairContext,
    ) -> bool {
        // Deterministic output-folder naming rule first, then the
        // classified grouping as fallback.
        let candidate = images_dir.join(format!("{name}.png"));
        let path = if candidate.exists() {
            candidate
        } else if let Some(unit) = images.find_by_name(name) {
            unit.path.clone()
        } else {
            warn!("image {name} not found for repair");
            return false;
        };

        if ctx.image_retried(&path) {
            debug!("image {name} already retried this run");
            return false;
        }

        let is_voice = name.starts_with("voicetest");
        info!("retrying analysis for {name}");
        let normal = if is_voice {
            self.analyzer.analyze_voice(&path, name)
        } else {
            self.analyzer.analyze_generic(&path, name)
        };
        ctx.mark_image(&path);

        if let Some(result) = normal {
            DataStore::merge_category_entry(target, name, &result.data);
            return true;
        }

        let careful = if is_voice {
            self.analyzer.evaluate_voice(&path, name)
        } else {
            self.analyzer.evaluate_generic(&path, name)
        };
        if let Some(result) = careful {
            DataStore::merge_category_entry(target, name, &result.data);
            return true;
        }

        false
    }
}
