use signal_fill::analyzer::{Analyzer, AnalyzerStats, GenericExtraction};
use signal_fill::classify::{ImageRole, ImageSet, ImageUnit, Sector};
use signal_fill::config::Config;
use signal_fill::pipeline::Pipeline;
use signal_fill::store::DataStore;
use signal_fill::value::{Record, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

fn rec(pairs: &[(&str, f64)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::Number(*v)))
        .collect()
}

fn extraction(image_type: &str, data: Record) -> GenericExtraction {
    GenericExtraction {
        image_type: image_type.to_string(),
        data,
    }
}

type Queue<K> = RefCell<HashMap<K, VecDeque<Option<GenericExtraction>>>>;

/// Scripted analyzer: each operation pops the next queued reply for its
/// key and records the call. An exhausted queue replies `None`.
#[derive(Default)]
struct ScriptedAnalyzer {
    service: RefCell<HashMap<Sector, VecDeque<Option<Record>>>>,
    careful_service: RefCell<HashMap<Sector, VecDeque<Option<Record>>>>,
    generic: Queue<String>,
    careful_generic: Queue<String>,
    voice: Queue<String>,
    careful_voice: Queue<String>,
    log: RefCell<Vec<String>>,
}

impl ScriptedAnalyzer {
    fn note(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    fn calls(&self, prefix: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn queue_service(&self, sector: Sector, careful: bool, reply: Option<Record>) {
        let queues = if careful {
            &self.careful_service
        } else {
            &self.service
        };
        queues.borrow_mut().entry(sector).or_default().push_back(reply);
    }

    fn queue_single(&self, queue: &Queue<String>, name: &str, reply: Option<GenericExtraction>) {
        queue
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push_back(reply);
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn extract_service(&self, _i1: &Path, _i2: &Path, sector: Sector) -> Option<Record> {
        self.note(format!("extract_service:{sector}"));
        self.service.borrow_mut().get_mut(&sector)?.pop_front()?
    }

    fn analyze_generic(&self, _image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.note(format!("analyze_generic:{image_name}"));
        self.generic.borrow_mut().get_mut(image_name)?.pop_front()?
    }

    fn analyze_voice(&self, _image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.note(format!("analyze_voice:{image_name}"));
        self.voice.borrow_mut().get_mut(image_name)?.pop_front()?
    }

    fn evaluate_service(&self, _i1: &Path, _i2: &Path, sector: Sector) -> Option<Record> {
        self.note(format!("evaluate_service:{sector}"));
        self.careful_service.borrow_mut().get_mut(&sector)?.pop_front()?
    }

    fn evaluate_generic(&self, _image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.note(format!("evaluate_generic:{image_name}"));
        self.careful_generic
            .borrow_mut()
            .get_mut(image_name)?
            .pop_front()?
    }

    fn evaluate_voice(&self, _image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.note(format!("evaluate_voice:{image_name}"));
        self.careful_voice
            .borrow_mut()
            .get_mut(image_name)?
            .pop_front()?
    }

    fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            total_calls: self.log.borrow().len() as u64,
            errors: 0,
        }
    }
}

fn unit(name: &str, sector: Sector, role: ImageRole, row: u32, col: u32) -> ImageUnit {
    ImageUnit {
        name: name.to_string(),
        sector,
        role,
        row,
        col,
        path: PathBuf::from(format!("/nonexistent/{name}.png")),
    }
}

fn alpha_fixture() -> ImageSet {
    let mut set = ImageSet::default();
    set.push(unit("alpha_image_1", Sector::Alpha, ImageRole::PairedSlot1, 1, 0));
    set.push(unit("alpha_image_2", Sector::Alpha, ImageRole::PairedSlot2, 2, 0));
    set.push(unit("alpha_image_3", Sector::Alpha, ImageRole::Single, 3, 0));
    set.push(unit("voicetest_image_1", Sector::Voicetest, ImageRole::Single, 1, 13));
    set
}

#[test]
fn repairs_fill_gaps_across_passes() {
    let analyzer = ScriptedAnalyzer::default();

    // Primary service extraction fails; the careful re-evaluation pass
    // supplies what it can.
    analyzer.queue_service(Sector::Alpha, false, None);
    analyzer.queue_service(
        Sector::Alpha,
        true,
        Some(rec(&[("nr_arfcn", 640000.0), ("nr_band", 78.0)])),
    );

    // The speed image yields one field, fails the retry, then succeeds
    // in careful mode.
    analyzer.queue_single(
        &analyzer.generic,
        "alpha_image_3",
        Some(extraction("speed_test", rec(&[("download_mbps", 240.0)]))),
    );
    analyzer.queue_single(&analyzer.generic, "alpha_image_3", None);
    analyzer.queue_single(
        &analyzer.careful_generic,
        "alpha_image_3",
        Some(extraction("speed_test", rec(&[("upload_mbps", 21.0)]))),
    );

    // The voice image fails outright in the primary pass and is repaired
    // by the completeness pass.
    analyzer.queue_single(&analyzer.voice, "voicetest_image_1", None);
    let mut voice_data = rec(&[("call_duration_seconds", 31.0)]);
    voice_data.insert("phone_number".into(), Value::Text("0123456789".into()));
    voice_data.insert("call_status".into(), Value::Text("completed".into()));
    voice_data.insert("time".into(), Value::Text("12:30:05".into()));
    analyzer.queue_single(
        &analyzer.voice,
        "voicetest_image_1",
        Some(extraction("voice_call", voice_data)),
    );

    let cfg = Config::default();
    let pipeline = Pipeline::new(&cfg, analyzer);
    let images = alpha_fixture();
    let mut store = DataStore::new();
    pipeline
        .run(&images, Path::new("/nonexistent-dir"), &mut store)
        .unwrap();

    assert_eq!(
        store.alpha_service.get("nr_arfcn"),
        Some(&Value::Number(640000.0))
    );
    assert_eq!(store.alpha_service.get("nr_band"), Some(&Value::Number(78.0)));

    let speed = store.alpha_speedtest.get("alpha_image_3").unwrap();
    assert_eq!(speed.get("download_mbps"), Some(&Value::Number(240.0)));
    assert_eq!(speed.get("upload_mbps"), Some(&Value::Number(21.0)));

    let voice = store.voice_test.get("voicetest_image_1").unwrap();
    assert_eq!(
        voice.get("call_status"),
        Some(&Value::Text("completed".into()))
    );

    let analyzer = pipeline.analyzer();
    assert_eq!(analyzer.calls("extract_service:alpha"), 1);
    assert_eq!(analyzer.calls("evaluate_service:alpha"), 1);
    assert_eq!(analyzer.calls("analyze_generic:alpha_image_3"), 2);
    assert_eq!(analyzer.calls("evaluate_generic:alpha_image_3"), 1);
    assert_eq!(analyzer.calls("analyze_voice:voicetest_image_1"), 2);
    assert_eq!(analyzer.calls("evaluate_voice:voicetest_image_1"), 0);
}

#[test]
fn partial_service_slot_is_carefully_re_evaluated() {
    let analyzer = ScriptedAnalyzer::default();
    // The primary pass fills some fields; the careful pass runs in the
    // re-evaluation phase, not as an extra normal-mode completeness call.
    analyzer.queue_service(Sector::Alpha, false, Some(rec(&[("nr_arfcn", 640000.0)])));
    analyzer.queue_service(Sector::Alpha, true, Some(rec(&[("nr_band", 78.0)])));

    let cfg = Config::default();
    let pipeline = Pipeline::new(&cfg, analyzer);

    let mut set = ImageSet::default();
    set.push(unit("alpha_image_1", Sector::Alpha, ImageRole::PairedSlot1, 1, 0));
    set.push(unit("alpha_image_2", Sector::Alpha, ImageRole::PairedSlot2, 2, 0));

    let mut store = DataStore::new();
    pipeline
        .run(&set, Path::new("/nonexistent-dir"), &mut store)
        .unwrap();

    assert_eq!(
        store.alpha_service.get("nr_arfcn"),
        Some(&Value::Number(640000.0))
    );
    assert_eq!(store.alpha_service.get("nr_band"), Some(&Value::Number(78.0)));

    let analyzer = pipeline.analyzer();
    assert_eq!(analyzer.calls("extract_service:alpha"), 1);
    assert_eq!(analyzer.calls("evaluate_service:alpha"), 1);
}

#[test]
fn service_sector_is_re_evaluated_at_most_once() {
    let analyzer = ScriptedAnalyzer::default();
    // Every reply is None; the queues stay empty on purpose.
    let cfg = Config::default();
    let pipeline = Pipeline::new(&cfg, analyzer);

    let mut set = ImageSet::default();
    set.push(unit("alpha_image_1", Sector::Alpha, ImageRole::PairedSlot1, 1, 0));
    set.push(unit("alpha_image_2", Sector::Alpha, ImageRole::PairedSlot2, 2, 0));

    let mut store = DataStore::new();
    pipeline
        .run(&set, Path::new("/nonexistent-dir"), &mut store)
        .unwrap();

    let analyzer = pipeline.analyzer();
    // One primary attempt and one careful retry; the completeness pass
    // must not add a third.
    assert_eq!(analyzer.calls("extract_service:alpha"), 1);
    assert_eq!(analyzer.calls("evaluate_service:alpha"), 1);
}

#[test]
fn single_image_retry_is_deduplicated() {
    let analyzer = ScriptedAnalyzer::default();
    analyzer.queue_single(
        &analyzer.generic,
        "alpha_image_3",
        Some(extraction("speed_test", rec(&[("download_mbps", 100.0)]))),
    );
    // Retries keep failing.

    let cfg = Config::default();
    let pipeline = Pipeline::new(&cfg, analyzer);
    let images = alpha_fixture();

    let mut store = DataStore::new();
    // Seed a video entry under the same identifier so both category
    // audits flag the image; only the first may trigger a retry.
    store
        .alpha_video
        .insert("alpha_image_3".into(), Record::new());
    pipeline
        .run(&images, Path::new("/nonexistent-dir"), &mut store)
        .unwrap();

    let analyzer = pipeline.analyzer();
    assert_eq!(analyzer.calls("analyze_generic:alpha_image_3"), 2);
    assert_eq!(analyzer.calls("evaluate_generic:alpha_image_3"), 1);
}

#[test]
fn never_extracted_image_defaults_to_the_speed_map() {
    let analyzer = ScriptedAnalyzer::default();
    analyzer.queue_single(&analyzer.generic, "alpha_image_3", None);
    analyzer.queue_single(
        &analyzer.generic,
        "alpha_image_3",
        Some(extraction("speed_test", rec(&[("ping_ms", 18.0)]))),
    );

    let cfg = Config::default();
    let pipeline = Pipeline::new(&cfg, analyzer);
    let images = alpha_fixture();
    let mut store = DataStore::new();
    pipeline
        .run(&images, Path::new("/nonexistent-dir"), &mut store)
        .unwrap();

    let entry = store.alpha_speedtest.get("alpha_image_3").unwrap();
    assert_eq!(entry.get("ping_ms"), Some(&Value::Number(18.0)));
    assert!(store.alpha_video.get("alpha_image_3").is_none());
}
