//! The consolidated extraction dataset for one run. One instance per run,
//! constructed empty, mutated only through the null-coalescing merge, and
//! discarded at run end. Nothing here persists across runs.

use crate::classify::Sector;
use crate::value::{Record, Value, merge_fields};
use std::collections::BTreeMap;

/// Per-image extraction results for one category (speedtest, video, voice):
/// image identifier -> record shaped by that category's schema.
pub type CategoryMap = BTreeMap<String, Record>;

#[derive(Debug, Default)]
pub struct DataStore {
    pub alpha_service: Record,
    pub beta_service: Record,
    pub gamma_service: Record,
    pub alpha_speedtest: CategoryMap,
    pub beta_speedtest: CategoryMap,
    pub gamma_speedtest: CategoryMap,
    pub alpha_video: CategoryMap,
    pub beta_video: CategoryMap,
    pub gamma_video: CategoryMap,
    pub voice_test: CategoryMap,
    pub average: Record,
    /// Audit trail of every marked-cell expression encountered.
    pub extract_text: Vec<String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_slot(&self, sector: Sector) -> Option<&Record> {
        match sector {
            Sector::Alpha => Some(&self.alpha_service),
            Sector::Beta => Some(&self.beta_service),
            Sector::Gamma => Some(&self.gamma_service),
            _ => None,
        }
    }

    pub fn service_slot_mut(&mut self, sector: Sector) -> Option<&mut Record> {
        match sector {
            Sector::Alpha => Some(&mut self.alpha_service),
            Sector::Beta => Some(&mut self.beta_service),
            Sector::Gamma => Some(&mut self.gamma_service),
            _ => None,
        }
    }

    pub fn speedtest_map(&self, sector: Sector) -> Option<&CategoryMap> {
        match sector {
            Sector::Alpha => Some(&self.alpha_speedtest),
            Sector::Beta => Some(&self.beta_speedtest),
            Sector::Gamma => Some(&self.gamma_speedtest),
            _ => None,
        }
    }

    pub fn speedtest_map_mut(&mut self, sector: Sector) -> Option<&mut CategoryMap> {
        match sector {
            Sector::Alpha => Some(&mut self.alpha_speedtest),
            Sector::Beta => Some(&mut self.beta_speedtest),
            Sector::Gamma => Some(&mut self.gamma_speedtest),
            _ => None,
        }
    }

    pub fn video_map(&self, sector: Sector) -> Option<&CategoryMap> {
        match sector {
            Sector::Alpha => Some(&self.alpha_video),
            Sector::Beta => Some(&self.beta_video),
            Sector::Gamma => Some(&self.gamma_video),
            _ => None,
        }
    }

    pub fn video_map_mut(&mut self, sector: Sector) -> Option<&mut CategoryMap> {
        match sector {
            Sector::Alpha => Some(&mut self.alpha_video),
            Sector::Beta => Some(&mut self.beta_video),
            Sector::Gamma => Some(&mut self.gamma_video),
            _ => None,
        }
    }

    /// Merge an extraction result into a category map entry, creating the
    /// entry on first success. Entries are never deleted.
    pub fn merge_category_entry(map: &mut CategoryMap, name: &str, fields: &Record) {
        let entry = map.entry(name.to_string()).or_default();
        merge_fields(entry, fields);
    }

    /// Derived cross-entry speedtest averages, keyed
    /// `average_<sector>_speedtest`.
    pub fn compute_averages(&mut self) {
        let mut average = Record::new();
        for sector in Sector::SERVICE_SECTORS {
            let Some(map) = self.speedtest_map(sector) else {
                continue;
            };
            average.insert(
                format!("average_{sector}_speedtest"),
                Value::Map(speed_averages(map)),
            );
        }
        self.average = average;
    }

    /// The resolver's variable table. The expression audit list is not a
    /// resolvable variable.
    pub fn variables(&self) -> BTreeMap<String, Value> {
        let category = |map: &CategoryMap| {
            Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::Map(v.clone())))
                    .collect(),
            )
        };
        BTreeMap::from([
            ("alpha_service".to_string(), Value::Map(self.alpha_service.clone())),
            ("beta_service".to_string(), Value::Map(self.beta_service.clone())),
            ("gamma_service".to_string(), Value::Map(self.gamma_service.clone())),
            ("alpha_speedtest".to_string(), category(&self.alpha_speedtest)),
            ("beta_speedtest".to_string(), category(&self.beta_speedtest)),
            ("gamma_speedtest".to_string(), category(&self.gamma_speedtest)),
            ("alpha_video".to_string(), category(&self.alpha_video)),
            ("beta_video".to_string(), category(&self.beta_video)),
            ("gamma_video".to_string(), category(&self.gamma_video)),
            ("voice_test".to_string(), category(&self.voice_test)),
            ("average".to_string(), Value::Map(self.average.clone())),
        ])
    }

    /// JSON snapshot of every slot, for the debug dump.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.variables() {
            map.insert(name, value.to_json());
        }
        map.insert(
            "extract_text".to_string(),
            serde_json::Value::Array(
                self.extract_text
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
        serde_json::Value::Object(map)
    }
}

const SPEED_AVERAGE_METRICS: [&str; 3] = ["download_mbps", "upload_mbps", "ping_ms"];

/// Arithmetic mean of each speed metric across entries with a usable
/// numeric value. A metric with no contributing entries yields `Null`.
pub fn speed_averages(map: &CategoryMap) -> Record {
    let mut out = Record::new();
    for metric in SPEED_AVERAGE_METRICS {
        let values: Vec<f64> = map
            .values()
            .filter_map(|entry| entry.get(metric).and_then(Value::as_number))
            .collect();
        let value = if values.is_empty() {
            Value::Null
        } else {
            Value::Number(values.iter().sum::<f64>() / values.len() as f64)
        };
        out.insert(metric.to_string(), value);
    }
    out
}
