use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: Default::default(),
            paths: Default::default(),
            layout: Default::default(),
            api: Default::default(),
            limits: Default::default(),
            output: Default::default(),
            logging: Default::default(),
            debug: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub resume: bool,
    pub keep_images: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            resume: true,
            keep_images: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

/// Worksheet layout assumptions. Column ranges are half-open `[start, end)`
/// over zero-based image anchor columns, partitioning the sheet into
/// sectors. These are configuration rather than constants: the observed
/// template uses these values, but nothing normative guarantees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub alpha_cols: [u32; 2],
    pub beta_cols: [u32; 2],
    pub gamma_cols: [u32; 2],
    pub voicetest_cols: [u32; 2],
    pub expression_scan_max_col: u32,
}
impl Default for Layout {
    fn default() -> Self {
        Self {
            alpha_cols: [0, 4],
            beta_cols: [4, 8],
            gamma_cols: [8, 12],
            voicetest_cols: [12, 18],
            expression_scan_max_col: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub api_key_env: String,
    pub key_prefix: String,
    pub model_service: String,
    pub model_generic: String,
    pub service_timeout_seconds: u64,
    pub generic_timeout_seconds: u64,
    pub cooldown_ms: u64,
    pub referer: String,
    pub title: String,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.apify.actor/api/v1".into(),
            api_key_env: "APIFY_API_TOKEN".into(),
            key_prefix: "apify_api_".into(),
            model_service: "google/gemini-2.5-pro".into(),
            model_generic: "google/gemini-2.5-flash".into(),
            service_timeout_seconds: 120,
            generic_timeout_seconds: 60,
            cooldown_ms: 2000,
            referer: "http://localhost".into(),
            title: "signal-fill".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_images: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 200_000_000,
            max_images: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub write_filled: bool,
    pub write_report_json: bool,
    pub write_index_json: bool,
    pub filled_prefix: String,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_filled: true,
            write_report_json: true,
            write_index_json: true,
            filled_prefix: "filled_".into(),
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
    pub dump_store_json: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
            dump_store_json: false,
        }
    }
}
