use super::{Analyzer, AnalyzerStats, GenericExtraction};
use crate::classify::Sector;
use crate::config::Config;
use crate::schema::{generic_schemas_json, service_schema_json, voice_schema_json};
use crate::value::{Record, Value};
use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vision analyzer backed by an OpenRouter-compatible chat-completions
/// endpoint. Every operation is one blocking HTTP call with a per-mode
/// timeout and a mandatory cooldown afterwards, success or not, to respect
/// the collaborator's rate limits.
#[derive(Debug)]
pub struct OpenRouterAnalyzer {
    api: crate::config::Api,
    token: String,
    client: reqwest::blocking::Client,
    calls: AtomicU64,
    errors: AtomicU64,
}

impl OpenRouterAnalyzer {
    pub fn new(cfg: &Config) -> Result<Self> {
        let token = std::env::var(&cfg.api.api_key_env).unwrap_or_default();
        if token.trim().is_empty() {
            bail!("API key not set; export {}", cfg.api.api_key_env);
        }
        if !cfg.api.key_prefix.is_empty() && !token.starts_with(&cfg.api.key_prefix) {
            warn!(
                "API key does not start with the expected prefix {:?}",
                cfg.api.key_prefix
            );
        }
        let client = reqwest::blocking::Client::builder()
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            api: cfg.api.clone(),
            token,
            client,
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn cooldown(&self) {
        if self.api.cooldown_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.api.cooldown_ms));
        }
    }

    fn image_data_url(path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading image: {}", path.display()))?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }

    fn post_chat(&self, payload: &serde_json::Value, timeout_secs: u64) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api.base_url))
            .bearer_auth(&self.token)
            .header("HTTP-Referer", &self.api.referer)
            .header("X-Title", &self.api.title)
            .timeout(Duration::from_secs(timeout_secs))
            .json(payload)
            .send()
            .with_context(|| "sending chat completion request")?
            .error_for_status()
            .with_context(|| "chat completion status")?;

        let body: serde_json::Value = response
            .json()
            .with_context(|| "reading chat completion body")?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("reply is missing choices[0].message.content"))?;
        let content = strip_code_fences(content);
        serde_json::from_str(content).with_context(|| {
            let preview: String = content.chars().take(200).collect();
            format!("parsing analyzer JSON: {preview}")
        })
    }

    /// One counted analyzer invocation: failure logs, counts, and
    /// collapses to `None`; the cooldown runs either way.
    fn invoke(&self, what: &str, payload: &serde_json::Value, timeout_secs: u64) -> Option<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("analyzer call #{call}: {what}");
        let out = match self.post_chat(payload, timeout_secs) {
            Ok(v) => Some(v),
            Err(err) => {
                self.count_error();
                warn!("analyzer call failed ({what}): {err:#}");
                None
            }
        };
        self.cooldown();
        out
    }

    fn chat_payload(model: &str, prompt: &str, image_urls: &[String]) -> serde_json::Value {
        let mut content = vec![serde_json::json!({"type": "text", "text": prompt})];
        for url in image_urls {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": url},
            }));
        }
        serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": content}],
            "response_format": {"type": "json_object"},
        })
    }

    fn service_call(&self, image1: &Path, image2: &Path, sector: Sector) -> Option<Record> {
        let urls = match (Self::image_data_url(image1), Self::image_data_url(image2)) {
            (Ok(a), Ok(b)) => vec![a, b],
            (Err(err), _) | (_, Err(err)) => {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.count_error();
                warn!("could not read/encode service images for {sector}: {err:#}");
                return None;
            }
        };
        let prompt = format!(
            "You are a hyper-specialized AI for cellular network engineering data analysis. \
             Analyze both provided service-mode screenshots carefully and return exactly one \
             JSON object matching the schema. Use null where value is not found.\n\nSCHEMA:\n{}",
            serde_json::to_string_pretty(&service_schema_json()).unwrap_or_default()
        );
        let payload = Self::chat_payload(&self.api.model_service, &prompt, &urls);
        let reply = self.invoke(
            &format!("service pair for {sector}"),
            &payload,
            self.api.service_timeout_seconds,
        )?;
        let record = Value::record_from_json(&reply)?;
        info!("service data extracted for {sector}");
        Some(record)
    }

    fn single_call(&self, image: &Path, image_name: &str, voice: bool) -> Option<GenericExtraction> {
        let url = match Self::image_data_url(image) {
            Ok(u) => u,
            Err(err) => {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.count_error();
                warn!("could not read/encode image {image_name:?}: {err:#}");
                return None;
            }
        };
        let prompt = if voice {
            format!(
                "You are an expert in telecom voice-call screenshot extraction. Extract ONLY \
                 the fields in the voice_call schema and emphasize 'time' (return exactly as \
                 seen). Return one JSON object.\n\nSCHEMA:\n{}",
                serde_json::to_string_pretty(&voice_schema_json()).unwrap_or_default()
            )
        } else {
            format!(
                "You are an expert AI assistant for analyzing cellular network test data. \
                 Classify the image as 'speed_test', 'video_test', or 'voice_call' and return \
                 a single JSON object matching the corresponding schema. Use null for missing \
                 fields.\n\nSCHEMAS:\n{}",
                serde_json::to_string_pretty(&generic_schemas_json()).unwrap_or_default()
            )
        };
        let payload = Self::chat_payload(&self.api.model_generic, &prompt, &[url]);
        let reply = self.invoke(
            &format!("single image {image_name:?}"),
            &payload,
            self.api.generic_timeout_seconds,
        )?;
        let extraction = GenericExtraction::from_json(&reply);
        if let Some(e) = &extraction {
            info!("image {image_name:?} classified as {:?}", e.image_type);
        } else {
            self.count_error();
            warn!("reply for {image_name:?} is missing image_type");
        }
        extraction
    }
}

/// Strip a markdown code-fence wrapper (```json ... ```) some models put
/// around their JSON reply.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

impl Analyzer for OpenRouterAnalyzer {
    fn extract_service(&self, image1: &Path, image2: &Path, sector: Sector) -> Option<Record> {
        self.service_call(image1, image2, sector)
    }

    fn analyze_generic(&self, image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.single_call(image, image_name, false)
    }

    fn analyze_voice(&self, image: &Path, image_name: &str) -> Option<GenericExtraction> {
        self.single_call(image, image_name, true)
    }

    fn evaluate_service(&self, image1: &Path, image2: &Path, sector: Sector) -> Option<Record> {
        info!("careful re-evaluation of service pair for {sector}");
        self.service_call(image1, image2, sector)
    }

    fn evaluate_generic(&self, image: &Path, image_name: &str) -> Option<GenericExtraction> {
        info!("careful re-evaluation of {image_name:?}");
        self.single_call(image, image_name, false)
    }

    fn evaluate_voice(&self, image: &Path, image_name: &str) -> Option<GenericExtraction> {
        info!("careful re-evaluation of voice image {image_name:?}");
        self.single_call(image, image_name, true)
    }

    fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            total_calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
