use crate::{
    analyzer::{Analyzer, OpenRouterAnalyzer},
    coerce::{self, CellValue},
    config::Config,
    pipeline::Pipeline,
    report::{ExpressionReport, RunReport},
    store::DataStore,
    util::{ensure_dir, now_rfc3339, sha256_hex},
    workbook,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "signal-fill")]
#[command(about = "Cellular test-report filler (xlsx screenshots + vision extraction)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./signal-fill.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the environment: API key, config, connectivity assumptions.
    Doctor {},
    /// List embedded images with their sector labels, without analyzing.
    Classify {
        #[arg(long)]
        input: PathBuf,
    },
    /// List marked expression cells, without analyzing.
    Scan {
        #[arg(long)]
        input: PathBuf,
    },
    /// Full run: extract, analyze, repair, resolve, write back.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Classify { input } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            classify(&cfg, input)
        }
        Command::Scan { input } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            scan(&cfg, input)
        }
        Command::Run { input, out_dir } => run(&args, &cfg, input, out_dir.as_deref()),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from("signal-fill.toml");
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let token = std::env::var(&cfg.api.api_key_env).unwrap_or_default();
    let key_set = !token.trim().is_empty();
    let key_prefix_ok =
        cfg.api.key_prefix.is_empty() || token.starts_with(&cfg.api.key_prefix);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "api_key_env": cfg.api.api_key_env,
            "api_key_set": key_set,
            "api_key_prefix_ok": key_set && key_prefix_ok,
            "base_url": cfg.api.base_url,
            "model_service": cfg.api.model_service,
            "model_generic": cfg.api.model_generic,
            "out_dir": cfg.paths.out_dir,
        }))?
    );
    Ok(())
}

fn classify(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let images = workbook::list_embedded_images(input)?;
    let anchors: Vec<(u32, u32)> = images.iter().map(|i| (i.row, i.col)).collect();
    let labels = crate::classify::ImageSet::classify(&cfg.layout, &anchors);
    let listing: Vec<serde_json::Value> = images
        .iter()
        .zip(labels)
        .map(|(img, (name, sector, role))| {
            serde_json::json!({
                "name": name,
                "sector": sector.to_string(),
                "role": format!("{role:?}"),
                "row": img.row,
                "col": img.col,
                "bytes": img.bytes.len(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn scan(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let marked = workbook::scan_marked_cells(input, cfg.layout.expression_scan_max_col)?;
    println!("{}", serde_json::to_string_pretty(&marked)?);
    Ok(())
}

fn run(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    validate_input(cfg, input)?;

    let cfg_norm = cfg.normalized_for_hash();
    let cfg_hash = sha256_hex(cfg_norm.as_bytes());
    let input_hash = crate::util::hash_file(input)
        .with_context(|| format!("hashing input: {}", input.display()))?;
    let job_id = sha256_hex(format!("{cfg_hash}:{input_hash}").as_bytes());

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let job_dir = out_root.join(&job_id);

    if job_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "job_dir already exists and resume=false: {}",
            job_dir.display()
        ));
    }

    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("final"))?;
    ensure_dir(&job_dir.join("logs"))?;
    let images_dir = job_dir.join("images");
    ensure_dir(&images_dir)?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} out={}", job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let started = now_rfc3339();

    let images = workbook::extract_images(input, &cfg.layout, &images_dir)?;
    if images.is_empty() {
        return Err(anyhow!(
            "no embedded images found in {}; nothing to analyze",
            input.display()
        ));
    }
    if images.len() > cfg.limits.max_images {
        return Err(anyhow!(
            "workbook holds {} images, over the limit of {}",
            images.len(),
            cfg.limits.max_images
        ));
    }

    let analyzer = OpenRouterAnalyzer::new(cfg)?;
    let pipeline = Pipeline::new(cfg, analyzer);
    let mut store = DataStore::new();
    pipeline.run(&images, &images_dir, &mut store)?;

    let marked = workbook::scan_marked_cells(input, cfg.layout.expression_scan_max_col)?;
    for cell in &marked {
        store.extract_text.push(cell.expression.clone());
    }

    let vars = store.variables();
    let mut writes: Vec<(String, CellValue)> = Vec::new();
    let mut expressions = ExpressionReport {
        marked_cells: marked.len(),
        ..ExpressionReport::default()
    };
    for cell in &marked {
        let resolved = crate::resolve::resolve_expression(&cell.expression, &vars);
        let value = coerce::coerce(resolved.as_ref());
        match &value {
            CellValue::Text(t) if t == coerce::NULL_SENTINEL => {
                expressions.unresolved += 1;
                info!("unresolved expression at {}: {}", cell.cell_ref, cell.expression);
            }
            _ => expressions.resolved += 1,
        }
        writes.push((cell.cell_ref.clone(), value));
    }

    if cfg.debug.dump_store_json {
        std::fs::write(
            job_dir.join("store.json"),
            serde_json::to_string_pretty(&store.to_json())?,
        )?;
    }

    let filled_rel = if cfg.output.write_filled {
        let stem = input
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("workbook.xlsx");
        let filled_name = format!("{}{stem}", cfg.output.filled_prefix);
        let dest = job_dir.join("final").join(&filled_name);
        workbook::write_values(input, &dest, &writes)?;
        Some(format!("final/{filled_name}"))
    } else {
        None
    };

    let finished = now_rfc3339();
    let report = RunReport::build(
        &job_id,
        &input.display().to_string(),
        &input_hash,
        &started,
        &finished,
        &images,
        &store,
        expressions,
        pipeline.analyzer().stats(),
    );

    if cfg.output.write_report_json {
        std::fs::write(
            job_dir.join("final").join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "job_id": job_id,
            "started": started,
            "finished": finished,
            "filled_workbook": filled_rel,
            "report": format!("final/{}", cfg.output.report_filename),
        });
        std::fs::write(job_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    if !cfg.global.keep_images {
        if let Err(err) = std::fs::remove_dir_all(&images_dir) {
            warn!("could not remove images dir: {err}");
        }
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": job_dir,
                "images": images.len(),
                "marked_cells": report.expressions.marked_cells,
                "resolved": report.expressions.resolved,
                "analyzer_success_rate": format!("{:.1}%", report.analyzer.success_rate()),
                "status": "ok"
            }))?
        );
    }

    Ok(())
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are not supported: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if ext.to_ascii_lowercase() != "xlsx" {
            return Err(anyhow!("input is not an xlsx workbook: {}", input.display()));
        }
    } else {
        warn!("input has no extension; assuming xlsx: {}", input.display());
    }

    let size = std::fs::metadata(input)
        .with_context(|| format!("metadata: {}", input.display()))?
        .len();
    if size > cfg.limits.max_input_file_bytes {
        return Err(anyhow!(
            "input is {size} bytes, over the limit of {}",
            cfg.limits.max_input_file_bytes
        ));
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("signal-fill.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("signal-fill.log"))
}
