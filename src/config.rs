use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_DB_PATH: &str = "melon_leaf.db";
const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_MODEL_INPUT: u32 = 480;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_PROCESS_INTERVAL: u64 = 5;
const DEFAULT_LIVE_CONFIDENCE: f32 = 0.50;
const DEFAULT_QUEUE_DEPTH: usize = 4;
const MAX_QUEUE_DEPTH: usize = 4;
const DEFAULT_LIVE_SOURCE: &str = "stub://webcam";
const DEFAULT_FRAME_WIDTH: u32 = 1280;
const DEFAULT_FRAME_HEIGHT: u32 = 720;
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_UPLOAD_THRESHOLD: f32 = 0.50;
const DEFAULT_HEALTHY_CLASS: &str = "daun sehat";
const DEFAULT_TZ_OFFSET_HOURS: i32 = 7;
const DEFAULT_CLASS_NAMES: [&str; 3] = ["downy mildew", "cucumber mosaic virus", "daun sehat"];

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    db_path: Option<String>,
    timezone_offset_hours: Option<i32>,
    model: Option<ModelConfigFile>,
    live: Option<LiveConfigFile>,
    upload: Option<UploadConfigFile>,
    annotate: Option<AnnotateConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_size: Option<u32>,
    class_names: Option<Vec<String>>,
    labels_path: Option<PathBuf>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct LiveConfigFile {
    process_interval: Option<u64>,
    inference_size: Option<u32>,
    confidence: Option<f32>,
    queue_depth: Option<usize>,
    source: Option<String>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    default_threshold: Option<f32>,
    save_empty_results: Option<bool>,
    healthy_class: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub timezone_offset_hours: i32,
    pub model: ModelSettings,
    pub live: LiveSettings,
    pub upload: UploadSettings,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub input_size: u32,
    pub class_names: Vec<String>,
    pub labels_path: Option<PathBuf>,
    pub iou: f32,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// Run inference on one of every `process_interval` frames.
    pub process_interval: u64,
    /// Square edge frames are resized to before inference.
    pub inference_size: u32,
    pub confidence: f32,
    pub queue_depth: usize,
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub default_threshold: f32,
    /// Persist uploads whose detection list came back empty.
    pub save_empty_results: bool,
    pub healthy_class: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Defaults never fail validation.
        Self::from_file(AppConfigFile::default())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MELON_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.load_labels()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let live = file.live.unwrap_or_default();
        let upload = file.upload.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            timezone_offset_hours: file.timezone_offset_hours.unwrap_or(DEFAULT_TZ_OFFSET_HOURS),
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
                class_names: model.class_names.unwrap_or_else(|| {
                    DEFAULT_CLASS_NAMES.iter().map(|n| n.to_string()).collect()
                }),
                labels_path: model.labels_path,
                iou: model.iou.unwrap_or(DEFAULT_IOU),
            },
            live: LiveSettings {
                process_interval: live.process_interval.unwrap_or(DEFAULT_PROCESS_INTERVAL),
                inference_size: live.inference_size.unwrap_or(DEFAULT_MODEL_INPUT),
                confidence: live.confidence.unwrap_or(DEFAULT_LIVE_CONFIDENCE),
                queue_depth: live.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
                source: live
                    .source
                    .unwrap_or_else(|| DEFAULT_LIVE_SOURCE.to_string()),
                frame_width: live.frame_width.unwrap_or(DEFAULT_FRAME_WIDTH),
                frame_height: live.frame_height.unwrap_or(DEFAULT_FRAME_HEIGHT),
                target_fps: live.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
            upload: UploadSettings {
                default_threshold: upload
                    .default_threshold
                    .unwrap_or(DEFAULT_UPLOAD_THRESHOLD),
                save_empty_results: upload.save_empty_results.unwrap_or(false),
                healthy_class: upload
                    .healthy_class
                    .unwrap_or_else(|| DEFAULT_HEALTHY_CLASS.to_string()),
            },
            font_path: file.annotate.and_then(|a| a.font_path),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("MELON_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(path) = std::env::var("MELON_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(source) = std::env::var("MELON_LIVE_SOURCE") {
            if !source.trim().is_empty() {
                self.live.source = source;
            }
        }
        if let Ok(path) = std::env::var("MELON_FONT_PATH") {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(raw) = std::env::var("MELON_LIVE_CONFIDENCE") {
            self.live.confidence = parse_fraction("MELON_LIVE_CONFIDENCE", &raw)?;
        }
        if let Ok(raw) = std::env::var("MELON_UPLOAD_THRESHOLD") {
            self.upload.default_threshold = parse_fraction("MELON_UPLOAD_THRESHOLD", &raw)?;
        }
        Ok(())
    }

    /// A labels file wins over inline class names; one name per line.
    fn load_labels(&mut self) -> Result<()> {
        let Some(path) = self.model.labels_path.as_ref() else {
            return Ok(());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read labels file {}: {}", path.display(), e))?;
        self.model.class_names = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.live.process_interval == 0 {
            return Err(anyhow!("live.process_interval must be at least 1"));
        }
        if self.live.queue_depth == 0 || self.live.queue_depth > MAX_QUEUE_DEPTH {
            return Err(anyhow!(
                "live.queue_depth must be between 1 and {}",
                MAX_QUEUE_DEPTH
            ));
        }
        if self.live.inference_size == 0 || self.model.input_size == 0 {
            return Err(anyhow!("inference size must be greater than zero"));
        }
        check_fraction("live.confidence", self.live.confidence)?;
        check_fraction("upload.default_threshold", self.upload.default_threshold)?;
        if !(0.0..=1.0).contains(&self.model.iou) {
            return Err(anyhow!("model.iou must be within [0, 1]"));
        }
        if !(-12..=14).contains(&self.timezone_offset_hours) {
            return Err(anyhow!("timezone_offset_hours must be within -12..=14"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_fraction(name: &str, raw: &str) -> Result<f32> {
    raw.trim()
        .parse::<f32>()
        .map_err(|_| anyhow!("{} must be a number in (0, 1]", name))
}

fn check_fraction(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(anyhow!("{} must be within (0, 1], got {}", name, value))
    }
}
