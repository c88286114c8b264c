use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::VideoAnalysisSettings;

const DEFAULT_DB_PATH: &str = "lostwatch.db";
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_SINK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct LostwatchConfigFile {
    db_path: Option<String>,
    fps: Option<f64>,
    frames: Option<FramesConfigFile>,
    sink: Option<SinkConfigFile>,
    settings: Option<VideoAnalysisSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct FramesConfigFile {
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SinkConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LostwatchConfig {
    pub db_path: String,
    /// Frame rate used to derive timestamps for detections that carry only a frame number.
    pub fps: f64,
    /// When set, capture frames resolve to `<base_dir>/<video>/frame_NNNNNN.jpg`.
    pub frames_dir: Option<PathBuf>,
    pub sink: SinkSettings,
    pub settings: VideoAnalysisSettings,
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Items endpoint. `None` keeps reports in memory.
    pub url: Option<String>,
    pub timeout: Duration,
    pub token_path: Option<PathBuf>,
}

impl LostwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOSTWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LostwatchConfigFile) -> Self {
        let sink = SinkSettings {
            url: file.sink.as_ref().and_then(|sink| sink.url.clone()),
            timeout: Duration::from_secs(
                file.sink
                    .as_ref()
                    .and_then(|sink| sink.timeout_secs)
                    .unwrap_or(DEFAULT_SINK_TIMEOUT_SECS),
            ),
            token_path: file.sink.and_then(|sink| sink.token_path),
        };
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            fps: file.fps.unwrap_or(DEFAULT_FPS),
            frames_dir: file.frames.and_then(|frames| frames.base_dir),
            sink,
            settings: file.settings.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LOSTWATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(fps) = std::env::var("LOSTWATCH_FPS") {
            self.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOSTWATCH_FPS must be a number"))?;
        }
        if let Ok(url) = std::env::var("LOSTWATCH_SINK_URL") {
            if !url.trim().is_empty() {
                self.sink.url = Some(url);
            }
        }
        if let Ok(minutes) = std::env::var("LOSTWATCH_STATIONARY_MINUTES") {
            self.settings.stationary_threshold_minutes = minutes
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOSTWATCH_STATIONARY_MINUTES must be a number of minutes"))?;
        }
        if let Ok(confidence) = std::env::var("LOSTWATCH_CONFIDENCE") {
            self.settings.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOSTWATCH_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(proximity) = std::env::var("LOSTWATCH_PROXIMITY_PX") {
            self.settings.proximity_threshold_px = proximity
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOSTWATCH_PROXIMITY_PX must be a number of pixels"))?;
        }
        if let Ok(classes) = std::env::var("LOSTWATCH_MONITORED_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.settings.monitored_classes = parsed;
            }
        }
        if let Ok(flag) = std::env::var("LOSTWATCH_AUTO_REPORT") {
            self.settings.enable_auto_reporting = parse_flag(&flag)
                .ok_or_else(|| anyhow!("LOSTWATCH_AUTO_REPORT must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(anyhow!("fps must be greater than zero"));
        }
        if self.sink.timeout.is_zero() {
            return Err(anyhow!("sink timeout must be greater than zero"));
        }
        if let Some(url) = &self.sink.url {
            let parsed =
                url::Url::parse(url).map_err(|e| anyhow!("invalid sink url {}: {}", url, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("sink url must be http(s), got {}", parsed.scheme()));
            }
        }
        self.settings.validate()
    }
}

fn read_config_file(path: &Path) -> Result<LostwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
