use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_STATIONARY_MINUTES: f64 = 5.0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_PROXIMITY_PX: f64 = 50.0;
pub const DEFAULT_MIN_DETECTIONS: usize = 3;
pub const DEFAULT_BUCKET_SIZE_PX: f64 = 100.0;
pub const DEFAULT_MONITORED_CLASSES: &[&str] = &[
    "backpack",
    "handbag",
    "suitcase",
    "laptop",
    "cell phone",
    "book",
];

/// Per-video analysis settings.
///
/// Field names on the wire are camelCase to match the admin dashboard payloads.
/// Every key is optional; missing keys take the defaults above.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoAnalysisSettings {
    /// Minutes a track must stay stationary before it counts as lost.
    #[serde(rename = "stationaryThreshold")]
    pub stationary_threshold_minutes: f64,
    pub confidence_threshold: f32,
    #[serde(rename = "proximityThreshold")]
    pub proximity_threshold_px: f64,
    pub enable_auto_reporting: bool,
    pub monitored_classes: Vec<String>,
    pub location_name: String,
    pub camera_info: String,
    /// Tracks with fewer detections are treated as noise.
    pub min_detections: usize,
    /// Grid cell size used for track identity. Independent of the proximity threshold.
    pub bucket_size_px: f64,
}

impl Default for VideoAnalysisSettings {
    fn default() -> Self {
        Self {
            stationary_threshold_minutes: DEFAULT_STATIONARY_MINUTES,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            proximity_threshold_px: DEFAULT_PROXIMITY_PX,
            enable_auto_reporting: true,
            monitored_classes: DEFAULT_MONITORED_CLASSES
                .iter()
                .map(|class| class.to_string())
                .collect(),
            location_name: String::new(),
            camera_info: String::new(),
            min_detections: DEFAULT_MIN_DETECTIONS,
            bucket_size_px: DEFAULT_BUCKET_SIZE_PX,
        }
    }
}

impl VideoAnalysisSettings {
    pub fn stationary_threshold_secs(&self) -> f64 {
        self.stationary_threshold_minutes * 60.0
    }

    pub fn is_monitored(&self, class: &str) -> bool {
        self.monitored_classes.iter().any(|c| c == class)
    }

    /// Overlay a partial JSON object onto these settings (re-analyze requests).
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Result<Self> {
        let mut base = serde_json::to_value(self)?;
        if let (Some(base_map), Some(over_map)) = (base.as_object_mut(), overrides.as_object()) {
            for (key, value) in over_map {
                base_map.insert(key.clone(), value.clone());
            }
        } else if !overrides.is_null() {
            return Err(anyhow!("settings overrides must be a JSON object"));
        }
        let mut merged: Self = serde_json::from_value(base)?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&mut self) -> Result<()> {
        if !self.stationary_threshold_minutes.is_finite() || self.stationary_threshold_minutes < 0.0
        {
            return Err(anyhow!("stationaryThreshold must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidenceThreshold must be within 0..=1"));
        }
        if !self.proximity_threshold_px.is_finite() || self.proximity_threshold_px <= 0.0 {
            return Err(anyhow!("proximityThreshold must be greater than zero"));
        }
        if !self.bucket_size_px.is_finite() || self.bucket_size_px <= 0.0 {
            return Err(anyhow!("bucketSizePx must be greater than zero"));
        }
        if self.min_detections == 0 {
            return Err(anyhow!("minDetections must be at least 1"));
        }

        let mut classes = Vec::with_capacity(self.monitored_classes.len());
        for class in &self.monitored_classes {
            let normalized = class.trim().to_lowercase();
            validate_class_label(&normalized)?;
            if !classes.contains(&normalized) {
                classes.push(normalized);
            }
        }
        self.monitored_classes = classes;
        Ok(())
    }
}

/// Class labels are short lowercase detector labels such as "cell phone".
pub fn validate_class_label(label: &str) -> Result<()> {
    static CLASS_LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CLASS_LABEL_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9 _-]{0,63}$").unwrap());
    if !re.is_match(label) {
        return Err(anyhow!(
            "invalid class label {:?}: must match ^[a-z0-9][a-z0-9 _-]{{0,63}}$",
            label
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let settings: VideoAnalysisSettings =
            serde_json::from_str(r#"{"stationaryThreshold": 1, "locationName": "Hall B"}"#)
                .unwrap();
        assert_eq!(settings.stationary_threshold_minutes, 1.0);
        assert_eq!(settings.location_name, "Hall B");
        assert_eq!(settings.proximity_threshold_px, 50.0);
        assert_eq!(settings.min_detections, 3);
        assert!(settings.enable_auto_reporting);
        assert!(settings.is_monitored("cell phone"));
    }

    #[test]
    fn serializes_camel_case_keys() {
        let value = serde_json::to_value(VideoAnalysisSettings::default()).unwrap();
        for key in [
            "stationaryThreshold",
            "confidenceThreshold",
            "proximityThreshold",
            "enableAutoReporting",
            "monitoredClasses",
            "locationName",
            "cameraInfo",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn validate_normalizes_and_dedups_classes() {
        let mut settings = VideoAnalysisSettings {
            monitored_classes: vec!["Laptop".into(), " laptop".into(), "Cell Phone".into()],
            ..VideoAnalysisSettings::default()
        };
        settings.validate().unwrap();
        assert_eq!(settings.monitored_classes, vec!["laptop", "cell phone"]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut settings = VideoAnalysisSettings {
            confidence_threshold: 1.5,
            ..VideoAnalysisSettings::default()
        };
        assert!(settings.validate().is_err());

        let mut settings = VideoAnalysisSettings {
            min_detections: 0,
            ..VideoAnalysisSettings::default()
        };
        assert!(settings.validate().is_err());

        let mut settings = VideoAnalysisSettings {
            monitored_classes: vec!["bag/../etc".into()],
            ..VideoAnalysisSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn merge_overrides_only_given_keys() {
        let base = VideoAnalysisSettings {
            location_name: "Lobby".into(),
            ..VideoAnalysisSettings::default()
        };
        let merged = base
            .merged_with(&serde_json::json!({"stationaryThreshold": 2, "enableAutoReporting": false}))
            .unwrap();
        assert_eq!(merged.stationary_threshold_minutes, 2.0);
        assert!(!merged.enable_auto_reporting);
        assert_eq!(merged.location_name, "Lobby");
    }
}
