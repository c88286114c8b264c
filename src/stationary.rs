use serde::{Deserialize, Serialize};

use crate::settings::VideoAnalysisSettings;
use crate::track::{Track, TrackKey};

/// Outcome of checking one track. Derived, never persisted on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationaryAssessment {
    pub track_key: TrackKey,
    pub detection_count: usize,
    pub mean_x: f64,
    pub mean_y: f64,
    /// Largest distance from the mean origin to any detection origin.
    pub max_displacement: f64,
    pub duration_s: f64,
    pub is_stationary: bool,
    pub qualifies_as_lost: bool,
}

/// Pure dispersion + duration check.
///
/// Displacement uses strict `<` against the proximity threshold and duration uses
/// `>=` against the stationary threshold.
#[derive(Clone, Debug)]
pub struct StationarityClassifier {
    pub min_detections: usize,
    pub proximity_threshold_px: f64,
    pub stationary_threshold_s: f64,
}

impl StationarityClassifier {
    pub fn new(min_detections: usize, proximity_threshold_px: f64, stationary_threshold_s: f64) -> Self {
        Self {
            min_detections,
            proximity_threshold_px,
            stationary_threshold_s,
        }
    }

    pub fn from_settings(settings: &VideoAnalysisSettings) -> Self {
        Self::new(
            settings.min_detections,
            settings.proximity_threshold_px,
            settings.stationary_threshold_secs(),
        )
    }

    /// `None` when the track is too short to judge (noise).
    pub fn assess(&self, track: &Track) -> Option<StationaryAssessment> {
        if track.len() < self.min_detections.max(1) {
            return None;
        }
        let (mean_x, mean_y) = track.mean_origin()?;

        let max_displacement = track
            .detections()
            .iter()
            .map(|d| (d.bbox.x - mean_x).hypot(d.bbox.y - mean_y))
            .fold(0.0_f64, f64::max);

        let duration_s = track.duration();
        let is_stationary = max_displacement < self.proximity_threshold_px;
        let qualifies_as_lost = is_stationary && duration_s >= self.stationary_threshold_s;

        Some(StationaryAssessment {
            track_key: track.key.clone(),
            detection_count: track.len(),
            mean_x,
            mean_y,
            max_displacement,
            duration_s,
            is_stationary,
            qualifies_as_lost,
        })
    }
}
