//! Track building.
//!
//! Identity is approximated: detections are grouped by `(class, floor(x / cell),
//! floor(y / cell))`. An object whose noisy origin straddles a cell boundary splits
//! into two tracks; no merging is attempted. The `Tracker` trait is the seam where
//! a real multi-object tracker can replace the bucket grouping.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::settings::VideoAnalysisSettings;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub class: String,
    pub bucket_x: i64,
    pub bucket_y: i64,
}

impl TrackKey {
    pub fn for_detection(det: &Detection, bucket_size_px: f64) -> Self {
        Self {
            class: det.class.clone(),
            bucket_x: (det.bbox.x / bucket_size_px).floor() as i64,
            bucket_y: (det.bbox.y / bucket_size_px).floor() as i64,
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.class, self.bucket_x, self.bucket_y)
    }
}

/// Detections believed to be one physical object, kept sorted by timestamp.
#[derive(Clone, Debug)]
pub struct Track {
    pub key: TrackKey,
    detections: Vec<Detection>,
}

impl Track {
    pub fn new(key: TrackKey, mut detections: Vec<Detection>) -> Self {
        detections.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self { key, detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn first_seen(&self) -> Option<f64> {
        self.detections.first().map(|d| d.timestamp)
    }

    pub fn last_seen(&self) -> Option<f64> {
        self.detections.last().map(|d| d.timestamp)
    }

    pub fn duration(&self) -> f64 {
        match (self.first_seen(), self.last_seen()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Mean bbox origin. `None` for an empty track.
    pub fn mean_origin(&self) -> Option<(f64, f64)> {
        if self.detections.is_empty() {
            return None;
        }
        let n = self.detections.len() as f64;
        let (sx, sy) = self
            .detections
            .iter()
            .fold((0.0, 0.0), |(sx, sy), d| (sx + d.bbox.x, sy + d.bbox.y));
        Some((sx / n, sy / n))
    }

    pub fn average_confidence(&self) -> Option<f32> {
        if self.detections.is_empty() {
            return None;
        }
        let sum: f64 = self.detections.iter().map(|d| d.confidence as f64).sum();
        Some((sum / self.detections.len() as f64) as f32)
    }
}

/// Groups one run's detections into candidate tracks.
pub trait Tracker {
    fn name(&self) -> &'static str;

    fn build_tracks(&self, detections: Vec<Detection>) -> BTreeMap<TrackKey, Track>;
}

#[derive(Clone, Debug)]
pub struct BucketTracker {
    bucket_size_px: f64,
}

impl BucketTracker {
    pub fn new(bucket_size_px: f64) -> Self {
        Self { bucket_size_px }
    }
}

impl Default for BucketTracker {
    fn default() -> Self {
        Self::new(crate::settings::DEFAULT_BUCKET_SIZE_PX)
    }
}

impl Tracker for BucketTracker {
    fn name(&self) -> &'static str {
        "bucket"
    }

    fn build_tracks(&self, detections: Vec<Detection>) -> BTreeMap<TrackKey, Track> {
        let mut grouped: BTreeMap<TrackKey, Vec<Detection>> = BTreeMap::new();
        for det in detections {
            let key = TrackKey::for_detection(&det, self.bucket_size_px);
            grouped.entry(key).or_default().push(det);
        }
        grouped
            .into_iter()
            .map(|(key, dets)| (key.clone(), Track::new(key, dets)))
            .collect()
    }
}

/// Keep monitored classes at or above the confidence threshold.
pub fn filter_detections(
    detections: Vec<Detection>,
    settings: &VideoAnalysisSettings,
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= settings.confidence_threshold && settings.is_monitored(&d.class))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class: &str, x: f64, y: f64, t: f64) -> Detection {
        Detection::new(class, 0.8, BoundingBox::new(x, y, 60.0, 80.0), t)
    }

    #[test]
    fn groups_by_class_and_bucket() {
        let tracker = BucketTracker::new(100.0);
        let tracks = tracker.build_tracks(vec![
            det("backpack", 110.0, 120.0, 2.0),
            det("backpack", 150.0, 199.0, 1.0),
            det("laptop", 110.0, 120.0, 1.0),
            det("backpack", 250.0, 120.0, 1.0),
        ]);
        assert_eq!(tracks.len(), 3);

        let key = TrackKey {
            class: "backpack".into(),
            bucket_x: 1,
            bucket_y: 1,
        };
        let track = &tracks[&key];
        assert_eq!(track.len(), 2);
        assert_eq!(track.first_seen(), Some(1.0));
        assert_eq!(track.last_seen(), Some(2.0));
        assert_eq!(key.to_string(), "backpack_1_1");
    }

    #[test]
    fn boundary_jitter_splits_track() {
        let tracker = BucketTracker::new(100.0);
        let tracks = tracker.build_tracks(vec![
            det("book", 99.0, 50.0, 0.0),
            det("book", 101.0, 50.0, 1.0),
        ]);
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn negative_origins_floor_downward() {
        let key = TrackKey::for_detection(&det("book", -1.0, 0.0, 0.0), 100.0);
        assert_eq!(key.bucket_x, -1);
    }

    #[test]
    fn empty_input_gives_no_tracks() {
        assert!(BucketTracker::default().build_tracks(Vec::new()).is_empty());
    }

    #[test]
    fn filter_applies_class_and_confidence() {
        let settings = VideoAnalysisSettings {
            confidence_threshold: 0.5,
            monitored_classes: vec!["laptop".into()],
            ..VideoAnalysisSettings::default()
        };
        let mut low = det("laptop", 0.0, 0.0, 0.0);
        low.confidence = 0.49;
        let mut edge = det("laptop", 0.0, 0.0, 1.0);
        edge.confidence = 0.5;
        let kept = filter_detections(vec![low, edge, det("person", 0.0, 0.0, 0.0)], &settings);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].timestamp, 1.0);
    }

    #[test]
    fn track_stats() {
        let mut a = det("bottle", 10.0, 10.0, 0.0);
        a.confidence = 0.6;
        let mut b = det("bottle", 20.0, 30.0, 5.0);
        b.confidence = 0.8;
        let track = Track::new(
            TrackKey::for_detection(&a, 100.0),
            vec![b, a],
        );
        assert_eq!(track.duration(), 5.0);
        assert_eq!(track.mean_origin(), Some((15.0, 20.0)));
        assert!((track.average_confidence().unwrap() - 0.7).abs() < 1e-6);
    }
}
