use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::frame::{FrameExtractor, PlaceholderFrameExtractor, PLACEHOLDER_FRAME};
use crate::settings::VideoAnalysisSettings;
use crate::stationary::StationaryAssessment;
use crate::track::Track;

const CATEGORY_TABLE: &[(&str, &str)] = &[
    ("backpack", "bags"),
    ("handbag", "bags"),
    ("suitcase", "bags"),
    ("laptop", "electronics"),
    ("cell phone", "electronics"),
    ("book", "documents"),
    ("umbrella", "accessories"),
    ("bottle", "accessories"),
    ("keys", "accessories"),
    ("wallet", "accessories"),
];

const ID_SUFFIX_LEN: usize = 9;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn category_for_class(class: &str) -> &'static str {
    CATEGORY_TABLE
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, category)| *category)
        .unwrap_or("other")
}

pub(crate) fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable summary stored on the lost object.
pub fn describe(class: &str, duration_minutes: u64, settings: &VideoAnalysisSettings) -> String {
    let location = non_empty_or(&settings.location_name, "monitored area");
    let camera = non_empty_or(&settings.camera_info, "security camera");
    format!(
        "{} detected as abandoned in {} for {} minutes. Captured by {} using AI detection system.",
        capitalize_first(class),
        location,
        duration_minutes,
        camera
    )
}

pub(crate) fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub total_detections: usize,
    pub max_movement_px: i64,
    pub track_duration_s: i64,
}

/// A stationary track promoted to a reportable record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LostObject {
    pub id: String,
    pub video_id: String,
    pub object_class: String,
    /// Mean confidence over the track.
    pub confidence: f32,
    pub location: ObjectLocation,
    /// Approximate start of the stationary period: processing time minus duration.
    pub detected_at: DateTime<Utc>,
    pub stationary_duration_minutes: u64,
    pub capture_frame: String,
    pub description: String,
    pub category: String,
    pub reported_to_db: bool,
    pub item_id: Option<i64>,
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reported_by: Option<String>,
    pub track_data: TrackData,
}

impl LostObject {
    /// Flip to reported. Only ever moves false -> true.
    pub fn mark_reported(&mut self, item_id: i64, by: &str, at: DateTime<Utc>) {
        if self.reported_to_db {
            return;
        }
        self.reported_to_db = true;
        self.item_id = Some(item_id);
        self.reported_at = Some(at);
        self.reported_by = Some(by.to_string());
    }
}

/// Builds lost-object records from assessed tracks.
#[derive(Clone)]
pub struct Aggregator {
    frames: Arc<dyn FrameExtractor>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderFrameExtractor))
    }
}

impl Aggregator {
    pub fn new(frames: Arc<dyn FrameExtractor>) -> Self {
        Self { frames }
    }

    /// One `LostObject` per qualifying, non-empty track.
    pub fn aggregate<'a>(
        &self,
        video_id: &str,
        assessed: impl IntoIterator<Item = (&'a Track, &'a StationaryAssessment)>,
        settings: &VideoAnalysisSettings,
        now: DateTime<Utc>,
    ) -> Vec<LostObject> {
        let mut rng = rand::thread_rng();
        let mut seen_ids = HashSet::new();
        let mut out = Vec::new();

        for (track, assessment) in assessed {
            if !assessment.qualifies_as_lost {
                continue;
            }
            let (Some(first), Some(confidence)) =
                (track.detections().first(), track.average_confidence())
            else {
                continue;
            };

            let id = loop {
                let candidate = format!(
                    "lost_{}_{}_{}_{}_{}",
                    video_id,
                    track.key.class.replace(' ', "-"),
                    track.key.bucket_x,
                    track.key.bucket_y,
                    random_suffix(&mut rng)
                );
                if seen_ids.insert(candidate.clone()) {
                    break candidate;
                }
            };

            let minutes = (assessment.duration_s / 60.0).round().max(0.0) as u64;
            let back = chrono::Duration::milliseconds((assessment.duration_s * 1000.0).round() as i64);
            let capture_frame = match self.frames.capture_reference(video_id, track) {
                Ok(reference) => reference,
                Err(e) => {
                    log::warn!("frame reference for {} unavailable: {}", track.key, e);
                    PLACEHOLDER_FRAME.to_string()
                }
            };

            let object = LostObject {
                id,
                video_id: video_id.to_string(),
                object_class: track.key.class.clone(),
                confidence,
                location: ObjectLocation {
                    x: assessment.mean_x.round() as i64,
                    y: assessment.mean_y.round() as i64,
                    width: first.bbox.width.round() as i64,
                    height: first.bbox.height.round() as i64,
                },
                detected_at: now - back,
                stationary_duration_minutes: minutes,
                capture_frame,
                description: describe(&track.key.class, minutes, settings),
                category: category_for_class(&track.key.class).to_string(),
                reported_to_db: false,
                item_id: None,
                reported_at: None,
                reported_by: None,
                track_data: TrackData {
                    total_detections: track.len(),
                    max_movement_px: assessment.max_displacement.round() as i64,
                    track_duration_s: assessment.duration_s.round() as i64,
                },
            };
            log::info!(
                "lost object {}: {} stationary {} min at ({}, {}) conf={:.2}",
                object.id,
                object.object_class,
                minutes,
                object.location.x,
                object.location.y,
                object.confidence
            );
            out.push(object);
        }
        out
    }
}

pub(crate) fn random_suffix(rng: &mut impl Rng) -> String {
    (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
