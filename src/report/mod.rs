//! Reporting lost objects to the external items store.
//!
//! The store is reached through `ItemSink`. `Reporter` sits in front of a sink and
//! guarantees that a lost object produces at most one create-item call, even when
//! several reports are dispatched at once.

#[cfg(feature = "sink-http")]
pub mod http;
mod reporter;
mod sinks;

use anyhow::Result;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::aggregate::{capitalize_first, non_empty_or, LostObject, TrackData};
use crate::settings::VideoAnalysisSettings;

#[cfg(feature = "sink-http")]
pub use http::HttpItemSink;
pub use reporter::{ReportOutcome, Reporter};
pub use sinks::InMemoryItemSink;

/// External "create item" endpoint.
pub trait ItemSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create one lost item and return its id.
    fn create_item(&self, request: &ItemRequest) -> Result<i64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub ai_detected: bool,
    /// Rounded percent.
    pub confidence: u32,
    pub stationary_duration: u64,
    pub detected_at: String,
    pub camera_info: String,
    pub track_data: TrackData,
    pub auto_reported: bool,
    pub original_video_id: String,
}

/// Payload of the create-item call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub status: String,
    pub images: Vec<String>,
    pub reported_by: String,
    pub metadata: ItemMetadata,
    pub tags: Vec<String>,
    pub estimated_value: u32,
    pub urgency: Urgency,
}

impl ItemRequest {
    pub fn from_lost_object(
        lost: &LostObject,
        settings: &VideoAnalysisSettings,
        auto_reported: bool,
    ) -> Self {
        Self {
            title: format!("Lost {}", capitalize_first(&lost.object_class)),
            description: detailed_description(lost, settings),
            category: lost.category.clone(),
            location: non_empty_or(&settings.location_name, "AI Detected Location").to_string(),
            status: "lost".to_string(),
            images: vec![lost.capture_frame.clone()],
            reported_by: "AI Detection System".to_string(),
            metadata: ItemMetadata {
                ai_detected: true,
                confidence: confidence_percent(lost.confidence),
                stationary_duration: lost.stationary_duration_minutes,
                detected_at: lost.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                camera_info: non_empty_or(&settings.camera_info, "Security Camera").to_string(),
                track_data: lost.track_data,
                auto_reported,
                original_video_id: lost.video_id.clone(),
            },
            tags: tags_for(lost),
            estimated_value: estimated_value(&lost.object_class),
            urgency: urgency_for(&lost.object_class, lost.stationary_duration_minutes),
        }
    }
}

fn confidence_percent(confidence: f32) -> u32 {
    (confidence as f64 * 100.0).round().clamp(0.0, 100.0) as u32
}

pub fn urgency_for(class: &str, stationary_minutes: u64) -> Urgency {
    if matches!(class, "laptop" | "cell phone") {
        Urgency::High
    } else if stationary_minutes > 60 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

pub fn estimated_value(class: &str) -> u32 {
    match class {
        "laptop" => 800,
        "cell phone" => 400,
        "backpack" => 50,
        "handbag" => 100,
        "suitcase" => 150,
        "book" => 20,
        "umbrella" => 25,
        "bottle" => 10,
        _ => 25,
    }
}

fn class_tags(class: &str) -> &'static [&'static str] {
    match class {
        "laptop" => &["electronics", "computer", "valuable"],
        "backpack" => &["bag", "student", "travel"],
        "handbag" => &["bag", "personal", "accessories"],
        "cell phone" => &["electronics", "mobile", "personal", "valuable"],
        "book" => &["education", "reading", "paper"],
        "suitcase" => &["luggage", "travel", "large"],
        "umbrella" => &["weather", "accessory"],
        "bottle" => &["drink", "container"],
        _ => &[],
    }
}

/// Tags in insertion order with duplicates removed.
pub fn tags_for(lost: &LostObject) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    push("ai-detected");
    push("abandoned");
    push(&lost.category);
    for tag in class_tags(&lost.object_class).iter().copied() {
        push(tag);
    }

    let minutes = lost.stationary_duration_minutes;
    if minutes > 30 {
        push("long-abandoned");
    } else if minutes > 10 {
        push("medium-abandoned");
    } else {
        push("recently-abandoned");
    }

    if lost.confidence > 0.9 {
        push("high-confidence");
    } else if lost.confidence > 0.7 {
        push("medium-confidence");
    }
    tags
}

fn detailed_description(lost: &LostObject, settings: &VideoAnalysisSettings) -> String {
    let mut out = format!("AI-detected abandoned {}", lost.object_class);
    if !settings.location_name.trim().is_empty() {
        out.push_str(&format!(" at {}", settings.location_name));
    }
    out.push_str(&format!(
        " (stationary for {} minutes) with {}% confidence",
        lost.stationary_duration_minutes,
        confidence_percent(lost.confidence)
    ));
    if !settings.camera_info.trim().is_empty() {
        out.push_str(&format!(". Detected by {}", settings.camera_info));
    }
    out.push_str(&format!(
        ". Detection time: {}",
        lost.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out
}
