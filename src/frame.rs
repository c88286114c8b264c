//! Capture frame references.
//!
//! Frame extraction itself (decoding video, writing an image) is done elsewhere.
//! The pipeline only needs a stable pointer to the frame that shows the object.

use anyhow::{anyhow, Result};

use crate::track::Track;

pub const PLACEHOLDER_FRAME: &str = "/api/placeholder/400/300";

pub trait FrameExtractor: Send + Sync {
    /// Reference to the frame image for a track that was judged lost.
    fn capture_reference(&self, video_id: &str, track: &Track) -> Result<String>;
}

/// Always returns the dashboard's placeholder image.
#[derive(Clone, Debug, Default)]
pub struct PlaceholderFrameExtractor;

impl FrameExtractor for PlaceholderFrameExtractor {
    fn capture_reference(&self, _video_id: &str, _track: &Track) -> Result<String> {
        Ok(PLACEHOLDER_FRAME.to_string())
    }
}

/// Points at `<base>/<video_id>/frame_<n>.jpg` for the last frame the object was seen in.
#[derive(Clone, Debug)]
pub struct PathFrameExtractor {
    base: String,
}

impl PathFrameExtractor {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl FrameExtractor for PathFrameExtractor {
    fn capture_reference(&self, video_id: &str, track: &Track) -> Result<String> {
        let last = track
            .detections()
            .last()
            .ok_or_else(|| anyhow!("track {} has no detections", track.key))?;
        Ok(format!(
            "{}/{}/frame_{:06}.jpg",
            self.base, video_id, last.frame_number
        ))
    }
}
