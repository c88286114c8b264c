use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::result::{Detection, RawDetection};
use crate::detect::source::DetectionSource;

/// Replays detections that are already in memory.
pub struct ScriptedSource {
    fps: f64,
    pending: VecDeque<RawDetection>,
    duration_s: Option<f64>,
}

impl ScriptedSource {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            pending: VecDeque::new(),
            duration_s: None,
        }
    }

    pub fn from_detections(fps: f64, detections: &[Detection]) -> Self {
        let mut source = Self::new(fps);
        source
            .pending
            .extend(detections.iter().map(RawDetection::from));
        source
    }

    pub fn push_raw(&mut self, raw: RawDetection) {
        self.pending.push_back(raw);
    }

    pub fn with_duration(mut self, duration_s: f64) -> Self {
        self.duration_s = Some(duration_s);
        self
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn duration_hint(&self) -> Option<f64> {
        self.duration_s
    }

    fn next_detection(&mut self) -> Option<Result<RawDetection>> {
        self.pending.pop_front().map(Ok)
    }
}
