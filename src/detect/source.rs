use anyhow::Result;

use crate::detect::result::RawDetection;

/// Upstream producer of per-frame detections.
///
/// A source yields detections for one processing run. It may be a real detector's
/// output, a replay, or a simulator; the pipeline does not care which.
pub trait DetectionSource: Send {
    /// Source identifier.
    fn name(&self) -> &'static str;

    /// Frame rate used to derive timestamps from frame numbers.
    fn fps(&self) -> f64;

    /// Prepare the source. An error here is fatal for the whole run.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Video duration in seconds, when the source knows it.
    fn duration_hint(&self) -> Option<f64> {
        None
    }

    /// Next detection. `Some(Err(_))` is a bad sample that the caller drops;
    /// `None` ends the stream.
    fn next_detection(&mut self) -> Option<Result<RawDetection>>;
}
