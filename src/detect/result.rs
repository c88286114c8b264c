use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixels of the reference resolution. `(x, y)` is the origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A validated observation of one object in one sampled frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub frame_number: u64,
    /// Seconds from the start of the video.
    pub timestamp: f64,
}

impl Detection {
    pub fn new(class: &str, confidence: f32, bbox: BoundingBox, timestamp: f64) -> Self {
        Self {
            class: class.to_string(),
            confidence,
            bbox,
            frame_number: 0,
            timestamp,
        }
    }

    pub fn with_frame(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }
}

/// Detector output as it arrives on the wire. Every field may be missing or bogus.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `[x, y, width, height]`
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub frame_number: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl From<&Detection> for RawDetection {
    fn from(det: &Detection) -> Self {
        Self {
            class: Some(det.class.clone()),
            confidence: Some(det.confidence as f64),
            bbox: Some(vec![det.bbox.x, det.bbox.y, det.bbox.width, det.bbox.height]),
            frame_number: Some(det.frame_number),
            timestamp: Some(det.timestamp),
        }
    }
}

impl RawDetection {
    /// Validate a wire detection. Missing timestamps are derived as `frame_number / fps`.
    pub fn validate(self, fps: f64) -> Result<Detection> {
        let class = self
            .class
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("detection missing class"))?;

        let confidence = self
            .confidence
            .ok_or_else(|| anyhow!("detection missing confidence"))?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("detection confidence {} out of bounds", confidence));
        }

        let bbox = match self.bbox.as_deref() {
            Some([x, y, w, h]) => BoundingBox::new(*x, *y, *w, *h),
            Some(other) => {
                return Err(anyhow!(
                    "detection bbox must have 4 components, got {}",
                    other.len()
                ))
            }
            None => return Err(anyhow!("detection missing bbox")),
        };
        let finite = [bbox.x, bbox.y, bbox.width, bbox.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(anyhow!("detection bbox is degenerate"));
        }

        let (frame_number, timestamp) = match (self.frame_number, self.timestamp) {
            (_, Some(ts)) if !ts.is_finite() || ts < 0.0 => {
                return Err(anyhow!("detection timestamp {} is invalid", ts))
            }
            (Some(frame), Some(ts)) => (frame, ts),
            (Some(frame), None) => {
                if fps <= 0.0 {
                    return Err(anyhow!("cannot derive timestamp without a frame rate"));
                }
                (frame, frame as f64 / fps)
            }
            (None, Some(ts)) => ((ts * fps.max(0.0)).round() as u64, ts),
            (None, None) => return Err(anyhow!("detection has neither frame_number nor timestamp")),
        };

        Ok(Detection {
            class,
            confidence: confidence as f32,
            bbox,
            frame_number,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawDetection {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn derives_timestamp_from_frame_number() {
        let det = raw(r#"{"class":"Backpack","confidence":0.8,"bbox":[10,20,60,80],"frame_number":90}"#)
            .validate(30.0)
            .unwrap();
        assert_eq!(det.class, "backpack");
        assert_eq!(det.frame_number, 90);
        assert_eq!(det.timestamp, 3.0);
        assert_eq!(det.bbox, BoundingBox::new(10.0, 20.0, 60.0, 80.0));
    }

    #[test]
    fn rejects_malformed_detections() {
        let cases = [
            r#"{"confidence":0.8,"bbox":[0,0,1,1],"frame_number":1}"#,
            r#"{"class":"book","bbox":[0,0,1,1],"frame_number":1}"#,
            r#"{"class":"book","confidence":1.2,"bbox":[0,0,1,1],"frame_number":1}"#,
            r#"{"class":"book","confidence":0.5,"bbox":[0,0,1],"frame_number":1}"#,
            r#"{"class":"book","confidence":0.5,"bbox":[0,0,0,10],"frame_number":1}"#,
            r#"{"class":"book","confidence":0.5,"bbox":[0,0,10,10]}"#,
            r#"{"class":"book","confidence":0.5,"bbox":[0,0,10,10],"timestamp":-1.0}"#,
        ];
        for case in cases {
            assert!(raw(case).validate(30.0).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn explicit_timestamp_wins() {
        let det = raw(r#"{"class":"book","confidence":0.5,"bbox":[0,0,10,10],"frame_number":30,"timestamp":7.5}"#)
            .validate(30.0)
            .unwrap();
        assert_eq!(det.timestamp, 7.5);
        assert_eq!(det.frame_number, 30);
    }
}
