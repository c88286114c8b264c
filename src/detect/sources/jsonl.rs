//! Detector output stored as JSON lines.
//!
//! Each non-empty line is one detection object:
//! `{"class": "backpack", "confidence": 0.82, "bbox": [x, y, w, h], "frame_number": 120}`
//! with an optional `"timestamp"` in seconds. The file must be local.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::detect::result::RawDetection;
use crate::detect::source::DetectionSource;

pub struct JsonLinesSource {
    path: PathBuf,
    fps: f64,
    lines: Option<Lines<BufReader<File>>>,
    line_no: u64,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>, fps: f64) -> Self {
        Self {
            path: path.into(),
            fps,
            lines: None,
            line_no: 0,
        }
    }
}

impl DetectionSource for JsonLinesSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn open(&mut self) -> Result<()> {
        let raw = self.path.to_string_lossy();
        if raw.contains("://") {
            return Err(anyhow!("detection file must be a local path: {}", raw));
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open detections {}", self.path.display()))?;
        self.lines = Some(BufReader::new(file).lines());
        self.line_no = 0;
        log::info!("JsonLinesSource: reading {}", self.path.display());
        Ok(())
    }

    fn next_detection(&mut self) -> Option<Result<RawDetection>> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(anyhow!("line {}: read error: {}", self.line_no, e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line)
                    .map_err(|e| anyhow!("line {}: invalid detection: {}", self.line_no, e)),
            );
        }
    }
}
