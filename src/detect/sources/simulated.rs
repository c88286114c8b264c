use std::collections::{HashSet, VecDeque};

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::result::{BoundingBox, Detection, RawDetection};
use crate::detect::source::DetectionSource;
use crate::settings::VideoAnalysisSettings;

/// An object left in place for the simulator to "see" on every sampled frame.
#[derive(Clone, Debug)]
pub struct PlantedObject {
    pub class: String,
    pub bbox: BoundingBox,
    /// Seconds into the video when the object appears.
    pub appears_at_s: f64,
    /// Max per-axis origin noise in pixels.
    pub jitter_px: f64,
}

/// Background detections use these by default. None of them are lost-and-found classes,
/// so noise never piles up into stationary tracks of a monitored class.
pub const DEFAULT_NOISE_CLASSES: &[&str] = &["person", "bicycle", "chair", "dog"];

/// Grid used to place random planted objects. Matches the default track bucket so a
/// jittered object never straddles two buckets.
const PLANT_CELL_PX: f64 = 100.0;
const PLANT_MARGIN_PX: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub duration_s: f64,
    pub fps: f64,
    /// Only every Nth frame is run through the (simulated) detector.
    pub sample_every: u64,
    pub frame_width: f64,
    pub frame_height: f64,
    /// Classes of transient background detections.
    pub noise_classes: Vec<String>,
    /// Classes drawn by `with_random_planted`.
    pub planted_classes: Vec<String>,
    /// Upper bound of random background detections per sampled frame.
    pub max_noise_per_frame: u32,
    pub planted: Vec<PlantedObject>,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_s: 1800.0,
            fps: 30.0,
            sample_every: 20,
            frame_width: 640.0,
            frame_height: 480.0,
            noise_classes: DEFAULT_NOISE_CLASSES.iter().map(|c| c.to_string()).collect(),
            planted_classes: crate::settings::DEFAULT_MONITORED_CLASSES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_noise_per_frame: 2,
            planted: Vec::new(),
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Plant monitored classes and keep monitored classes out of the noise.
    pub fn for_settings(mut self, settings: &VideoAnalysisSettings) -> Self {
        self.planted_classes = settings.monitored_classes.clone();
        self.noise_classes.retain(|class| !settings.is_monitored(class));
        self
    }

    /// Plant `count` stationary objects in distinct grid cells, appearing during the
    /// first third of the video.
    pub fn with_random_planted(mut self, count: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x5eed_0b1e_c7);
        // Leave room for the widest box (150 x 180) inside the frame.
        let cells_x = ((self.frame_width - 160.0) / PLANT_CELL_PX).floor().max(1.0) as i64;
        let cells_y = ((self.frame_height - 190.0) / PLANT_CELL_PX).floor().max(1.0) as i64;
        let mut used = HashSet::new();

        for _ in 0..count {
            let class = if self.planted_classes.is_empty() {
                "backpack".to_string()
            } else {
                self.planted_classes[rng.gen_range(0..self.planted_classes.len())].clone()
            };
            let mut cell = (rng.gen_range(0..cells_x), rng.gen_range(0..cells_y));
            if used.len() < (cells_x * cells_y) as usize {
                while used.contains(&cell) {
                    cell = (rng.gen_range(0..cells_x), rng.gen_range(0..cells_y));
                }
            }
            used.insert(cell);

            let inner = PLANT_MARGIN_PX..(PLANT_CELL_PX - PLANT_MARGIN_PX);
            let bbox = BoundingBox::new(
                (cell.0 as f64 * PLANT_CELL_PX + rng.gen_range(inner.clone())).floor(),
                (cell.1 as f64 * PLANT_CELL_PX + rng.gen_range(inner)).floor(),
                rng.gen_range(50.0..150.0_f64).floor(),
                rng.gen_range(60.0..180.0_f64).floor(),
            );
            self.planted.push(PlantedObject {
                class,
                bbox,
                appears_at_s: rng.gen_range(0.0..(self.duration_s / 3.0).max(f64::EPSILON)),
                jitter_px: 3.0,
            });
        }
        self
    }
}

/// Seeded stand-in for a real detector, used for demos and re-analysis without video.
pub struct SimulatedSource {
    config: SimulationConfig,
    pending: VecDeque<RawDetection>,
    generated: u64,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            generated: 0,
        }
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    fn generate(&mut self) {
        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let total_frames = (cfg.duration_s * cfg.fps).floor() as u64;

        let mut frame = 0;
        while frame < total_frames {
            let timestamp = frame as f64 / cfg.fps;

            let noise = rng.gen_range(0..=cfg.max_noise_per_frame);
            for _ in 0..noise {
                if cfg.noise_classes.is_empty() {
                    break;
                }
                let class = &cfg.noise_classes[rng.gen_range(0..cfg.noise_classes.len())];
                let det = Detection::new(
                    class,
                    rng.gen_range(0.3..0.99_f32),
                    BoundingBox::new(
                        rng.gen_range(0.0..cfg.frame_width).floor(),
                        rng.gen_range(0.0..cfg.frame_height).floor(),
                        rng.gen_range(50.0..150.0_f64).floor(),
                        rng.gen_range(60.0..180.0_f64).floor(),
                    ),
                    timestamp,
                )
                .with_frame(frame);
                self.pending.push_back(RawDetection::from(&det));
            }

            for planted in &cfg.planted {
                if timestamp < planted.appears_at_s {
                    continue;
                }
                let (dx, dy) = if planted.jitter_px > 0.0 {
                    (
                        rng.gen_range(-planted.jitter_px..=planted.jitter_px),
                        rng.gen_range(-planted.jitter_px..=planted.jitter_px),
                    )
                } else {
                    (0.0, 0.0)
                };
                let bbox = BoundingBox::new(
                    planted.bbox.x + dx,
                    planted.bbox.y + dy,
                    planted.bbox.width,
                    planted.bbox.height,
                );
                let det = Detection::new(&planted.class, rng.gen_range(0.6..0.95_f32), bbox, timestamp)
                    .with_frame(frame);
                self.pending.push_back(RawDetection::from(&det));
            }

            frame += cfg.sample_every;
        }
        self.generated = self.pending.len() as u64;
    }
}

impl DetectionSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn fps(&self) -> f64 {
        self.config.fps
    }

    fn open(&mut self) -> Result<()> {
        if self.config.fps <= 0.0 || self.config.sample_every == 0 {
            return Err(anyhow!("simulation needs fps > 0 and sample_every >= 1"));
        }
        if !self.config.duration_s.is_finite() || self.config.duration_s < 0.0 {
            return Err(anyhow!("simulation duration must be non-negative"));
        }
        self.pending.clear();
        self.generate();
        log::info!(
            "SimulatedSource: {} detections over {:.0}s (seed={})",
            self.generated,
            self.config.duration_s,
            self.config.seed
        );
        Ok(())
    }

    fn duration_hint(&self) -> Option<f64> {
        Some(self.config.duration_s)
    }

    fn next_detection(&mut self) -> Option<Result<RawDetection>> {
        self.pending.pop_front().map(Ok)
    }
}
