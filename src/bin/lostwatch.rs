//! lostwatch - abandoned-object analysis from the command line
//!
//! This tool:
//! 1. Reads detections (a JSON-lines file or the built-in simulator)
//! 2. Runs the track / stationarity / aggregation pipeline
//! 3. Stores the analysis in SQLite and prints lost objects as JSON
//! 4. Optionally reports lost objects to an items endpoint

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::sync::Arc;

use lostwatch::config::LostwatchConfig;
use lostwatch::report::ItemSink;
use lostwatch::ui::Ui;
use lostwatch::{
    AnalysisPipeline, Aggregator, DetectionSource, FrameExtractor, InMemoryItemSink,
    JsonLinesSource, PathFrameExtractor, PlaceholderFrameExtractor, Reporter, SimulatedSource,
    SimulationConfig, SqliteVideoStore, VideoAnalysis, VideoProcessor, VideoStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SQLite database path (overrides LOSTWATCH_DB_PATH and the config file).
    #[arg(long)]
    db: Option<String>,
    /// Progress output: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse detector output stored as JSON lines.
    Analyze {
        #[arg(long)]
        detections: std::path::PathBuf,
        /// Name recorded for the video.
        #[arg(long)]
        filename: Option<String>,
        /// Frame rate used when lines carry only frame numbers.
        #[arg(long)]
        fps: Option<f64>,
        #[command(flatten)]
        overrides: SettingsArgs,
    },
    /// Analyse a synthetic detection stream.
    Simulate {
        #[arg(long, default_value_t = 1800.0)]
        seconds: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Number of stationary objects planted in the scene.
        #[arg(long, default_value_t = 2)]
        planted: usize,
        #[command(flatten)]
        overrides: SettingsArgs,
    },
    /// List stored analyses, newest first.
    List,
    /// Manually report one lost object of a stored analysis.
    Report {
        #[arg(long)]
        video: String,
        #[arg(long)]
        object: String,
    },
}

#[derive(clap::Args, Debug, Default)]
struct SettingsArgs {
    /// Minutes before a stationary object counts as lost.
    #[arg(long)]
    stationary_minutes: Option<f64>,
    #[arg(long)]
    confidence: Option<f32>,
    #[arg(long)]
    proximity_px: Option<f64>,
    /// Comma-separated class list.
    #[arg(long)]
    classes: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    camera: Option<String>,
    #[arg(long)]
    no_auto_report: bool,
}

impl SettingsArgs {
    fn apply(&self, settings: &mut lostwatch::VideoAnalysisSettings) {
        if let Some(minutes) = self.stationary_minutes {
            settings.stationary_threshold_minutes = minutes;
        }
        if let Some(confidence) = self.confidence {
            settings.confidence_threshold = confidence;
        }
        if let Some(px) = self.proximity_px {
            settings.proximity_threshold_px = px;
        }
        if let Some(classes) = &self.classes {
            settings.monitored_classes = classes
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(location) = &self.location {
            settings.location_name = location.clone();
        }
        if let Some(camera) = &self.camera {
            settings.camera_info = camera.clone();
        }
        if self.no_auto_report {
            settings.enable_auto_reporting = false;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = LostwatchConfig::load()?;
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let store: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::open(&config.db_path)?);
    let processor = VideoProcessor::new(store, Arc::new(build_pipeline(&config)?));

    match args.command {
        Command::Analyze {
            detections,
            filename,
            fps,
            overrides,
        } => {
            let filename = filename.unwrap_or_else(|| detections.display().to_string());
            let mut source = JsonLinesSource::new(detections, fps.unwrap_or(config.fps));
            analyse(&processor, &ui, &config, &filename, &overrides, &mut source)
        }
        Command::Simulate {
            seconds,
            seed,
            planted,
            overrides,
        } => {
            let mut settings = config.settings.clone();
            overrides.apply(&mut settings);
            let sim = SimulationConfig {
                duration_s: seconds,
                fps: config.fps,
                seed,
                ..SimulationConfig::default()
            }
            .for_settings(&settings)
            .with_random_planted(planted);
            let mut source = SimulatedSource::new(sim);
            let filename = format!("simulated_{}s_seed{}.mp4", seconds, seed);
            analyse(&processor, &ui, &config, &filename, &overrides, &mut source)
        }
        Command::List => {
            let videos = processor.list()?;
            let rows: Vec<_> = videos.iter().map(summary_row).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        Command::Report { video, object } => {
            let outcome = processor.report_lost(&video, &object)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.success {
                Ok(())
            } else {
                Err(anyhow!(
                    "report failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_string())
                ))
            }
        }
    }
}

fn analyse(
    processor: &VideoProcessor,
    ui: &Ui,
    config: &LostwatchConfig,
    filename: &str,
    overrides: &SettingsArgs,
    source: &mut dyn DetectionSource,
) -> Result<()> {
    let mut settings = config.settings.clone();
    overrides.apply(&mut settings);
    let video = processor.submit(filename, settings)?;

    let token = processor.cancellation_token(&video.id)?;
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, cancelling analysis");
        token.cancel();
    })
    .context("error setting Ctrl-C handler")?;

    let result = {
        let mut job = ui.job(&video.id);
        processor.process_with(&video.id, source, &mut |p| job.update(p))
    };
    let done = result?;
    log::info!(
        "video {} {:?}: {} detections kept, {} lost objects",
        done.id,
        done.status,
        done.detected_objects,
        done.lost_objects.len()
    );
    println!("{}", serde_json::to_string_pretty(&done.lost_objects)?);
    Ok(())
}

fn build_pipeline(config: &LostwatchConfig) -> Result<AnalysisPipeline> {
    let frames: Arc<dyn FrameExtractor> = match &config.frames_dir {
        Some(dir) => Arc::new(PathFrameExtractor::new(dir.display().to_string())),
        None => Arc::new(PlaceholderFrameExtractor),
    };
    let sink = build_sink(config)?;
    log::info!("reporting lost objects to {} sink", sink.name());
    Ok(AnalysisPipeline::new()
        .with_aggregator(Aggregator::new(frames))
        .with_reporter(Arc::new(Reporter::new(sink))))
}

#[cfg(feature = "sink-http")]
fn build_sink(config: &LostwatchConfig) -> Result<Arc<dyn ItemSink>> {
    let Some(url) = &config.sink.url else {
        return Ok(Arc::new(InMemoryItemSink::new()));
    };
    let mut sink = lostwatch::report::HttpItemSink::new(url, config.sink.timeout)?;
    if let Some(path) = &config.sink.token_path {
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sink token {}", path.display()))?;
        sink = sink.with_bearer_token(token.trim().to_string());
    }
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "sink-http"))]
fn build_sink(config: &LostwatchConfig) -> Result<Arc<dyn ItemSink>> {
    if let Some(url) = &config.sink.url {
        log::warn!(
            "sink url {} ignored: built without the sink-http feature, reports stay in memory",
            url
        );
    }
    Ok(Arc::new(InMemoryItemSink::new()))
}

fn summary_row(video: &VideoAnalysis) -> serde_json::Value {
    serde_json::json!({
        "id": video.id,
        "filename": video.filename,
        "uploadedAt": video.uploaded_at,
        "status": video.status,
        "progress": video.progress,
        "detectedObjects": video.detected_objects,
        "lostObjects": video.lost_objects.len(),
        "reported": video.lost_objects.iter().filter(|o| o.reported_to_db).count(),
        "error": video.error,
    })
}
