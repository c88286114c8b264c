//! Job orchestration.
//!
//! One video is one batch job: ingest, filter, build tracks, classify, aggregate,
//! then optionally report. Stages run sequentially; only reporting fans out.
//! Jobs for different videos share nothing except the `VideoStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::aggregate::{random_suffix, Aggregator, LostObject};
use crate::detect::{Detection, DetectionSource};
use crate::report::{ReportOutcome, Reporter};
use crate::settings::VideoAnalysisSettings;
use crate::stationary::StationarityClassifier;
use crate::store::{VideoAnalysis, VideoStatus, VideoStore};
use crate::track::{filter_detections, BucketTracker, Tracker};

const DEFAULT_REPORT_WORKERS: usize = 4;

/// Cooperative cancellation flag shared between a job and whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Ingest,
    TrackBuilding,
    Classification,
    Aggregation,
    Reporting,
    Done,
}

impl ProgressStage {
    pub fn percent(self) -> u8 {
        match self {
            Self::Ingest => 10,
            Self::TrackBuilding => 40,
            Self::Classification => 60,
            Self::Aggregation => 80,
            Self::Reporting => 90,
            Self::Done => 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: ProgressStage,
    pub percent: u8,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_detections: usize,
    pub dropped_detections: usize,
    pub filtered_detections: usize,
    pub tracks: usize,
    pub assessed_tracks: usize,
    pub stationary_tracks: usize,
    pub lost_objects: usize,
    pub reported: usize,
    pub report_failures: usize,
    /// Seconds covered by the run (source hint, else last timestamp seen).
    pub duration_s: f64,
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed {
        lost_objects: Vec<LostObject>,
        reports: Vec<ReportOutcome>,
        summary: AnalysisSummary,
    },
    /// Cancelled before aggregation or reporting finished. Nothing was reported
    /// after the cancellation was observed.
    Cancelled { summary: AnalysisSummary },
}

impl RunOutcome {
    pub fn summary(&self) -> &AnalysisSummary {
        match self {
            Self::Completed { summary, .. } => summary,
            Self::Cancelled { summary } => summary,
        }
    }
}

/// The detection -> track -> assessment -> lost object pipeline.
pub struct AnalysisPipeline {
    tracker: Option<Box<dyn Tracker + Send + Sync>>,
    aggregator: Aggregator,
    reporter: Option<Arc<Reporter>>,
    report_workers: usize,
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPipeline {
    pub fn new() -> Self {
        Self {
            tracker: None,
            aggregator: Aggregator::default(),
            reporter: None,
            report_workers: DEFAULT_REPORT_WORKERS,
        }
    }

    /// Replace the default bucket tracker (which follows `bucketSizePx`).
    pub fn with_tracker(mut self, tracker: Box<dyn Tracker + Send + Sync>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_report_workers(mut self, workers: usize) -> Self {
        self.report_workers = workers.max(1);
        self
    }

    pub fn reporter(&self) -> Option<&Arc<Reporter>> {
        self.reporter.as_ref()
    }

    pub fn run(
        &self,
        video_id: &str,
        source: &mut dyn DetectionSource,
        settings: &VideoAnalysisSettings,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<RunOutcome> {
        let mut summary = AnalysisSummary::default();
        log::info!(
            "analysis {} start: source={} stationary={}min proximity={}px confidence>={} classes={:?}",
            video_id,
            source.name(),
            settings.stationary_threshold_minutes,
            settings.proximity_threshold_px,
            settings.confidence_threshold,
            settings.monitored_classes
        );

        source
            .open()
            .with_context(|| format!("detection source {} unavailable", source.name()))?;
        progress(checkpoint(ProgressStage::Ingest, "reading detections".to_string()));

        let fps = source.fps();
        let mut detections: Vec<Detection> = Vec::new();
        let mut last_ts: f64 = 0.0;
        while let Some(item) = source.next_detection() {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(video_id, summary));
            }
            summary.total_detections += 1;
            match item.and_then(|raw| raw.validate(fps)) {
                Ok(det) => {
                    last_ts = last_ts.max(det.timestamp);
                    detections.push(det);
                }
                Err(e) => {
                    summary.dropped_detections += 1;
                    log::warn!("analysis {}: dropped detection: {}", video_id, e);
                }
            }
        }
        summary.duration_s = source.duration_hint().unwrap_or(last_ts);

        let detections = filter_detections(detections, settings);
        summary.filtered_detections = detections.len();
        progress(checkpoint(
            ProgressStage::TrackBuilding,
            format!("{} detections kept", detections.len()),
        ));

        let default_tracker;
        let tracker: &dyn Tracker = match &self.tracker {
            Some(tracker) => tracker.as_ref(),
            None => {
                default_tracker = BucketTracker::new(settings.bucket_size_px);
                &default_tracker
            }
        };
        let tracks = tracker.build_tracks(detections);
        summary.tracks = tracks.len();
        if cancel.is_cancelled() {
            return Ok(self.cancelled(video_id, summary));
        }
        progress(checkpoint(
            ProgressStage::Classification,
            format!("{} tracks via {}", tracks.len(), tracker.name()),
        ));

        let classifier = StationarityClassifier::from_settings(settings);
        let mut assessed = Vec::new();
        for track in tracks.values() {
            match classifier.assess(track) {
                Some(assessment) => {
                    if assessment.is_stationary {
                        summary.stationary_tracks += 1;
                    }
                    assessed.push((track, assessment));
                }
                None => log::debug!(
                    "analysis {}: track {} has {} detections, below minimum {}",
                    video_id,
                    track.key,
                    track.len(),
                    settings.min_detections
                ),
            }
        }
        summary.assessed_tracks = assessed.len();

        if cancel.is_cancelled() {
            return Ok(self.cancelled(video_id, summary));
        }
        progress(checkpoint(
            ProgressStage::Aggregation,
            format!("{} stationary tracks", summary.stationary_tracks),
        ));

        let mut lost_objects = self.aggregator.aggregate(
            video_id,
            assessed.iter().map(|(track, assessment)| (*track, assessment)),
            settings,
            Utc::now(),
        );
        summary.lost_objects = lost_objects.len();

        let mut reports = Vec::new();
        if settings.enable_auto_reporting && !lost_objects.is_empty() {
            if let Some(reporter) = &self.reporter {
                if cancel.is_cancelled() {
                    return Ok(self.cancelled(video_id, summary));
                }
                progress(checkpoint(
                    ProgressStage::Reporting,
                    format!("reporting {} lost objects", lost_objects.len()),
                ));
                reports = self.dispatch_reports(reporter, &mut lost_objects, settings, cancel);
                summary.reported = reports.iter().filter(|r| r.success).count();
                summary.report_failures = reports.len() - summary.reported;
            }
        }

        progress(checkpoint(
            ProgressStage::Done,
            format!("{} lost objects", lost_objects.len()),
        ));
        log::info!(
            "analysis {} done: {} detections ({} dropped), {} tracks, {} lost, {} reported",
            video_id,
            summary.total_detections,
            summary.dropped_detections,
            summary.tracks,
            summary.lost_objects,
            summary.reported
        );
        Ok(RunOutcome::Completed {
            lost_objects,
            reports,
            summary,
        })
    }

    /// Fan reports out over a few scoped workers and wait for all of them.
    fn dispatch_reports(
        &self,
        reporter: &Reporter,
        lost_objects: &mut [LostObject],
        settings: &VideoAnalysisSettings,
        cancel: &CancellationToken,
    ) -> Vec<ReportOutcome> {
        let chunk = lost_objects.len().div_ceil(self.report_workers).max(1);
        std::thread::scope(|scope| {
            let handles: Vec<_> = lost_objects
                .chunks_mut(chunk)
                .map(|objects| {
                    scope.spawn(move || {
                        objects
                            .iter_mut()
                            .map(|lost| {
                                if cancel.is_cancelled() {
                                    log::warn!("report of {} skipped: job cancelled", lost.id);
                                    return ReportOutcome {
                                        object_id: lost.id.clone(),
                                        success: false,
                                        item_id: None,
                                        error: Some("cancelled".to_string()),
                                        already_reported: false,
                                    };
                                }
                                reporter.report_and_mark(lost, settings, true)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(_) => {
                        log::error!("report worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        })
    }

    fn cancelled(&self, video_id: &str, summary: AnalysisSummary) -> RunOutcome {
        log::warn!("analysis {} cancelled", video_id);
        RunOutcome::Cancelled { summary }
    }
}

fn checkpoint(stage: ProgressStage, detail: String) -> Progress {
    Progress {
        stage,
        percent: stage.percent(),
        detail,
    }
}

/// Runs pipeline jobs against a `VideoStore` and keeps their cancellation tokens.
pub struct VideoProcessor {
    store: Arc<dyn VideoStore>,
    pipeline: Arc<AnalysisPipeline>,
    jobs: Mutex<HashMap<String, CancellationToken>>,
}

impl VideoProcessor {
    pub fn new(store: Arc<dyn VideoStore>, pipeline: Arc<AnalysisPipeline>) -> Self {
        Self {
            store,
            pipeline,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn VideoStore> {
        &self.store
    }

    /// Register a new video in `queued` state.
    ///
    /// Ids are the submit time in milliseconds followed by nine random base36 characters.
    pub fn submit(&self, filename: &str, settings: VideoAnalysisSettings) -> Result<VideoAnalysis> {
        let mut settings = settings;
        settings.validate()?;
        let id = format!(
            "{}{}",
            Utc::now().timestamp_millis(),
            random_suffix(&mut rand::thread_rng())
        );
        let video = VideoAnalysis::new(&id, filename, settings);
        self.store.insert(video.clone())?;
        log::info!("video {} queued ({})", id, filename);
        Ok(video)
    }

    pub fn get(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        self.store.get(id)
    }

    pub fn list(&self) -> Result<Vec<VideoAnalysis>> {
        self.store.list()
    }

    /// Token for a running job, e.g. to wire up Ctrl-C.
    pub fn cancellation_token(&self, id: &str) -> Result<CancellationToken> {
        let mut jobs = self.jobs()?;
        Ok(jobs.entry(id.to_string()).or_default().clone())
    }

    pub fn cancel(&self, id: &str) -> Result<bool> {
        let jobs = self.jobs()?;
        Ok(match jobs.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        })
    }

    /// Cancel any running job for the video and remove its record.
    pub fn delete(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        self.cancel(id)?;
        let removed = self.store.remove(id)?;
        if removed.is_some() {
            log::info!("video {} deleted", id);
        }
        self.forget_claims(id);
        Ok(removed)
    }

    /// Run the pipeline for a stored video and persist the result.
    ///
    /// A fatal source error marks the video `failed` and is returned to the caller.
    pub fn process(&self, id: &str, source: &mut dyn DetectionSource) -> Result<VideoAnalysis> {
        self.process_with(id, source, &mut |_| {})
    }

    /// Like `process`, also forwarding each checkpoint to `observer`.
    pub fn process_with(
        &self,
        id: &str,
        source: &mut dyn DetectionSource,
        observer: &mut dyn FnMut(&Progress),
    ) -> Result<VideoAnalysis> {
        let video = self
            .store
            .get(id)?
            .ok_or_else(|| anyhow!("video {} not found", id))?;
        let cancel = self.cancellation_token(id)?;

        self.store.update(id, &mut |v| {
            v.status = VideoStatus::Processing;
            v.progress = 0;
            v.error = None;
        })?;

        let store = self.store.clone();
        let mut on_progress = |p: Progress| {
            observer(&p);
            if let Err(e) = store.update(id, &mut |v| v.progress = p.percent.min(99)) {
                log::warn!("video {}: progress update failed: {}", id, e);
            }
        };

        let result = self
            .pipeline
            .run(id, source, &video.settings, &cancel, &mut on_progress);
        self.finish_job(id)?;

        let updated = match result {
            Ok(RunOutcome::Completed {
                lost_objects,
                reports,
                summary,
            }) => {
                let mut lost_objects = Some(lost_objects);
                let mut reports = Some(reports);
                self.store.update(id, &mut |v| {
                    v.status = VideoStatus::Completed;
                    v.progress = 100;
                    v.duration_s = summary.duration_s;
                    v.detected_objects = summary.filtered_detections;
                    v.lost_objects = lost_objects.take().unwrap_or_default();
                    v.report_outcomes = reports.take().unwrap_or_default();
                })?
            }
            Ok(RunOutcome::Cancelled { .. }) => self.store.update(id, &mut |v| {
                v.status = VideoStatus::Cancelled;
                v.lost_objects.clear();
            })?,
            Err(e) => {
                log::error!("video {} failed: {:#}", id, e);
                let message = format!("{:#}", e);
                self.store.update(id, &mut |v| {
                    v.status = VideoStatus::Failed;
                    v.lost_objects.clear();
                    v.report_outcomes.clear();
                    v.error = Some(message.clone());
                })?;
                return Err(e);
            }
        };

        updated.ok_or_else(|| anyhow!("video {} was deleted during processing", id))
    }

    /// Re-run with settings overrides (partial camelCase JSON object).
    pub fn reanalyze(
        &self,
        id: &str,
        overrides: &serde_json::Value,
        source: &mut dyn DetectionSource,
    ) -> Result<VideoAnalysis> {
        let video = self
            .store
            .get(id)?
            .ok_or_else(|| anyhow!("video {} not found", id))?;
        if video.status == VideoStatus::Processing {
            return Err(anyhow!("video {} is already processing", id));
        }
        let settings = video.settings.merged_with(overrides)?;
        self.store.update(id, &mut |v| {
            v.reset();
            v.settings = settings.clone();
        })?;
        // Re-analysis mints new object ids, so the old claims can never match again.
        self.forget_claims(id);
        log::info!("video {} re-analysis queued", id);
        self.process(id, source)
    }

    /// Manually report one lost object. Refuses objects that are already reported.
    pub fn report_lost(&self, id: &str, object_id: &str) -> Result<ReportOutcome> {
        let reporter = self
            .pipeline
            .reporter()
            .ok_or_else(|| anyhow!("no item sink configured"))?;
        let video = self
            .store
            .get(id)?
            .ok_or_else(|| anyhow!("video {} not found", id))?;
        let lost = video
            .lost_objects
            .iter()
            .find(|o| o.id == object_id)
            .ok_or_else(|| anyhow!("lost object {} not found", object_id))?;
        if lost.reported_to_db {
            return Err(anyhow!("object {} already reported", object_id));
        }

        let mut lost = lost.clone();
        let outcome = reporter.report_and_mark(&mut lost, &video.settings, false);
        if outcome.success {
            self.store.update(id, &mut |v| {
                if let Some(obj) = v.lost_object_mut(object_id) {
                    if let (Some(item_id), Some(at)) = (lost.item_id, lost.reported_at) {
                        obj.mark_reported(item_id, reporter.reported_by(), at);
                    }
                }
            })?;
        }
        Ok(outcome)
    }

    fn forget_claims(&self, id: &str) {
        if let Some(reporter) = self.pipeline.reporter() {
            if let Err(e) = reporter.forget_video(id) {
                log::warn!("video {}: report claims not released: {}", id, e);
            }
        }
    }

    fn finish_job(&self, id: &str) -> Result<()> {
        self.jobs()?.remove(id);
        Ok(())
    }

    fn jobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CancellationToken>>> {
        self.jobs
            .lock()
            .map_err(|_| anyhow!("job registry lock poisoned"))
    }
}
