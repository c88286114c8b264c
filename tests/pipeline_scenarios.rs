use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tempfile::NamedTempFile;

use lostwatch::detect::PlantedObject;
use lostwatch::report::ItemSink;
use lostwatch::{
    AnalysisPipeline, BoundingBox, CancellationToken, Detection, InMemoryItemSink,
    InMemoryVideoStore, ItemRequest, JsonLinesSource, Reporter, RunOutcome, ScriptedSource,
    SimulatedSource, SimulationConfig, Urgency, VideoAnalysisSettings, VideoProcessor,
    VideoStatus, VideoStore,
};

fn scenario_settings() -> VideoAnalysisSettings {
    VideoAnalysisSettings {
        stationary_threshold_minutes: 1.0,
        confidence_threshold: 0.5,
        proximity_threshold_px: 50.0,
        location_name: "Library 2F".to_string(),
        camera_info: "cam-07".to_string(),
        ..VideoAnalysisSettings::default()
    }
}

/// Ten laptop sightings in one bucket, spanning 90 seconds.
fn parked_laptop() -> Vec<Detection> {
    (0..10)
        .map(|i| {
            Detection::new(
                "laptop",
                0.6 + (0.35 / 9.0) * i as f32,
                BoundingBox::new(230.0 + (i % 2) as f64 * 4.0, 140.0, 120.0, 80.0),
                i as f64 * 10.0,
            )
            .with_frame(i * 300)
        })
        .collect()
}

fn processor_with(sink: Arc<dyn ItemSink>) -> (Arc<dyn VideoStore>, VideoProcessor) {
    let store: Arc<dyn VideoStore> = Arc::new(InMemoryVideoStore::new());
    let pipeline = AnalysisPipeline::new().with_reporter(Arc::new(Reporter::new(sink)));
    let processor = VideoProcessor::new(store.clone(), Arc::new(pipeline));
    (store, processor)
}

#[test]
fn parked_laptop_becomes_one_reported_electronics_item() {
    let sink = Arc::new(InMemoryItemSink::new());
    let (_store, processor) = processor_with(sink.clone());
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");

    let mut source = ScriptedSource::from_detections(30.0, &parked_laptop());
    let done = processor.process(&video.id, &mut source).expect("process");

    assert_eq!(done.status, VideoStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.detected_objects, 10);
    assert_eq!(done.lost_objects.len(), 1);

    let lost = &done.lost_objects[0];
    assert_eq!(lost.object_class, "laptop");
    assert_eq!(lost.category, "electronics");
    assert_eq!(lost.stationary_duration_minutes, 2);
    assert_eq!(lost.location.width, 120);
    assert_eq!(lost.location.height, 80);
    assert!(lost.id.starts_with(&format!("lost_{}_laptop_2_1_", video.id)));
    assert!(lost.description.contains("Library 2F"));
    assert!(lost.reported_to_db);
    assert_eq!(lost.reported_by.as_deref(), Some("AI Detection System"));

    let items = sink.items().expect("items");
    assert_eq!(items.len(), 1);
    let (item_id, request) = &items[0];
    assert_eq!(Some(*item_id), lost.item_id);
    assert_eq!(request.title, "Lost Laptop");
    assert_eq!(request.urgency, Urgency::High);
    assert_eq!(request.estimated_value, 800);
    assert_eq!(request.location, "Library 2F");
    assert!(request.tags.iter().any(|t| t == "electronics"));
    assert!(request.metadata.auto_reported);

    assert_eq!(done.report_outcomes.len(), 1);
    assert!(done.report_outcomes[0].success);
}

#[test]
fn moving_or_brief_objects_are_not_lost() {
    let pipeline = AnalysisPipeline::new();
    let settings = scenario_settings();

    // Same bucket, but the last sighting is 90px away from the rest.
    let drifting: Vec<Detection> = (0..10)
        .map(|i| {
            let x = if i == 9 { 190.0 } else { 100.0 };
            Detection::new(
                "backpack",
                0.9,
                BoundingBox::new(x, 300.0, 60.0, 80.0),
                i as f64 * 10.0,
            )
        })
        .collect();
    // Perfectly still, but only 40 seconds long.
    let brief: Vec<Detection> = (0..5)
        .map(|i| {
            Detection::new(
                "suitcase",
                0.9,
                BoundingBox::new(420.0, 220.0, 70.0, 90.0),
                i as f64 * 10.0,
            )
        })
        .collect();

    let mut all = drifting;
    all.extend(brief);
    let mut source = ScriptedSource::from_detections(30.0, &all);
    let outcome = pipeline
        .run("v", &mut source, &settings, &CancellationToken::new(), &mut |_| {})
        .expect("run");

    let RunOutcome::Completed {
        lost_objects,
        summary,
        ..
    } = outcome
    else {
        panic!("expected completion");
    };
    assert!(lost_objects.is_empty());
    assert_eq!(summary.tracks, 2);
    assert_eq!(summary.assessed_tracks, 2);
    assert_eq!(summary.stationary_tracks, 1);
}

#[test]
fn unmonitored_and_low_confidence_detections_are_ignored() {
    let pipeline = AnalysisPipeline::new();
    let mut settings = scenario_settings();
    settings.confidence_threshold = 0.7;

    let mut dets = parked_laptop();
    dets.extend((0..10).map(|i| {
        Detection::new("person", 0.99, BoundingBox::new(10.0, 10.0, 40.0, 120.0), i as f64 * 10.0)
    }));
    let mut source = ScriptedSource::from_detections(30.0, &dets);
    let outcome = pipeline
        .run("v", &mut source, &settings, &CancellationToken::new(), &mut |_| {})
        .expect("run");

    let summary = outcome.summary();
    // Laptop sightings from t=30s on clear 0.7; people are not monitored.
    assert_eq!(summary.filtered_detections, 7);
    assert_eq!(summary.lost_objects, 1);
}

#[test]
fn detector_file_with_bad_lines_still_completes() {
    let mut file = NamedTempFile::new().expect("temp detections");
    for det in parked_laptop() {
        writeln!(
            file,
            r#"{{"class":"Laptop","confidence":{},"bbox":[{},{},{},{}],"frame_number":{}}}"#,
            det.confidence, det.bbox.x, det.bbox.y, det.bbox.width, det.bbox.height, det.frame_number
        )
        .expect("write line");
    }
    writeln!(file, "not json").expect("write line");
    writeln!(file, r#"{{"class":"laptop","confidence":1.7,"bbox":[1,2,3,4],"frame_number":1}}"#)
        .expect("write line");
    writeln!(file, r#"{{"class":"laptop","confidence":0.9,"bbox":[1,2,3],"frame_number":1}}"#)
        .expect("write line");

    let sink = Arc::new(InMemoryItemSink::new());
    let (_store, processor) = processor_with(sink);
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");
    let mut source = JsonLinesSource::new(file.path(), 30.0);
    let done = processor.process(&video.id, &mut source).expect("process");

    assert_eq!(done.status, VideoStatus::Completed);
    assert_eq!(done.detected_objects, 10);
    assert_eq!(done.lost_objects.len(), 1);
}

#[test]
fn simulated_scene_finds_planted_objects() {
    let cfg = SimulationConfig {
        duration_s: 600.0,
        fps: 30.0,
        sample_every: 30,
        noise_classes: vec!["person".to_string()],
        planted: vec![
            PlantedObject {
                class: "suitcase".to_string(),
                bbox: BoundingBox::new(320.0, 220.0, 80.0, 120.0),
                appears_at_s: 0.0,
                jitter_px: 0.0,
            },
            PlantedObject {
                class: "handbag".to_string(),
                bbox: BoundingBox::new(40.0, 40.0, 50.0, 60.0),
                appears_at_s: 500.0,
                jitter_px: 0.0,
            },
        ],
        seed: 11,
        ..SimulationConfig::default()
    };
    let mut settings = VideoAnalysisSettings::default();
    settings.confidence_threshold = 0.5;
    settings.enable_auto_reporting = false;

    let mut source = SimulatedSource::new(cfg);
    let outcome = AnalysisPipeline::new()
        .run("sim", &mut source, &settings, &CancellationToken::new(), &mut |_| {})
        .expect("run");
    let RunOutcome::Completed { lost_objects, .. } = outcome else {
        panic!("expected completion");
    };

    // The handbag shows up for under two minutes and stays below the threshold.
    let classes: Vec<_> = lost_objects.iter().map(|o| o.object_class.as_str()).collect();
    assert_eq!(classes, vec!["suitcase"]);
    assert_eq!(lost_objects[0].stationary_duration_minutes, 10);
    assert_eq!(lost_objects[0].category, "bags");
}

#[test]
fn default_simulation_reports_exactly_the_planted_objects() {
    let mut settings = VideoAnalysisSettings::default();
    settings.enable_auto_reporting = false;

    for seed in 0..6 {
        let cfg = SimulationConfig {
            seed,
            ..SimulationConfig::default()
        }
        .for_settings(&settings)
        .with_random_planted(2);
        let mut expected: Vec<(String, i64, i64)> = cfg
            .planted
            .iter()
            .map(|p| (p.class.clone(), (p.bbox.x / 100.0) as i64, (p.bbox.y / 100.0) as i64))
            .collect();
        expected.sort();

        let mut source = SimulatedSource::new(cfg);
        let outcome = AnalysisPipeline::new()
            .run("sim", &mut source, &settings, &CancellationToken::new(), &mut |_| {})
            .expect("run");
        let RunOutcome::Completed { lost_objects, .. } = outcome else {
            panic!("expected completion");
        };

        let mut found: Vec<(String, i64, i64)> = lost_objects
            .iter()
            .map(|o| (o.object_class.clone(), o.location.x / 100, o.location.y / 100))
            .collect();
        found.sort();
        assert_eq!(found, expected, "seed {seed}");
    }
}

struct DownSink;

impl ItemSink for DownSink {
    fn name(&self) -> &'static str {
        "down"
    }

    fn create_item(&self, _request: &ItemRequest) -> Result<i64> {
        Err(anyhow!("items service returned 503"))
    }
}

#[test]
fn sink_failure_keeps_object_unreported_and_job_completed() {
    let (_store, processor) = processor_with(Arc::new(DownSink));
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");
    let mut source = ScriptedSource::from_detections(30.0, &parked_laptop());
    let done = processor.process(&video.id, &mut source).expect("process");

    assert_eq!(done.status, VideoStatus::Completed);
    assert_eq!(done.lost_objects.len(), 1);
    assert!(!done.lost_objects[0].reported_to_db);
    assert!(done.lost_objects[0].item_id.is_none());
    assert_eq!(
        done.report_outcomes[0].error.as_deref(),
        Some("items service returned 503")
    );
}

#[test]
fn cancelled_job_reports_nothing() {
    let sink = Arc::new(InMemoryItemSink::new());
    let (store, processor) = processor_with(sink.clone());
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");
    processor
        .cancellation_token(&video.id)
        .expect("token")
        .cancel();

    let mut source = ScriptedSource::from_detections(30.0, &parked_laptop());
    let done = processor.process(&video.id, &mut source).expect("process");

    assert_eq!(done.status, VideoStatus::Cancelled);
    assert!(done.lost_objects.is_empty());
    assert_eq!(sink.call_count(), 0);
    assert_eq!(
        store.get(&video.id).expect("get").expect("record").status,
        VideoStatus::Cancelled
    );
}

#[test]
fn reanalyze_with_stricter_threshold_clears_previous_results() {
    let sink = Arc::new(InMemoryItemSink::new());
    let (_store, processor) = processor_with(sink);
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");
    let mut source = ScriptedSource::from_detections(30.0, &parked_laptop());
    let first = processor.process(&video.id, &mut source).expect("process");
    assert_eq!(first.lost_objects.len(), 1);

    let mut again = ScriptedSource::from_detections(30.0, &parked_laptop());
    let second = processor
        .reanalyze(
            &video.id,
            &serde_json::json!({ "stationaryThreshold": 5 }),
            &mut again,
        )
        .expect("reanalyze");

    assert_eq!(second.status, VideoStatus::Completed);
    assert_eq!(second.settings.stationary_threshold_minutes, 5.0);
    assert!(second.lost_objects.is_empty());
    assert!(second.report_outcomes.is_empty());
}

#[test]
fn deleting_a_video_removes_its_record() {
    let (store, processor) = processor_with(Arc::new(InMemoryItemSink::new()));
    let video = processor
        .submit("library.mp4", scenario_settings())
        .expect("submit");
    assert!(processor.delete(&video.id).expect("delete").is_some());
    assert!(store.get(&video.id).expect("get").is_none());
    assert!(processor.delete(&video.id).expect("delete").is_none());
}
