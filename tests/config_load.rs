use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use lostwatch::config::LostwatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LOSTWATCH_CONFIG",
        "LOSTWATCH_DB_PATH",
        "LOSTWATCH_FPS",
        "LOSTWATCH_SINK_URL",
        "LOSTWATCH_STATIONARY_MINUTES",
        "LOSTWATCH_CONFIDENCE",
        "LOSTWATCH_PROXIMITY_PX",
        "LOSTWATCH_MONITORED_CLASSES",
        "LOSTWATCH_AUTO_REPORT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LostwatchConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "lostwatch.db");
    assert_eq!(cfg.fps, 30.0);
    assert!(cfg.frames_dir.is_none());
    assert!(cfg.sink.url.is_none());
    assert_eq!(cfg.sink.timeout.as_secs(), 10);
    assert_eq!(cfg.settings.stationary_threshold_minutes, 5.0);
    assert_eq!(cfg.settings.confidence_threshold, 0.7);
    assert_eq!(cfg.settings.proximity_threshold_px, 50.0);
    assert!(cfg.settings.enable_auto_reporting);
    assert_eq!(
        cfg.settings.monitored_classes,
        vec!["backpack", "handbag", "suitcase", "laptop", "cell phone", "book"]
    );
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "lostwatch_prod.db",
        "fps": 25,
        "frames": { "base_dir": "/srv/frames" },
        "sink": { "url": "https://items.example.com/api/items", "timeout_secs": 3 },
        "settings": {
            "stationaryThreshold": 10,
            "confidenceThreshold": 0.6,
            "locationName": "Terminal B",
            "monitoredClasses": ["Backpack", "umbrella", "backpack"]
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LOSTWATCH_CONFIG", file.path());
    std::env::set_var("LOSTWATCH_PROXIMITY_PX", "35");
    std::env::set_var("LOSTWATCH_AUTO_REPORT", "false");

    let cfg = LostwatchConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "lostwatch_prod.db");
    assert_eq!(cfg.fps, 25.0);
    assert_eq!(cfg.frames_dir.unwrap().to_str(), Some("/srv/frames"));
    assert_eq!(
        cfg.sink.url.as_deref(),
        Some("https://items.example.com/api/items")
    );
    assert_eq!(cfg.sink.timeout.as_secs(), 3);
    assert_eq!(cfg.settings.stationary_threshold_minutes, 10.0);
    assert_eq!(cfg.settings.confidence_threshold, 0.6);
    assert_eq!(cfg.settings.proximity_threshold_px, 35.0);
    assert_eq!(cfg.settings.location_name, "Terminal B");
    assert!(!cfg.settings.enable_auto_reporting);
    assert_eq!(cfg.settings.monitored_classes, vec!["backpack", "umbrella"]);
    assert_eq!(cfg.settings.min_detections, 3);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
db_path = "lostwatch_toml.db"

[settings]
stationaryThreshold = 2.5
cameraInfo = "cam-3"
bucketSizePx = 80.0
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("LOSTWATCH_CONFIG", file.path());
    std::env::set_var("LOSTWATCH_MONITORED_CLASSES", "laptop, cell phone");

    let cfg = LostwatchConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "lostwatch_toml.db");
    assert_eq!(cfg.settings.stationary_threshold_minutes, 2.5);
    assert_eq!(cfg.settings.camera_info, "cam-3");
    assert_eq!(cfg.settings.bucket_size_px, 80.0);
    assert_eq!(cfg.settings.monitored_classes, vec!["laptop", "cell phone"]);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    clear_env();
    std::env::set_var("LOSTWATCH_CONFIDENCE", "1.5");
    assert!(LostwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LOSTWATCH_FPS", "fast");
    assert!(LostwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LOSTWATCH_AUTO_REPORT", "sometimes");
    assert!(LostwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LOSTWATCH_SINK_URL", "ftp://items.example.com");
    assert!(LostwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LOSTWATCH_MONITORED_CLASSES", "laptop,<script>");
    assert!(LostwatchConfig::load().is_err());

    clear_env();
}
